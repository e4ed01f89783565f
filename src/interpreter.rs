//! Rule-driven evaluation of syntax trees.
//!
//! An [`Interpreter`] maps rule identities to callbacks. Evaluating a tree
//! node looks up the callback bound to the node's rule and hands it an
//! [`Expression`], a cheap view that can walk, inspect and recursively
//! evaluate the node's children. Bindings live on the interpreter, never on
//! the rule, so one grammar can feed several interpreters.
//!
//! Nothing is cached: evaluating the same node twice runs its callback twice.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::InterpreterError;
use crate::grammar::{Rule, RuleId};
use crate::syntax::{Span, SyntaxTree};

/// A callback turning one tree node into a value.
pub type Evaluator<R, A> =
    Box<dyn Fn(&Expression<'_, R, A>, &mut A) -> Result<R, InterpreterError>>;

pub struct Interpreter<R, A = ()> {
    evaluators: HashMap<RuleId, Evaluator<R, A>>,
    default: Option<Evaluator<R, A>>,
}

impl<R, A> Default for Interpreter<R, A> {
    fn default() -> Self {
        Interpreter {
            evaluators: HashMap::new(),
            default: None,
        }
    }
}

impl<R, A> fmt::Debug for Interpreter<R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("evaluators", &self.evaluators.len())
            .field("default", &self.default.is_some())
            .finish()
    }
}

impl<R, A> Interpreter<R, A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `evaluator` to `rule`, replacing any earlier binding.
    pub fn set_evaluator<F>(&mut self, rule: &Rule, evaluator: F)
    where
        F: Fn(&Expression<'_, R, A>, &mut A) -> Result<R, InterpreterError> + 'static,
    {
        self.evaluators.insert(rule.id(), Box::new(evaluator));
    }

    pub fn has_evaluator(&self, rule: &Rule) -> bool {
        self.evaluators.contains_key(&rule.id())
    }

    /// Used for nodes whose rule has no binding, instead of the built-in
    /// single-child pass-through.
    pub fn set_default_evaluator<F>(&mut self, evaluator: F)
    where
        F: Fn(&Expression<'_, R, A>, &mut A) -> Result<R, InterpreterError> + 'static,
    {
        self.default = Some(Box::new(evaluator));
    }

    pub fn interpret<'a>(&'a self, tree: &'a SyntaxTree<'a>) -> Expression<'a, R, A> {
        Expression {
            interpreter: self,
            tree,
        }
    }

    pub fn evaluate(&self, tree: &SyntaxTree<'_>, args: &mut A) -> Result<R, InterpreterError> {
        self.interpret(tree).evaluate(args)
    }

    fn dispatch(&self, expression: &Expression<'_, R, A>, args: &mut A) -> Result<R, InterpreterError> {
        let tree = expression.tree;
        if let Some(evaluator) = tree.rule_id().and_then(|id| self.evaluators.get(&id)) {
            return evaluator(expression, args);
        }
        if let Some(default) = &self.default {
            return default(expression, args);
        }
        match tree.children() {
            [only] => self.evaluate(only, args),
            _ => Err(InterpreterError::missing_evaluator(tree)),
        }
    }
}

/// One syntax tree node seen through an interpreter.
pub struct Expression<'a, R, A = ()> {
    interpreter: &'a Interpreter<R, A>,
    tree: &'a SyntaxTree<'a>,
}

impl<R, A> Clone for Expression<'_, R, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R, A> Copy for Expression<'_, R, A> {}

impl<R, A> fmt::Debug for Expression<'_, R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("rule", &self.tree.name())
            .field("span", &self.tree.span())
            .field("children", &self.len())
            .finish()
    }
}

impl<'a, R, A> Expression<'a, R, A> {
    /// Number of child nodes.
    pub fn len(&self) -> usize {
        self.tree.children().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.children().is_empty()
    }

    pub fn as_str(&self) -> &'a str {
        self.tree.as_str()
    }

    /// Byte offset where the match begins.
    pub fn position(&self) -> usize {
        self.tree.begin()
    }

    pub fn length(&self) -> usize {
        self.tree.length()
    }

    pub fn span(&self) -> Span {
        self.tree.span()
    }

    pub fn rule(&self) -> Option<&'a Arc<Rule>> {
        self.tree.rule()
    }

    pub fn is_rule(&self, rule: &Rule) -> bool {
        self.tree.rule_id() == Some(rule.id())
    }

    pub fn tree(&self) -> &'a SyntaxTree<'a> {
        self.tree
    }

    pub fn get(&self, index: usize) -> Option<Expression<'a, R, A>> {
        self.tree
            .children()
            .get(index)
            .map(|child| self.interpreter.interpret(child))
    }

    /// Like [`get`](Self::get), but a missing child is an evaluation error.
    pub fn child(&self, index: usize) -> Result<Expression<'a, R, A>, InterpreterError> {
        self.get(index).ok_or_else(|| {
            self.error(format!(
                "expected child {index} of `{}`, found {} children",
                self.tree.name().unwrap_or("<anonymous>"),
                self.len()
            ))
        })
    }

    pub fn iter(&self) -> Children<'a, R, A> {
        Children {
            interpreter: self.interpreter,
            children: self.tree.children().iter(),
        }
    }

    pub fn evaluate(&self, args: &mut A) -> Result<R, InterpreterError> {
        self.interpreter.dispatch(self, args)
    }

    /// Evaluates this node with another interpreter, possibly of another
    /// result and argument type.
    pub fn evaluate_by<R2, A2>(
        &self,
        interpreter: &Interpreter<R2, A2>,
        args: &mut A2,
    ) -> Result<R2, InterpreterError> {
        interpreter.evaluate(self.tree, args)
    }

    /// An evaluation error pointing at this node.
    pub fn error(&self, message: impl Into<String>) -> InterpreterError {
        InterpreterError::evaluation(message, self.tree)
    }
}

impl<'a, R, A> IntoIterator for Expression<'a, R, A> {
    type Item = Expression<'a, R, A>;
    type IntoIter = Children<'a, R, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the children of an [`Expression`], wrapped lazily.
pub struct Children<'a, R, A = ()> {
    interpreter: &'a Interpreter<R, A>,
    children: std::slice::Iter<'a, SyntaxTree<'a>>,
}

impl<'a, R, A> Iterator for Children<'a, R, A> {
    type Item = Expression<'a, R, A>;

    fn next(&mut self) -> Option<Self::Item> {
        self.children
            .next()
            .map(|child| self.interpreter.interpret(child))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.children.size_hint()
    }
}

impl<R, A> DoubleEndedIterator for Children<'_, R, A> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.children
            .next_back()
            .map(|child| self.interpreter.interpret(child))
    }
}

impl<R, A> ExactSizeIterator for Children<'_, R, A> {}
