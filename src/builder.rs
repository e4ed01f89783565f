//! One-stop grammar construction.
//!
//! [`Grammar`] bundles a [`RuleSet`], an [`Interpreter`] and the parser
//! settings, so a whole language can be written as a list of named patterns
//! with their evaluators:
//!
//! ```
//! use trellis::Grammar;
//!
//! let mut grammar: Grammar<i64> = Grammar::new();
//! grammar.define("Space", "' '+")?;
//! grammar.define_with("Sum", "Number ('+' Number)*", |e, args| {
//!     e.iter().map(|n| n.evaluate(args)).sum()
//! })?;
//! grammar.define_with("Number", "[0-9]+", |e, _| {
//!     e.as_str().parse().map_err(|_| e.error("number out of range"))
//! })?;
//! grammar.set_separator("Space");
//! grammar.set_start("Sum");
//!
//! let program = grammar.build()?;
//! assert_eq!(program.run("1 + 2 +3", &mut ())?, 6);
//! # Ok::<(), trellis::Error>(())
//! ```

use std::sync::Arc;

use log::debug;

use crate::errors::{GrammarError, InterpreterError};
use crate::gdl;
use crate::grammar::{GrammarNode, Node, Rule, RuleSet};
use crate::interpreter::{Expression, Interpreter};
use crate::parser::{Parser, ParserOptions};
use crate::program::Program;

pub struct Grammar<R, A = ()> {
    rules: RuleSet,
    interpreter: Interpreter<R, A>,
    separator: Option<Arc<Rule>>,
    start: Option<Arc<Rule>>,
    options: ParserOptions,
    // Embedded programs' rules are only weakly referenced from this grammar.
    retained: Vec<Arc<Rule>>,
}

impl<R, A> Default for Grammar<R, A> {
    fn default() -> Self {
        Grammar {
            rules: RuleSet::new(),
            interpreter: Interpreter::new(),
            separator: None,
            start: None,
            options: ParserOptions::default(),
            retained: Vec::new(),
        }
    }
}

impl<R, A> Grammar<R, A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The rule named `name`, reserved if it does not exist yet.
    pub fn rule(&mut self, name: &str) -> Arc<Rule> {
        self.rules.get_or_create(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Rule>> {
        self.rules.get(name)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn interpreter(&self) -> &Interpreter<R, A> {
        &self.interpreter
    }

    /// Compiles a pattern against this grammar's rules without defining anything.
    pub fn compile(&mut self, pattern: &str) -> Result<Node, GrammarError> {
        gdl::compile(pattern, &mut self.rules)
    }

    /// Defines `name` from a pattern.
    pub fn define(&mut self, name: &str, pattern: &str) -> Result<Arc<Rule>, GrammarError> {
        let body = self.compile(pattern)?;
        self.define_node(name, body)
    }

    /// Defines `name` from a pattern and binds its evaluator.
    pub fn define_with<F>(
        &mut self,
        name: &str,
        pattern: &str,
        evaluator: F,
    ) -> Result<Arc<Rule>, GrammarError>
    where
        F: Fn(&Expression<'_, R, A>, &mut A) -> Result<R, InterpreterError> + 'static,
    {
        let rule = self.define(name, pattern)?;
        self.interpreter.set_evaluator(&rule, evaluator);
        Ok(rule)
    }

    /// Defines `name` from a node built with the combinators.
    pub fn define_node(&mut self, name: &str, body: Node) -> Result<Arc<Rule>, GrammarError> {
        let rule = self.rule(name);
        debug!("defining rule `{name}` as `{body}`");
        rule.define(body)?;
        Ok(rule)
    }

    pub fn set_evaluator<F>(&mut self, name: &str, evaluator: F)
    where
        F: Fn(&Expression<'_, R, A>, &mut A) -> Result<R, InterpreterError> + 'static,
    {
        let rule = self.rule(name);
        self.interpreter.set_evaluator(&rule, evaluator);
    }

    pub fn set_default_evaluator<F>(&mut self, evaluator: F)
    where
        F: Fn(&Expression<'_, R, A>, &mut A) -> Result<R, InterpreterError> + 'static,
    {
        self.interpreter.set_default_evaluator(evaluator);
    }

    pub fn set_separator(&mut self, name: &str) {
        self.separator = Some(self.rule(name));
    }

    pub fn set_start(&mut self, name: &str) {
        self.start = Some(self.rule(name));
    }

    pub fn set_options(&mut self, options: ParserOptions) {
        self.options = options;
    }

    /// Defines `name` as the start rule of another program. Matches of `name`
    /// are evaluated by that program's interpreter and converted into `R`.
    ///
    /// The embedded rules see this grammar's separator, so sub-grammars meant
    /// to be tokens should keep their boundaries tight. The grammar keeps the
    /// embedded rules alive until it is built.
    pub fn set_program_rule<R2>(
        &mut self,
        name: &str,
        program: Program<R2>,
    ) -> Result<Arc<Rule>, GrammarError>
    where
        R: From<R2> + 'static,
        R2: 'static,
        A: 'static,
    {
        let Program {
            parser,
            interpreter,
        } = program;
        let rule = self.define_node(name, GrammarNode::rule(parser.start()))?;
        self.retained.extend(parser.rules().iter().cloned());
        self.interpreter.set_evaluator(&rule, move |e, _| {
            let value = e.child(0)?.evaluate_by(&interpreter, &mut ())?;
            Ok(R::from(value))
        });
        Ok(rule)
    }

    /// A parser for the current start rule, leaving the grammar in place.
    pub fn parser(&self) -> Result<Parser, GrammarError> {
        let start = self.start.clone().ok_or(GrammarError::MissingStart)?;
        let parser = Parser::new(start, self.separator.clone())?;
        Ok(parser.with_options(self.options))
    }

    pub fn build(self) -> Result<Program<R, A>, GrammarError> {
        let parser = self.parser()?;
        let unused = self
            .rules
            .iter()
            .filter(|&rule| !parser.rules().contains(rule))
            .count();
        if unused > 0 {
            debug!("{unused} rules are unreachable from `{}`", parser.start().name());
        }
        Ok(Program::new(parser, self.interpreter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::programs;
    use crate::syntax::FailureKind;

    #[test]
    fn rules_can_be_defined_once() {
        let mut grammar: Grammar<()> = Grammar::new();
        grammar.define("A", "'a'").unwrap();
        let error = grammar.define("A", "'b'").unwrap_err();
        assert!(matches!(error, GrammarError::Redefinition { rule } if rule == "A"));
    }

    #[test]
    fn build_requires_a_start_rule() {
        let mut grammar: Grammar<()> = Grammar::new();
        grammar.define("A", "'a'").unwrap();
        assert!(matches!(grammar.build(), Err(GrammarError::MissingStart)));
    }

    #[test]
    fn build_reports_undefined_rules() {
        let mut grammar: Grammar<()> = Grammar::new();
        grammar.define("Start", "'a' Missing").unwrap();
        grammar.set_start("Start");
        let error = grammar.build().unwrap_err();
        assert!(matches!(error, GrammarError::Unresolved { rule } if rule == "Missing"));
    }

    #[test]
    fn evaluators_may_be_bound_before_definition() {
        let mut grammar: Grammar<String> = Grammar::new();
        grammar.set_evaluator("Word", |e, _| Ok(e.as_str().to_uppercase()));
        grammar.define("Word", "[a-z]+").unwrap();
        grammar.set_start("Word");
        let program = grammar.build().unwrap();
        assert_eq!(program.run("shout", &mut ()).unwrap(), "SHOUT");
    }

    #[test]
    fn program_rules_embed_other_programs() {
        let mut grammar: Grammar<f64> = Grammar::new();
        grammar.define("Space", "[ \\t]+").unwrap();
        grammar
            .define_with("Sum", "Number ('+' Number)*", |e, args| {
                e.iter().map(|n| n.evaluate(args)).sum()
            })
            .unwrap();
        grammar
            .set_program_rule("Number", programs::number().unwrap())
            .unwrap();
        grammar.set_separator("Space");
        grammar.set_start("Sum");

        let program = grammar.build().unwrap();
        assert_eq!(program.run("1.5 + -2 +3e1", &mut ()).unwrap(), 29.5);
        assert!(program.run("1. 5", &mut ()).is_err());
    }

    #[test]
    fn program_rules_outlive_the_embedded_program() {
        let mut grammar: Grammar<String> = Grammar::new();
        {
            let quoted = programs::string("<", ">").unwrap();
            grammar.set_program_rule("Quoted", quoted).unwrap();
        }
        grammar.set_start("Quoted");

        let parser = grammar.parser().unwrap();
        assert!(parser.rules().len() > 1);
        let program = grammar.build().unwrap();
        drop(parser);
        assert_eq!(program.run(r"<a\>b>", &mut ()).unwrap(), "a>b");
    }

    #[test]
    fn options_reach_the_parser() {
        let mut grammar: Grammar<()> = Grammar::new();
        grammar.define("Expr", "Expr '+' 'a' | 'a'").unwrap();
        grammar.set_start("Expr");
        grammar.set_options(ParserOptions { max_depth: Some(16) });
        grammar.set_default_evaluator(|_, _| Ok(()));

        let program = grammar.build().unwrap();
        assert_eq!(program.parser.options().max_depth, Some(16));
        match program.run("a+a", &mut ()) {
            Err(Error::Syntax(error)) => assert_eq!(error.kind(), FailureKind::RecursionLimit(16)),
            other => panic!("expected a recursion limit, got {other:?}"),
        }
    }

    #[test]
    fn context_argument_is_shared() {
        let mut grammar: Grammar<(), Vec<String>> = Grammar::new();
        grammar.define("Space", "' '+").unwrap();
        grammar
            .define_with("Words", "Word+", |e, seen| {
                e.iter().try_for_each(|word| word.evaluate(seen))
            })
            .unwrap();
        grammar
            .define_with("Word", "[a-z]+", |e, seen| {
                seen.push(e.as_str().to_string());
                Ok(())
            })
            .unwrap();
        grammar.set_separator("Space");
        grammar.set_start("Words");

        let program = grammar.build().unwrap();
        let mut seen = Vec::new();
        program.run("to be or", &mut seen).unwrap();
        assert_eq!(seen, ["to", "be", "or"]);
    }
}
