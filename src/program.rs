//! A parser paired with the interpreter that gives its trees meaning.

use std::fmt;

use crate::errors::{Error, InterpreterError, SyntaxError};
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::syntax::SyntaxTree;

pub struct Program<R, A = ()> {
    pub parser: Parser,
    pub interpreter: Interpreter<R, A>,
}

impl<R, A> fmt::Debug for Program<R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("parser", &self.parser)
            .field("interpreter", &self.interpreter)
            .finish()
    }
}

impl<R, A> Program<R, A> {
    pub fn new(parser: Parser, interpreter: Interpreter<R, A>) -> Self {
        Program {
            parser,
            interpreter,
        }
    }

    /// Parses without requiring the whole input to match.
    pub fn parse<'i>(&self, input: &'i str) -> SyntaxTree<'i> {
        self.parser.parse(input)
    }

    /// Evaluates a tree produced by [`parse`](Self::parse).
    ///
    /// An invalid tree is reported as a [`SyntaxError`]. A valid but partial
    /// tree is evaluated as it stands.
    pub fn interpret(&self, tree: &SyntaxTree<'_>, args: &mut A) -> Result<R, Error> {
        if !tree.is_valid() {
            return Err(SyntaxError::from_tree(tree).into());
        }
        Ok(self.evaluate(tree, args)?)
    }

    /// Parses the whole input and evaluates it.
    pub fn run(&self, input: &str, args: &mut A) -> Result<R, Error> {
        let tree = self.parser.parse_complete(input)?;
        Ok(self.evaluate(&tree, args)?)
    }

    fn evaluate(&self, tree: &SyntaxTree<'_>, args: &mut A) -> Result<R, InterpreterError> {
        self.interpreter.evaluate(tree, args)
    }
}
