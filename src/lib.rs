//! Trellis: a parsing-expression-grammar engine.
//!
//! Grammars are sets of named [`Rule`]s whose bodies are PEG operator trees,
//! written either with the [`GrammarNode`] combinators or as pattern text in
//! the grammar-definition language ([`gdl`]). A [`Parser`] matches input by
//! backtracking recursive descent and returns a [`SyntaxTree`]; an
//! [`Interpreter`] turns that tree into values through callbacks bound to
//! rules. [`Grammar`] wires all of it together into a [`Program`].

pub use crate::builder::Grammar;
pub use crate::errors::{Error, GrammarError, InterpreterError, SyntaxError};
pub use crate::grammar::{Boundary, GrammarNode, Node, Rule, RuleId, RuleRef, RuleSet};
pub use crate::interpreter::{Children, Evaluator, Expression, Interpreter};
pub use crate::parser::{Parser, ParserOptions};
pub use crate::program::Program;
pub use crate::syntax::{Failure, FailureKind, Span, SyntaxTree};

pub mod builder;
pub mod errors;
pub mod gdl;
pub mod grammar;
pub mod interpreter;
pub mod parser;
pub mod program;
pub mod programs;
pub mod syntax;
