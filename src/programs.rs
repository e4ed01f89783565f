//! Ready-made token programs for embedding with
//! [`Grammar::set_program_rule`](crate::Grammar::set_program_rule).
//!
//! Both grammars keep every boundary tight, so they behave as single tokens
//! even inside a grammar with a separator.

use crate::builder::Grammar;
use crate::errors::GrammarError;
use crate::gdl::unescape;
use crate::grammar::{Boundary, GrammarNode, Rule};
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::program::Program;

/// Decimal numbers with optional sign, fraction and exponent: `-12.5e3`.
pub fn number() -> Result<Program<f64>, GrammarError> {
    let mut grammar: Grammar<f64> = Grammar::new();
    grammar.define_with(
        "Number",
        r"'-'? ~ Digits ~ ('.' ~ Digits)? ~ ([eE] ~ [+\-]? ~ Digits)?",
        |e, _| {
            e.as_str()
                .parse()
                .map_err(|_| e.error(format!("`{}` is not a number", e.as_str())))
        },
    )?;
    grammar.define("Digits", "[0-9]+")?;
    grammar.set_start("Number");
    grammar.build()
}

/// Text between `open` and `close`, evaluating to its unescaped content.
///
/// A backslash escapes the following character, so `close` can appear
/// inside the string as `\` followed by it.
pub fn string(open: &str, close: &str) -> Result<Program<String>, GrammarError> {
    use GrammarNode as G;

    let content = Rule::with_body(
        "Content",
        G::zero_or_more_with(
            G::tight_sequence(vec![
                G::not_predicate(G::literal(close)),
                G::choice(vec![
                    G::tight_sequence(vec![G::literal("\\"), G::any()]),
                    G::any(),
                ]),
            ]),
            Boundary::Tight,
        ),
    );
    let start = Rule::with_body(
        "String",
        G::tight_sequence(vec![G::literal(open), G::rule(&content), G::literal(close)]),
    );

    let mut interpreter: Interpreter<String> = Interpreter::new();
    interpreter.set_evaluator(&content, |e, _| Ok(unescape(e.as_str())));
    Ok(Program::new(Parser::new(start, None)?, interpreter))
}
