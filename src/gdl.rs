//! The grammar-definition language.
//!
//! Rule bodies are usually written as short pattern strings:
//!
//! ```text
//! Value (',' Value)*        sequence, separator tried between items
//! Word ~ '!'                `~` keeps the separator out of one gap
//! Item~*                    tight repetition
//! 'a' | "b" | [c-e] | .     literals, classes, any character
//! &X  !X  X*  X+  X?        predicates and quantifiers
//! !.                        end of input
//! ```
//!
//! The language is itself parsed by the engine. Its grammar is built once
//! from combinators, and each pattern's tree is evaluated into a
//! [`GrammarNode`] by an [`Interpreter`] whose context is the [`RuleSet`] that
//! names resolve against. Names that are not yet known are reserved in the
//! set and can be defined afterwards.

use std::sync::Arc;

use log::trace;
use once_cell::sync::OnceCell;

use crate::errors::{GrammarError, SyntaxError};
use crate::grammar::{Boundary, GrammarNode, Node, Rule, RuleSet};
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::syntax::Span;

/// Compiles one pattern, resolving names against `rules`.
pub fn compile(pattern: &str, rules: &mut RuleSet) -> Result<Node, GrammarError> {
    let gdl = Bootstrap::get()?;
    let tree = gdl
        .parser
        .parse_complete(pattern)
        .map_err(|error| unexpected_input(pattern, &error))?;

    let node = gdl
        .interpreter()
        .evaluate(&tree, rules)
        .map_err(|error| GrammarError::pattern(error.to_string(), pattern, error.span()))?;
    trace!("compiled `{pattern}` into `{node}`");
    Ok(node)
}

fn unexpected_input(pattern: &str, error: &SyntaxError) -> GrammarError {
    let position = error.position().min(pattern.len());
    let (message, end) = match pattern[position..].chars().next() {
        Some(c) => (format!("unexpected `{c}`"), position + c.len_utf8()),
        None => ("unexpected end of pattern".to_string(), position),
    };
    GrammarError::pattern(message, pattern, Span::new(position, end))
}

/// Resolves backslash escapes in literal text.
pub(crate) fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(escaped) => out.push(escape(escaped)),
            None => out.push('\\'),
        }
    }
    out
}

fn escape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

/// Splits the inside of a class (`a-z_\]`) into inclusive ranges.
fn class_ranges(body: &str) -> Result<Vec<(char, char)>, String> {
    // (character, was escaped)
    let mut chars = Vec::new();
    let mut iter = body.chars();
    while let Some(c) = iter.next() {
        match c {
            '\\' => chars.push((iter.next().map_or('\\', escape), true)),
            c => chars.push((c, false)),
        }
    }

    let mut ranges = Vec::new();
    let mut index = 0;
    while index < chars.len() {
        let (low, _) = chars[index];
        if index + 2 < chars.len() && chars[index + 1] == ('-', false) {
            let (high, _) = chars[index + 2];
            if high < low {
                return Err(format!("inverted range `{low}-{high}` in character class"));
            }
            ranges.push((low, high));
            index += 3;
        } else {
            ranges.push((low, low));
            index += 1;
        }
    }
    Ok(ranges)
}

// ============================================================================
// BOOTSTRAP GRAMMAR
// ============================================================================

static BOOTSTRAP: OnceCell<Bootstrap> = OnceCell::new();

struct Bootstrap {
    parser: Parser,
    choice: Arc<Rule>,
    sequence: Arc<Rule>,
    tight: Arc<Rule>,
    and: Arc<Rule>,
    not: Arc<Rule>,
    quantified: Arc<Rule>,
    literal: Arc<Rule>,
    class: Arc<Rule>,
    any: Arc<Rule>,
    name: Arc<Rule>,
}

impl Bootstrap {
    fn get() -> Result<&'static Bootstrap, GrammarError> {
        BOOTSTRAP.get_or_try_init(Bootstrap::build)
    }

    fn build() -> Result<Self, GrammarError> {
        use GrammarNode as G;

        let tight = G::tight_sequence;
        let many = |child: Node| G::zero_or_more_with(child, Boundary::Tight);
        let ws = || G::zero_or_more(G::class(vec![(' ', ' '), ('\t', '\t'), ('\n', '\n'), ('\r', '\r')]));
        let escaped = || tight(vec![G::literal("\\"), G::any()]);
        let quoted = |quote: char| {
            tight(vec![
                G::literal(quote),
                many(G::choice(vec![
                    escaped(),
                    G::negated_class(vec![(quote, quote), ('\\', '\\')]),
                ])),
                G::literal(quote),
            ])
        };

        let choice = Rule::new("Choice");
        let and = Rule::new("AndPredicate");
        let not = Rule::new("NotPredicate");

        let name = Rule::with_body(
            "Name",
            tight(vec![
                G::class(vec![('a', 'z'), ('A', 'Z'), ('_', '_')]),
                G::zero_or_more(G::class(vec![('a', 'z'), ('A', 'Z'), ('0', '9'), ('_', '_')])),
            ]),
        );
        let literal = Rule::with_body("Literal", G::choice(vec![quoted('\''), quoted('"')]));
        let class = Rule::with_body(
            "Class",
            tight(vec![
                G::literal("["),
                G::optional(G::literal("^")),
                many(G::choice(vec![
                    escaped(),
                    G::negated_class(vec![(']', ']'), ('\\', '\\')]),
                ])),
                G::literal("]"),
            ]),
        );
        let any = Rule::with_body("Any", G::literal("."));
        let group = tight(vec![G::literal("("), ws(), G::rule(&choice), ws(), G::literal(")")]);
        let quantifier = Rule::with_body(
            "Quantifier",
            G::choice(["~*", "~+", "*", "+", "?"].into_iter().map(G::literal).collect()),
        );
        let quantified = Rule::with_body(
            "Quantified",
            tight(vec![
                G::choice(vec![
                    group,
                    G::rule(&literal),
                    G::rule(&class),
                    G::rule(&any),
                    G::rule(&name),
                ]),
                many(G::rule(&quantifier)),
            ]),
        );

        let prefixed = || G::choice(vec![G::rule(&and), G::rule(&not), G::rule(&quantified)]);
        and.define(tight(vec![G::literal("&"), ws(), prefixed()]))?;
        not.define(tight(vec![G::literal("!"), ws(), prefixed()]))?;

        let tight_gap = Rule::with_body("Tight", tight(vec![ws(), G::literal("~"), ws()]));
        let sequence = Rule::with_body(
            "Sequence",
            tight(vec![
                prefixed(),
                many(tight(vec![G::choice(vec![G::rule(&tight_gap), ws()]), prefixed()])),
            ]),
        );
        choice.define(tight(vec![
            G::rule(&sequence),
            many(tight(vec![ws(), G::literal("|"), ws(), G::rule(&sequence)])),
        ]))?;

        let pattern = Rule::with_body(
            "Pattern",
            tight(vec![ws(), G::rule(&choice), ws(), G::not_predicate(G::any())]),
        );

        Ok(Bootstrap {
            parser: Parser::new(pattern, None)?,
            choice,
            sequence,
            tight: tight_gap,
            and,
            not,
            quantified,
            literal,
            class,
            any,
            name,
        })
    }

    fn interpreter(&self) -> Interpreter<Node, RuleSet> {
        let mut interpreter: Interpreter<Node, RuleSet> = Interpreter::new();

        interpreter.set_evaluator(&self.choice, |e, rules| {
            if e.len() == 1 {
                return e.child(0)?.evaluate(rules);
            }
            let alternatives = e
                .iter()
                .map(|alternative| alternative.evaluate(rules))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(GrammarNode::choice(alternatives))
        });

        let tight = Arc::clone(&self.tight);
        interpreter.set_evaluator(&self.sequence, move |e, rules| {
            let mut items = Vec::with_capacity(e.len());
            let mut boundary = Boundary::Separated;
            for part in e.iter() {
                if part.is_rule(&tight) {
                    boundary = Boundary::Tight;
                    continue;
                }
                items.push((boundary, part.evaluate(rules)?));
                boundary = Boundary::Separated;
            }

            let mut items = items.into_iter();
            let (_, first) = items.next().ok_or_else(|| e.error("empty sequence"))?;
            if items.len() == 0 {
                return Ok(first);
            }
            Ok(GrammarNode::sequence_with(first, items))
        });

        interpreter.set_evaluator(&self.and, |e, rules| {
            Ok(GrammarNode::and_predicate(e.child(0)?.evaluate(rules)?))
        });
        interpreter.set_evaluator(&self.not, |e, rules| {
            Ok(GrammarNode::not_predicate(e.child(0)?.evaluate(rules)?))
        });

        interpreter.set_evaluator(&self.quantified, |e, rules| {
            let mut node = e.child(0)?.evaluate(rules)?;
            for quantifier in e.iter().skip(1) {
                node = match quantifier.as_str() {
                    "*" => GrammarNode::zero_or_more(node),
                    "+" => GrammarNode::one_or_more(node),
                    "~*" => GrammarNode::zero_or_more_with(node, Boundary::Tight),
                    "~+" => GrammarNode::one_or_more_with(node, Boundary::Tight),
                    "?" => GrammarNode::optional(node),
                    other => return Err(quantifier.error(format!("unknown quantifier `{other}`"))),
                };
            }
            Ok(node)
        });

        // Both quote characters are one byte wide.
        interpreter.set_evaluator(&self.literal, |e, _| {
            let text = e.as_str();
            Ok(GrammarNode::literal(unescape(&text[1..text.len() - 1])))
        });

        interpreter.set_evaluator(&self.class, |e, _| {
            let text = e.as_str();
            let body = &text[1..text.len() - 1];
            let (negated, body) = match body.strip_prefix('^') {
                Some(rest) => (true, rest),
                None => (false, body),
            };
            let ranges = class_ranges(body).map_err(|message| e.error(message))?;
            Ok(if negated {
                GrammarNode::negated_class(ranges)
            } else {
                GrammarNode::class(ranges)
            })
        });

        interpreter.set_evaluator(&self.any, |_, _| Ok(GrammarNode::any()));
        interpreter.set_evaluator(&self.name, |e, rules| {
            Ok(GrammarNode::rule(&rules.get_or_create(e.as_str())))
        });

        interpreter
    }
}
