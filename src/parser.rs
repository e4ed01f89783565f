//! The backtracking matcher.
//!
//! [`Parser`] owns a validated grammar (start rule, optional separator rule
//! and strong handles to every rule reachable from them) and turns input text
//! into a [`SyntaxTree`] by unmemoized recursive descent with ordered choice.
//!
//! Every elementary match attempt reports success as a `bool`. A failing
//! attempt leaves the cursor and the collected children exactly as it found
//! them, which is what lets choice, repetition and predicates retry freely.
//! The deepest failing position is remembered for diagnostics.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::errors::{GrammarError, SyntaxError};
use crate::grammar::{gap_before, Boundary, GrammarNode, Rule, RuleRef};
use crate::syntax::{Failure, FailureKind, SyntaxTree};

/// Tunables for a [`Parser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Maximum nesting of rule invocations. `None` leaves recursion unbounded.
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Parser {
    start: Arc<Rule>,
    separator: Option<Arc<Rule>>,
    rules: Vec<Arc<Rule>>,
    options: ParserOptions,
}

impl Parser {
    /// Validates the grammar reachable from `start` and `separator`.
    ///
    /// Every referenced rule must still exist and have a body. The parser
    /// keeps strong handles to all of them, so the grammar lives as long as
    /// the parser does.
    pub fn new(start: Arc<Rule>, separator: Option<Arc<Rule>>) -> Result<Self, GrammarError> {
        let rules = reachable_rules(&start, separator.as_ref())?;
        debug!(
            "parser for `{}` ready with {} rules{}",
            start.name(),
            rules.len(),
            separator
                .as_ref()
                .map(|s| format!(", separator `{}`", s.name()))
                .unwrap_or_default()
        );
        Ok(Parser {
            start,
            separator,
            rules,
            options: ParserOptions::default(),
        })
    }

    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    pub fn start(&self) -> &Arc<Rule> {
        &self.start
    }

    pub fn separator(&self) -> Option<&Arc<Rule>> {
        self.separator.as_ref()
    }

    /// Every rule reachable from the start and separator rules.
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn options(&self) -> ParserOptions {
        self.options
    }

    /// Matches the start rule at the beginning of `input`.
    ///
    /// A returned tree does not imply the whole input matched: check
    /// [`SyntaxTree::is_complete`], or use [`parse_complete`](Self::parse_complete).
    pub fn parse<'i>(&self, input: &'i str) -> SyntaxTree<'i> {
        let mut matcher = Matcher::new(self, input);
        let mut roots = Vec::with_capacity(1);
        let matched = matcher.invoke(Arc::clone(&self.start), &mut roots);
        let failure = matcher.furthest.take();

        let tree = match roots.pop() {
            Some(tree) if matched && !matcher.aborted => tree,
            _ => SyntaxTree::failed(Some(Arc::clone(&self.start)), input),
        };
        trace!(
            "parsed {} of {} bytes with `{}` (valid: {})",
            tree.end(),
            input.len(),
            self.start.name(),
            tree.is_valid()
        );
        tree.with_failure(failure)
    }

    /// Like [`parse`](Self::parse), but fails unless the whole input matched.
    pub fn parse_complete<'i>(&self, input: &'i str) -> Result<SyntaxTree<'i>, SyntaxError> {
        let tree = self.parse(input);
        if tree.is_complete() {
            Ok(tree)
        } else {
            Err(SyntaxError::from_tree(&tree))
        }
    }
}

fn reachable_rules(
    start: &Arc<Rule>,
    separator: Option<&Arc<Rule>>,
) -> Result<Vec<Arc<Rule>>, GrammarError> {
    let mut seen = HashSet::new();
    let mut pending: Vec<Arc<Rule>> = std::iter::once(start)
        .chain(separator)
        .map(Arc::clone)
        .collect();
    let mut rules = Vec::new();

    while let Some(rule) = pending.pop() {
        if !seen.insert(rule.id()) {
            continue;
        }
        let body = rule.body().ok_or_else(|| GrammarError::Unresolved {
            rule: rule.name().to_string(),
        })?;

        let mut dropped = None;
        body.for_each_reference(&mut |reference: &RuleRef| match reference.upgrade() {
            Some(target) => pending.push(target),
            None => {
                dropped.get_or_insert_with(|| reference.name().to_string());
            }
        });
        if let Some(rule) = dropped {
            return Err(GrammarError::Unresolved { rule });
        }
        rules.push(rule);
    }
    Ok(rules)
}

// ============================================================================
// MATCHING
// ============================================================================

/// Per-call matching state. Nothing here outlives one `parse`.
struct Matcher<'p, 'i> {
    parser: &'p Parser,
    input: &'i str,
    position: usize,
    furthest: Option<Failure>,
    active: Option<Arc<Rule>>,
    active_begin: usize,
    depth: usize,
    // Inside predicates and separators failures are not recorded.
    quiet: usize,
    in_separator: bool,
    aborted: bool,
}

impl<'p, 'i> Matcher<'p, 'i> {
    fn new(parser: &'p Parser, input: &'i str) -> Self {
        Matcher {
            parser,
            input,
            position: 0,
            furthest: None,
            active: None,
            active_begin: 0,
            depth: 0,
            quiet: 0,
            in_separator: false,
            aborted: false,
        }
    }

    fn rest(&self) -> &'i str {
        &self.input[self.position..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Records a failure candidate at the cursor and returns `false`.
    fn fail(&mut self) -> bool {
        if self.quiet == 0 && !self.aborted {
            let deeper = self
                .furthest
                .as_ref()
                .map_or(true, |failure| self.position > failure.position);
            if deeper {
                self.furthest = Some(Failure {
                    rule: self.active.clone(),
                    begin: self.active_begin,
                    position: self.position,
                    kind: FailureKind::Mismatch,
                });
            }
        }
        false
    }

    fn matches(&mut self, node: &GrammarNode, out: &mut Vec<SyntaxTree<'i>>) -> bool {
        if self.aborted {
            return false;
        }
        match node {
            GrammarNode::Literal(text) => {
                if self.rest().starts_with(text.as_str()) {
                    self.position += text.len();
                    true
                } else {
                    self.fail()
                }
            }
            GrammarNode::CharacterClass { ranges, negated } => match self.peek() {
                Some(c) if ranges.iter().any(|&(low, high)| low <= c && c <= high) != *negated => {
                    self.position += c.len_utf8();
                    true
                }
                _ => self.fail(),
            },
            GrammarNode::AnyCharacter => match self.peek() {
                Some(c) => {
                    self.position += c.len_utf8();
                    true
                }
                None => self.fail(),
            },
            GrammarNode::Sequence { items, boundaries } => {
                let start = self.position;
                let mark = out.len();
                for (index, item) in items.iter().enumerate() {
                    if index > 0 && gap_before(boundaries, index) == Boundary::Separated {
                        self.skip_separator();
                    }
                    if !self.matches(item, out) {
                        self.position = start;
                        out.truncate(mark);
                        return false;
                    }
                }
                true
            }
            GrammarNode::Choice(alternatives) => alternatives
                .iter()
                .any(|alternative| self.matches(alternative, out)),
            GrammarNode::ZeroOrMore { child, boundary } => {
                self.repeat(child, *boundary, out);
                true
            }
            GrammarNode::OneOrMore { child, boundary } => self.repeat(child, *boundary, out) > 0,
            GrammarNode::Optional(child) => {
                self.matches(child, out);
                true
            }
            GrammarNode::AndPredicate(child) => {
                if self.lookahead(child) {
                    true
                } else {
                    self.fail()
                }
            }
            GrammarNode::NotPredicate(child) => {
                if self.lookahead(child) {
                    self.fail()
                } else {
                    true
                }
            }
            GrammarNode::RuleReference(reference) => match reference.upgrade() {
                Some(rule) => self.invoke(rule, out),
                None => self.fail(),
            },
        }
    }

    fn invoke(&mut self, rule: Arc<Rule>, out: &mut Vec<SyntaxTree<'i>>) -> bool {
        if self.aborted {
            return false;
        }
        if let Some(limit) = self.parser.options.max_depth {
            if self.depth >= limit {
                warn!(
                    "rule `{}` exceeded the recursion limit of {limit} at offset {}",
                    rule.name(),
                    self.position
                );
                self.furthest = Some(Failure {
                    rule: Some(rule),
                    begin: self.position,
                    position: self.position,
                    kind: FailureKind::RecursionLimit(limit),
                });
                self.aborted = true;
                return false;
            }
        }
        let body = match rule.body() {
            Some(body) => Arc::clone(body),
            None => return self.fail(),
        };

        let begin = self.position;
        let outer_rule = self.active.replace(Arc::clone(&rule));
        let outer_begin = std::mem::replace(&mut self.active_begin, begin);
        self.depth += 1;

        let mut children = Vec::new();
        let matched = self.matches(&body, &mut children);

        self.depth -= 1;
        self.active = outer_rule;
        self.active_begin = outer_begin;

        let matched = matched && !self.aborted;
        if matched {
            out.push(SyntaxTree::matched(
                Some(rule),
                self.input,
                begin,
                self.position,
                children,
            ));
        }
        matched
    }

    /// Loops `child`, returning how many iterations matched.
    fn repeat(
        &mut self,
        child: &GrammarNode,
        boundary: Boundary,
        out: &mut Vec<SyntaxTree<'i>>,
    ) -> usize {
        let mut count = 0;
        loop {
            let before = self.position;
            let mark = out.len();
            if count > 0 && boundary == Boundary::Separated {
                self.skip_separator();
            }
            if !self.matches(child, out) {
                self.position = before;
                out.truncate(mark);
                break;
            }
            count += 1;
            // an iteration that consumed nothing would repeat forever
            if self.position == before {
                break;
            }
        }
        count
    }

    /// Runs `child` without moving the cursor or keeping any trees.
    fn lookahead(&mut self, child: &GrammarNode) -> bool {
        let start = self.position;
        let mut discarded = Vec::new();
        self.quiet += 1;
        let matched = self.matches(child, &mut discarded);
        self.quiet -= 1;
        self.position = start;
        matched
    }

    fn skip_separator(&mut self) {
        if self.in_separator {
            return;
        }
        let parser = self.parser;
        let Some(body) = parser.separator.as_ref().and_then(|rule| rule.body()) else {
            return;
        };

        let start = self.position;
        let mut discarded = Vec::new();
        self.in_separator = true;
        self.quiet += 1;
        if !self.matches(body, &mut discarded) {
            self.position = start;
        }
        self.quiet -= 1;
        self.in_separator = false;
    }
}
