//! Syntax trees produced by the [`Parser`](crate::Parser).
//!
//! A tree node records one rule invocation: the producing rule, the byte span
//! it matched and the rule invocations matched directly inside its body.
//! Literals, classes and other anonymous operators leave no node of their own.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::grammar::{Rule, RuleId};

/// Represents a span in the source code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        miette::SourceSpan::from(span.start..span.end)
    }
}

/// Why the deepest recorded failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// An elementary match (literal, class, any, predicate) did not succeed.
    Mismatch,
    /// Rule invocations nested deeper than the configured limit.
    RecursionLimit(usize),
}

/// The furthest point any failed path reached during one parse.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// The rule being matched when the failure happened.
    pub rule: Option<Arc<Rule>>,
    /// Where that rule invocation began.
    pub begin: usize,
    /// Where the failing match was attempted.
    pub position: usize,
    pub kind: FailureKind,
}

impl Failure {
    pub fn rule_name(&self) -> Option<&str> {
        self.rule.as_deref().map(Rule::name)
    }

    /// From the start of the active rule up to the failing position.
    pub fn span(&self) -> Span {
        Span::new(self.begin.min(self.position), self.position)
    }
}

/// Positional record of a match.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxTree<'i> {
    rule: Option<Arc<Rule>>,
    input: &'i str,
    begin: usize,
    end: usize,
    children: Vec<SyntaxTree<'i>>,
    valid: bool,
    failure: Option<Failure>,
}

impl<'i> SyntaxTree<'i> {
    pub(crate) fn matched(
        rule: Option<Arc<Rule>>,
        input: &'i str,
        begin: usize,
        end: usize,
        children: Vec<SyntaxTree<'i>>,
    ) -> Self {
        SyntaxTree {
            rule,
            input,
            begin,
            end,
            children,
            valid: true,
            failure: None,
        }
    }

    /// Root of a parse whose start rule did not match at all.
    pub(crate) fn failed(rule: Option<Arc<Rule>>, input: &'i str) -> Self {
        SyntaxTree {
            rule,
            input,
            begin: 0,
            end: 0,
            children: Vec::new(),
            valid: false,
            failure: None,
        }
    }

    pub(crate) fn with_failure(mut self, failure: Option<Failure>) -> Self {
        self.failure = failure;
        self
    }

    pub fn rule(&self) -> Option<&Arc<Rule>> {
        self.rule.as_ref()
    }

    pub fn rule_id(&self) -> Option<RuleId> {
        self.rule.as_ref().map(|rule| rule.id())
    }

    pub fn name(&self) -> Option<&str> {
        self.rule.as_deref().map(Rule::name)
    }

    /// The whole input this tree was parsed from.
    pub fn input(&self) -> &'i str {
        self.input
    }

    /// The matched text.
    pub fn as_str(&self) -> &'i str {
        &self.input[self.begin..self.end]
    }

    pub fn span(&self) -> Span {
        Span::new(self.begin, self.end)
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Length of the matched text in bytes.
    pub fn length(&self) -> usize {
        self.end - self.begin
    }

    pub fn children(&self) -> &[SyntaxTree<'i>] {
        &self.children
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Valid and spanning the entire input.
    pub fn is_complete(&self) -> bool {
        self.valid && self.begin == 0 && self.end == self.input.len()
    }

    /// Deepest failure seen while producing this tree. Only set on the root
    /// returned by [`Parser::parse`](crate::Parser::parse).
    pub fn furthest_failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// Indented dump of the tree, one node per line.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.pretty_into(&mut out, 0);
        out
    }

    fn pretty_into(&self, out: &mut String, depth: usize) {
        let name = self.name().unwrap_or("<anonymous>");
        let marker = if self.valid { "" } else { " (invalid)" };
        let _ = writeln!(
            out,
            "{:indent$}{name} {}..{} {:?}{marker}",
            "",
            self.begin,
            self.end,
            self.as_str(),
            indent = depth * 2
        );
        for child in &self.children {
            child.pretty_into(out, depth + 1);
        }
    }
}
