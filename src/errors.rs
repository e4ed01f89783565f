//! Trellis error handling.
//!
//! Three failure families leave the engine:
//!
//! - [`GrammarError`]: the grammar itself is broken (malformed pattern text,
//!   a rule referenced but never defined, a rule defined twice). Raised while
//!   building, never while parsing.
//! - [`SyntaxError`]: the input does not fully match the start rule. Carries
//!   the furthest failure seen during the parse.
//! - [`InterpreterError`]: a matched node could not be evaluated.
//!
//! Match failures inside the backtracking engine are not errors at all; they
//! are plain `bool` results. All three types implement [`miette::Diagnostic`]
//! with the offending text as source code, and build their messages only when
//! displayed.

use std::fmt;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceCode, SourceSpan};
use thiserror::Error;

use crate::syntax::{FailureKind, Span, SyntaxTree};

// ============================================================================
// GRAMMAR CONSTRUCTION
// ============================================================================

#[derive(Debug, Error, Diagnostic)]
pub enum GrammarError {
    #[error("invalid grammar pattern: {message}")]
    #[diagnostic(code(trellis::grammar::syntax))]
    Syntax {
        message: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("rule `{rule}` is referenced but never defined")]
    #[diagnostic(
        code(trellis::grammar::unresolved),
        help("every rule reachable from the start rule needs a body before the parser is built")
    )]
    Unresolved { rule: String },

    #[error("rule `{rule}` is already defined")]
    #[diagnostic(code(trellis::grammar::redefinition))]
    Redefinition { rule: String },

    #[error("no start rule was set")]
    #[diagnostic(
        code(trellis::grammar::missing_start),
        help("call `set_start` with the top-level rule")
    )]
    MissingStart,
}

impl GrammarError {
    pub(crate) fn pattern(message: impl Into<String>, pattern: &str, span: Span) -> Self {
        GrammarError::Syntax {
            message: message.into(),
            src: NamedSource::new("pattern", pattern.to_string()),
            span: span.into(),
        }
    }
}

// ============================================================================
// SYNTAX ERRORS
// ============================================================================

/// The input did not fully match the start rule.
#[derive(Debug)]
pub struct SyntaxError {
    rule: Option<String>,
    position: usize,
    span: Span,
    kind: FailureKind,
    input: String,
}

impl SyntaxError {
    /// Builds the error for a tree that is invalid or stops short of the end
    /// of its input.
    ///
    /// The error is anchored at the furthest failure, even when that lies
    /// inside the partial match. A tree that recorded no failure at all is
    /// anchored at the end of the match.
    pub fn from_tree(tree: &SyntaxTree<'_>) -> Self {
        let input = tree.input().to_string();
        match tree.furthest_failure() {
            Some(failure) => SyntaxError {
                rule: failure.rule_name().or(tree.name()).map(str::to_string),
                position: failure.position,
                span: failure.span(),
                kind: failure.kind,
                input,
            },
            None => SyntaxError {
                rule: tree.name().map(str::to_string),
                position: tree.end(),
                span: Span::new(tree.end(), tree.end()),
                kind: FailureKind::Mismatch,
                input,
            },
        }
    }

    /// Name of the rule that was active at the failure.
    pub fn rule_name(&self) -> Option<&str> {
        self.rule.as_deref()
    }

    /// Byte offset of the furthest failing match.
    pub fn position(&self) -> usize {
        self.position
    }

    /// From the start of the failing rule's invocation to [`position`](Self::position).
    pub fn span(&self) -> Span {
        self.span
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Renders the source line containing the failure with a `~~~^` marker
    /// under the failing span, followed by the message.
    pub fn annotate(&self) -> String {
        let position = self.position.min(self.input.len());
        let line_start = self.input[..position].rfind('\n').map_or(0, |i| i + 1);
        let line_end = self.input[position..]
            .find('\n')
            .map_or(self.input.len(), |i| position + i);
        let span_start = self.span.start.clamp(line_start, position);

        let indent = self.input[line_start..span_start].chars().count();
        let tildes = self.input[span_start..position].chars().count();
        format!(
            "{}\n{}{}^\n{}",
            &self.input[line_start..line_end],
            " ".repeat(indent),
            "~".repeat(tildes),
            self
        )
    }
}

impl std::error::Error for SyntaxError {}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.rule) {
            (FailureKind::RecursionLimit(limit), Some(rule)) => write!(
                f,
                "syntax error while parsing {rule}: recursion limit of {limit} exceeded"
            ),
            (FailureKind::RecursionLimit(limit), None) => {
                write!(f, "syntax error: recursion limit of {limit} exceeded")
            }
            (FailureKind::Mismatch, Some(rule)) => write!(f, "syntax error while parsing {rule}"),
            (FailureKind::Mismatch, None) => {
                write!(f, "syntax error at offset {}", self.position)
            }
        }
    }
}

impl Diagnostic for SyntaxError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new("trellis::syntax"))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self.kind {
            FailureKind::RecursionLimit(_) => Some(Box::new(
                "a rule may be left-recursive",
            )),
            FailureKind::Mismatch => None,
        }
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        Some(&self.input)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let text = match &self.rule {
            Some(rule) => format!("{rule} failed here"),
            None => "unexpected input".to_string(),
        };
        let labels = vec![LabeledSpan::new(Some(text), self.span.start, self.span.len())];
        Some(Box::new(labels.into_iter()))
    }
}

// ============================================================================
// INTERPRETER ERRORS
// ============================================================================

#[derive(Debug, Error, Diagnostic)]
pub enum InterpreterError {
    #[error("no evaluator for `{rule}` and it has {children} children to fall back on")]
    #[diagnostic(
        code(trellis::interpreter::missing_evaluator),
        help("bind an evaluator to this rule, or shape it so it matches exactly one child rule")
    )]
    MissingEvaluator {
        rule: String,
        children: usize,
        #[source_code]
        input: String,
        #[label("matched here")]
        span: SourceSpan,
    },

    #[error("{message}")]
    #[diagnostic(code(trellis::interpreter::evaluation))]
    Evaluation {
        message: String,
        #[source_code]
        input: String,
        #[label("while evaluating this")]
        span: SourceSpan,
    },
}

impl InterpreterError {
    pub(crate) fn missing_evaluator(tree: &SyntaxTree<'_>) -> Self {
        InterpreterError::MissingEvaluator {
            rule: tree.name().unwrap_or("<anonymous>").to_string(),
            children: tree.children().len(),
            input: tree.input().to_string(),
            span: tree.span().into(),
        }
    }

    pub(crate) fn evaluation(message: impl Into<String>, tree: &SyntaxTree<'_>) -> Self {
        InterpreterError::Evaluation {
            message: message.into(),
            input: tree.input().to_string(),
            span: tree.span().into(),
        }
    }

    /// The region of the input being evaluated.
    pub fn span(&self) -> Span {
        let span = match self {
            InterpreterError::MissingEvaluator { span, .. }
            | InterpreterError::Evaluation { span, .. } => span,
        };
        Span::new(span.offset(), span.offset() + span.len())
    }
}

// ============================================================================
// UMBRELLA
// ============================================================================

/// Any failure from building or running a program.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Interpreter(#[from] InterpreterError),
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use miette::Report;

    use super::*;
    use crate::grammar::{GrammarNode, Rule};
    use crate::syntax::Failure;

    fn tree_with_failure<'i>(input: &'i str, end: usize, failure: Failure) -> SyntaxTree<'i> {
        let start = Rule::with_body("Start", GrammarNode::any());
        SyntaxTree::matched(Some(start), input, 0, end, vec![]).with_failure(Some(failure))
    }

    #[test]
    fn anchors_at_furthest_failure_beyond_partial_match() {
        let word = Rule::with_body("Word", GrammarNode::any());
        let tree = tree_with_failure(
            "Hello World",
            5,
            Failure {
                rule: Some(Arc::clone(&word)),
                begin: 6,
                position: 11,
                kind: FailureKind::Mismatch,
            },
        );
        let error = SyntaxError::from_tree(&tree);
        assert_eq!(error.rule_name(), Some("Word"));
        assert_eq!(error.position(), 11);
        assert_eq!(error.span(), Span::new(6, 11));
        assert_eq!(error.to_string(), "syntax error while parsing Word");
    }

    #[test]
    fn anchors_at_furthest_failure_inside_partial_match() {
        let tree = tree_with_failure(
            "abc",
            2,
            Failure {
                rule: None,
                begin: 0,
                position: 1,
                kind: FailureKind::Mismatch,
            },
        );
        let error = SyntaxError::from_tree(&tree);
        assert_eq!(error.rule_name(), Some("Start"));
        assert_eq!(error.position(), 1);
        assert_eq!(error.span(), Span::new(0, 1));
    }

    #[test]
    fn falls_back_to_end_of_match_without_failures() {
        let start = Rule::with_body("Start", GrammarNode::any());
        let tree = SyntaxTree::matched(Some(start), "abc", 0, 2, vec![]);
        let error = SyntaxError::from_tree(&tree);
        assert_eq!(error.rule_name(), Some("Start"));
        assert_eq!(error.position(), 2);
        assert_eq!(error.span(), Span::new(2, 2));
    }

    #[test]
    fn annotate_marks_the_failing_span() {
        let word = Rule::with_body("Word", GrammarNode::any());
        let tree = tree_with_failure(
            "first line\nsecond lime",
            0,
            Failure {
                rule: Some(word),
                begin: 18,
                position: 21,
                kind: FailureKind::Mismatch,
            },
        );
        let error = SyntaxError::from_tree(&tree);
        assert_eq!(
            error.annotate(),
            "second lime\n       ~~~^\nsyntax error while parsing Word"
        );
    }

    #[test]
    fn recursion_limit_has_help() {
        let tree = tree_with_failure(
            "x",
            0,
            Failure {
                rule: None,
                begin: 0,
                position: 0,
                kind: FailureKind::RecursionLimit(64),
            },
        );
        let error = SyntaxError::from_tree(&tree);
        assert!(error.to_string().contains("recursion limit of 64"));
        let report = format!("{:?}", Report::new(error));
        assert!(report.contains("left-recursive"));
    }

    #[test]
    fn reports_render_through_miette() {
        let error = GrammarError::pattern("unexpected input", "'abc", Span::new(0, 4));
        let output = format!("{:?}", Report::new(error));
        assert!(output.contains("invalid grammar pattern"));
        assert!(output.contains("'abc"));

        let error: Error = GrammarError::MissingStart.into();
        let output = format!("{:?}", Report::new(error));
        assert!(output.contains("set_start"));
    }
}
