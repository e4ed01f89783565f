//! Grammar representation: the PEG operator DAG and the rules that name it.
//!
//! A grammar is a set of [`Rule`]s whose bodies are [`GrammarNode`] trees.
//! Nodes are immutable and shared behind [`Arc`]; a body refers to other rules
//! through [`RuleRef`], which holds a [`Weak`] handle so that recursive and
//! mutually recursive grammars never form strong cycles. Whoever runs the
//! grammar (the [`RuleSet`] while building, the [`Parser`](crate::Parser)
//! afterwards) keeps the strong handles.
//!
//! Rules are built in two phases: a rule is reserved by name the first time
//! anything refers to it and receives its body later, exactly once. This is
//! what lets a pattern mention a rule that has not been written yet.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;

use crate::errors::GrammarError;

/// Shared handle to an immutable grammar node.
pub type Node = Arc<GrammarNode>;

// ============================================================================
// RULE IDENTITY
// ============================================================================

static NEXT_RULE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Rule`], used for evaluator dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(u64);

impl RuleId {
    fn next() -> Self {
        RuleId(NEXT_RULE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// RULES
// ============================================================================

/// A named binding of an identifier to a grammar body.
///
/// The name is only used for diagnostics and need not be unique; identity is
/// carried by [`RuleId`]. The body can be assigned once and is immutable
/// afterwards.
pub struct Rule {
    id: RuleId,
    name: Arc<str>,
    body: OnceCell<Node>,
}

impl Rule {
    /// Creates a rule whose body is still unassigned.
    pub fn new(name: &str) -> Arc<Rule> {
        Arc::new(Rule {
            id: RuleId::next(),
            name: Arc::from(name),
            body: OnceCell::new(),
        })
    }

    /// Creates a rule with its body already in place.
    pub fn with_body(name: &str, body: Node) -> Arc<Rule> {
        Arc::new(Rule {
            id: RuleId::next(),
            name: Arc::from(name),
            body: OnceCell::with_value(body),
        })
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> Option<&Node> {
        self.body.get()
    }

    pub fn is_defined(&self) -> bool {
        self.body.get().is_some()
    }

    /// Assigns the body. Fails if the rule already has one.
    pub fn define(&self, body: Node) -> Result<(), GrammarError> {
        self.body.set(body).map_err(|_| GrammarError::Redefinition {
            rule: self.name.to_string(),
        })
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Rule {}

impl std::hash::Hash for Rule {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// Bodies may be cyclic through references; never print them from Debug.
impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("defined", &self.is_defined())
            .finish()
    }
}

/// Non-owning reference from a grammar body to a rule.
#[derive(Clone)]
pub struct RuleRef {
    id: RuleId,
    name: Arc<str>,
    target: Weak<Rule>,
}

impl RuleRef {
    pub fn new(rule: &Arc<Rule>) -> Self {
        RuleRef {
            id: rule.id,
            name: Arc::clone(&rule.name),
            target: Arc::downgrade(rule),
        }
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The referenced rule, if anything still owns it.
    pub fn upgrade(&self) -> Option<Arc<Rule>> {
        self.target.upgrade()
    }
}

impl PartialEq for RuleRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for RuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.id)
    }
}

// ============================================================================
// GRAMMAR NODES
// ============================================================================

/// Whether the separator rule is tried in the gap between two adjacent items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Separated,
    Tight,
}

/// One PEG operator.
#[derive(Debug, Clone, PartialEq)]
pub enum GrammarNode {
    Literal(String),
    CharacterClass {
        ranges: Vec<(char, char)>,
        negated: bool,
    },
    AnyCharacter,
    /// `boundaries[i]` is the gap between `items[i]` and `items[i + 1]`.
    /// A gap without an entry is separated.
    Sequence {
        items: Vec<Node>,
        boundaries: Vec<Boundary>,
    },
    Choice(Vec<Node>),
    ZeroOrMore {
        child: Node,
        boundary: Boundary,
    },
    OneOrMore {
        child: Node,
        boundary: Boundary,
    },
    Optional(Node),
    AndPredicate(Node),
    NotPredicate(Node),
    RuleReference(RuleRef),
}

impl GrammarNode {
    pub fn literal(text: impl Into<String>) -> Node {
        Arc::new(GrammarNode::Literal(text.into()))
    }

    pub fn class(ranges: Vec<(char, char)>) -> Node {
        Arc::new(GrammarNode::CharacterClass {
            ranges,
            negated: false,
        })
    }

    pub fn negated_class(ranges: Vec<(char, char)>) -> Node {
        Arc::new(GrammarNode::CharacterClass {
            ranges,
            negated: true,
        })
    }

    pub fn any() -> Node {
        Arc::new(GrammarNode::AnyCharacter)
    }

    /// A sequence that tries the separator at every boundary.
    pub fn sequence(items: Vec<Node>) -> Node {
        let boundaries = vec![Boundary::Separated; items.len().saturating_sub(1)];
        Arc::new(GrammarNode::Sequence { items, boundaries })
    }

    /// A sequence that never tries the separator.
    pub fn tight_sequence(items: Vec<Node>) -> Node {
        let boundaries = vec![Boundary::Tight; items.len().saturating_sub(1)];
        Arc::new(GrammarNode::Sequence { items, boundaries })
    }

    /// A sequence with an explicit boundary before each item after the first.
    pub fn sequence_with(first: Node, rest: impl IntoIterator<Item = (Boundary, Node)>) -> Node {
        let mut items = vec![first];
        let mut boundaries = Vec::new();
        for (boundary, item) in rest {
            boundaries.push(boundary);
            items.push(item);
        }
        Arc::new(GrammarNode::Sequence { items, boundaries })
    }

    pub fn choice(alternatives: Vec<Node>) -> Node {
        Arc::new(GrammarNode::Choice(alternatives))
    }

    /// Repetition; iterations of a terminal are tight, anything else is separated.
    pub fn zero_or_more(child: Node) -> Node {
        let boundary = Self::repetition_boundary(&child);
        Self::zero_or_more_with(child, boundary)
    }

    pub fn zero_or_more_with(child: Node, boundary: Boundary) -> Node {
        Arc::new(GrammarNode::ZeroOrMore { child, boundary })
    }

    /// Repetition; iterations of a terminal are tight, anything else is separated.
    pub fn one_or_more(child: Node) -> Node {
        let boundary = Self::repetition_boundary(&child);
        Self::one_or_more_with(child, boundary)
    }

    pub fn one_or_more_with(child: Node, boundary: Boundary) -> Node {
        Arc::new(GrammarNode::OneOrMore { child, boundary })
    }

    pub fn optional(child: Node) -> Node {
        Arc::new(GrammarNode::Optional(child))
    }

    pub fn and_predicate(child: Node) -> Node {
        Arc::new(GrammarNode::AndPredicate(child))
    }

    pub fn not_predicate(child: Node) -> Node {
        Arc::new(GrammarNode::NotPredicate(child))
    }

    pub fn rule(rule: &Arc<Rule>) -> Node {
        Arc::new(GrammarNode::RuleReference(RuleRef::new(rule)))
    }

    /// Literals, classes and the any-character atom.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GrammarNode::Literal(_) | GrammarNode::CharacterClass { .. } | GrammarNode::AnyCharacter
        )
    }

    fn repetition_boundary(child: &GrammarNode) -> Boundary {
        if child.is_terminal() {
            Boundary::Tight
        } else {
            Boundary::Separated
        }
    }

    /// Calls `visit` for every rule reference in this node, without following
    /// references into other rules.
    pub fn for_each_reference(&self, visit: &mut impl FnMut(&RuleRef)) {
        match self {
            GrammarNode::Literal(_)
            | GrammarNode::CharacterClass { .. }
            | GrammarNode::AnyCharacter => {}
            GrammarNode::Sequence { items, .. } | GrammarNode::Choice(items) => {
                for item in items {
                    item.for_each_reference(visit);
                }
            }
            GrammarNode::ZeroOrMore { child, .. }
            | GrammarNode::OneOrMore { child, .. }
            | GrammarNode::Optional(child)
            | GrammarNode::AndPredicate(child)
            | GrammarNode::NotPredicate(child) => child.for_each_reference(visit),
            GrammarNode::RuleReference(reference) => visit(reference),
        }
    }

    // Binding strength used to parenthesize operands when printing.
    fn binding(&self) -> u8 {
        match self {
            GrammarNode::Choice(alternatives) if alternatives.len() == 1 => alternatives[0].binding(),
            GrammarNode::Choice(_) => 0,
            GrammarNode::Sequence { items, .. } if items.len() == 1 => items[0].binding(),
            GrammarNode::Sequence { items, .. } if !items.is_empty() => 1,
            GrammarNode::AndPredicate(_) | GrammarNode::NotPredicate(_) => 2,
            GrammarNode::ZeroOrMore { .. }
            | GrammarNode::OneOrMore { .. }
            | GrammarNode::Optional(_) => 3,
            _ => 4,
        }
    }
}

// ============================================================================
// DISPLAY (GDL TEXT)
// ============================================================================

const PREFIX_OPERAND: u8 = 3;
const POSTFIX_OPERAND: u8 = 4;
const SEQUENCE_ITEM: u8 = 2;
const CHOICE_ALTERNATIVE: u8 = 1;

fn write_operand(f: &mut fmt::Formatter<'_>, node: &GrammarNode, required: u8) -> fmt::Result {
    if node.binding() < required {
        write!(f, "({node})")
    } else {
        write!(f, "{node}")
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, c: char, specials: &[char]) -> fmt::Result {
    match c {
        '\n' => f.write_str("\\n"),
        '\t' => f.write_str("\\t"),
        '\r' => f.write_str("\\r"),
        '\0' => f.write_str("\\0"),
        '\\' => f.write_str("\\\\"),
        c if specials.contains(&c) => write!(f, "\\{c}"),
        c => write!(f, "{c}"),
    }
}

fn write_repetition(
    f: &mut fmt::Formatter<'_>,
    child: &GrammarNode,
    boundary: Boundary,
    quantifier: char,
) -> fmt::Result {
    write_operand(f, child, POSTFIX_OPERAND)?;
    if boundary == Boundary::Tight && !child.is_terminal() {
        f.write_str("~")?;
    }
    write!(f, "{quantifier}")
}

/// The boundary in front of `items[index]` of a sequence.
pub(crate) fn gap_before(boundaries: &[Boundary], index: usize) -> Boundary {
    index
        .checked_sub(1)
        .and_then(|gap| boundaries.get(gap))
        .copied()
        .unwrap_or(Boundary::Separated)
}

impl fmt::Display for GrammarNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarNode::Literal(text) => {
                f.write_str("'")?;
                for c in text.chars() {
                    write_escaped(f, c, &['\''])?;
                }
                f.write_str("'")
            }
            GrammarNode::CharacterClass { ranges, negated } => {
                f.write_str("[")?;
                if *negated {
                    f.write_str("^")?;
                }
                for &(low, high) in ranges {
                    write_escaped(f, low, &[']', '-', '^'])?;
                    if low != high {
                        f.write_str("-")?;
                        write_escaped(f, high, &[']', '-', '^'])?;
                    }
                }
                f.write_str("]")
            }
            GrammarNode::AnyCharacter => f.write_str("."),
            GrammarNode::Sequence { items, boundaries } => {
                if items.is_empty() {
                    return f.write_str("''");
                }
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        match gap_before(boundaries, index) {
                            Boundary::Separated => f.write_str(" ")?,
                            Boundary::Tight => f.write_str(" ~ ")?,
                        }
                    }
                    let required = if items.len() == 1 { 0 } else { SEQUENCE_ITEM };
                    write_operand(f, item, required)?;
                }
                Ok(())
            }
            GrammarNode::Choice(alternatives) => {
                for (index, alternative) in alternatives.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" | ")?;
                    }
                    write_operand(f, alternative, CHOICE_ALTERNATIVE)?;
                }
                Ok(())
            }
            GrammarNode::ZeroOrMore { child, boundary } => {
                write_repetition(f, child, *boundary, '*')
            }
            GrammarNode::OneOrMore { child, boundary } => write_repetition(f, child, *boundary, '+'),
            GrammarNode::Optional(child) => {
                write_operand(f, child, POSTFIX_OPERAND)?;
                f.write_str("?")
            }
            GrammarNode::AndPredicate(child) => {
                f.write_str("&")?;
                write_operand(f, child, PREFIX_OPERAND)
            }
            GrammarNode::NotPredicate(child) => {
                f.write_str("!")?;
                write_operand(f, child, PREFIX_OPERAND)
            }
            GrammarNode::RuleReference(reference) => f.write_str(reference.name()),
        }
    }
}

// ============================================================================
// RULE REGISTRY
// ============================================================================

/// Name-addressed registry that hands out rules on first reference.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: HashMap<String, Arc<Rule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rule registered under `name`, reserving it if needed.
    pub fn get_or_create(&mut self, name: &str) -> Arc<Rule> {
        if let Some(rule) = self.rules.get(name) {
            return Arc::clone(rule);
        }
        let rule = Rule::new(name);
        self.rules.insert(name.to_string(), Arc::clone(&rule));
        rule
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Rule>> {
        self.rules.get(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.values()
    }

    /// Reserved rules that never received a body, in creation order.
    pub fn undefined(&self) -> Vec<&Arc<Rule>> {
        let mut undefined: Vec<_> = self.rules.values().filter(|r| !r.is_defined()).collect();
        undefined.sort_by_key(|r| r.id());
        undefined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_body_is_assigned_once() {
        let rule = Rule::new("Digit");
        assert!(!rule.is_defined());
        rule.define(GrammarNode::class(vec![('0', '9')])).unwrap();
        assert!(rule.is_defined());

        let again = rule.define(GrammarNode::any());
        assert!(matches!(again, Err(GrammarError::Redefinition { rule }) if rule == "Digit"));
    }

    #[test]
    fn rule_identity_is_not_the_name() {
        let a = Rule::new("Same");
        let b = Rule::new("Same");
        assert_ne!(a.id(), b.id());
        assert_ne!(*a, *b);
    }

    #[test]
    fn rule_set_reserves_on_first_reference() {
        let mut rules = RuleSet::new();
        let first = rules.get_or_create("Value");
        let second = rules.get_or_create("Value");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.undefined().len(), 1);

        first.define(GrammarNode::literal("v")).unwrap();
        assert!(rules.undefined().is_empty());
    }

    #[test]
    fn references_do_not_keep_rules_alive() {
        let rule = Rule::new("Gone");
        let node = GrammarNode::rule(&rule);
        drop(rule);
        match &*node {
            GrammarNode::RuleReference(reference) => assert!(reference.upgrade().is_none()),
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn repetition_boundary_depends_on_child() {
        let rule = Rule::new("Word");
        let words = GrammarNode::zero_or_more(GrammarNode::rule(&rule));
        let letters = GrammarNode::one_or_more(GrammarNode::class(vec![('a', 'z')]));
        assert!(matches!(
            &*words,
            GrammarNode::ZeroOrMore { boundary: Boundary::Separated, .. }
        ));
        assert!(matches!(
            &*letters,
            GrammarNode::OneOrMore { boundary: Boundary::Tight, .. }
        ));
    }

    #[test]
    fn display_renders_gdl_text() {
        let word = Rule::new("Word");
        let node = GrammarNode::choice(vec![
            GrammarNode::sequence_with(
                GrammarNode::rule(&word),
                [
                    (Boundary::Separated, GrammarNode::zero_or_more(GrammarNode::literal("a'b"))),
                    (
                        Boundary::Tight,
                        GrammarNode::not_predicate(GrammarNode::any()),
                    ),
                ],
            ),
            GrammarNode::one_or_more_with(
                GrammarNode::sequence(vec![GrammarNode::rule(&word), GrammarNode::rule(&word)]),
                Boundary::Tight,
            ),
            GrammarNode::negated_class(vec![('a', 'z'), ('-', '-')]),
        ]);
        assert_eq!(node.to_string(), r"Word 'a\'b'* ~ !. | (Word Word)~+ | [^a-z\-]");
    }

    #[test]
    fn sequences_with_missing_boundaries_are_separated() {
        let node = GrammarNode::Sequence {
            items: vec![GrammarNode::literal("a"), GrammarNode::literal("b")],
            boundaries: vec![],
        };
        assert_eq!(node.to_string(), "'a' 'b'");
        assert_eq!(gap_before(&[Boundary::Tight], 1), Boundary::Tight);
        assert_eq!(gap_before(&[Boundary::Tight], 2), Boundary::Separated);
    }
}
