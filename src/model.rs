//! Statement data model for authorization.
//!
//! Resources are either [`Resource::Named`] (stable IRI identity) or
//! [`Resource::Blank`] (a [`BlankId`] minted by this crate). Blank ids are
//! plain integers, so decision caches can key on them by value instead of
//! relying on object identity.

use std::fmt;

use oxigraph::model::{BlankNode, Literal, NamedNode, NamedOrBlankNode, Term};

use crate::error::{StoreError, StoreResult};

/// An authenticated principal (user or group), identified by IRI.
pub type Agent = NamedNode;

/// A named partition of the store (a named graph).
pub type Context = NamedNode;

/// Prefix of blank node labels minted by graph-warden.
const BLANK_PREFIX: &str = "wb";

/// Identifier of a blank node.
///
/// Fresh ids are random 128-bit values, so ids minted by independent
/// sessions against the same store do not collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlankId(u128);

impl BlankId {
    /// Mint a new, globally unique blank id.
    pub fn fresh() -> Self {
        Self(rand::random())
    }

    /// Wrap a raw id. Mostly useful for deterministic tests.
    pub fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// The underlying integer.
    pub fn get(self) -> u128 {
        self.0
    }

    pub(crate) fn to_blank_node(self) -> BlankNode {
        BlankNode::new_unchecked(format!("{BLANK_PREFIX}{:032x}", self.0))
    }

    pub(crate) fn from_blank_node(node: &BlankNode) -> Option<Self> {
        // Only the exact rendering of `to_blank_node` maps back to an id.
        let hex = node.as_str().strip_prefix(BLANK_PREFIX)?;
        if hex.len() != 32 || !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return None;
        }
        u128::from_str_radix(hex, 16).ok().map(Self)
    }
}

impl fmt::Display for BlankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:{BLANK_PREFIX}{:032x}", self.0)
    }
}

/// A resource reference: subject position of a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    Named(NamedNode),
    Blank(BlankId),
}

impl Resource {
    /// Create a named resource from an IRI string.
    pub fn named(iri: &str) -> StoreResult<Self> {
        named_node(iri).map(Resource::Named)
    }

    /// Create a resource for a freshly minted blank node.
    pub fn fresh_blank() -> Self {
        Resource::Blank(BlankId::fresh())
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Resource::Blank(_))
    }

    pub fn as_named(&self) -> Option<&NamedNode> {
        match self {
            Resource::Named(n) => Some(n),
            Resource::Blank(_) => None,
        }
    }

    pub(crate) fn to_ox(&self) -> NamedOrBlankNode {
        match self {
            Resource::Named(n) => n.clone().into(),
            Resource::Blank(b) => b.to_blank_node().into(),
        }
    }

    pub(crate) fn from_ox(node: NamedOrBlankNode) -> StoreResult<Self> {
        match node {
            NamedOrBlankNode::NamedNode(n) => Ok(Resource::Named(n)),
            NamedOrBlankNode::BlankNode(b) => BlankId::from_blank_node(&b)
                .map(Resource::Blank)
                .ok_or_else(|| StoreError::UnsupportedTerm {
                    term: b.to_string(),
                }),
        }
    }
}

impl From<NamedNode> for Resource {
    fn from(n: NamedNode) -> Self {
        Resource::Named(n)
    }
}

impl From<BlankId> for Resource {
    fn from(b: BlankId) -> Self {
        Resource::Blank(b)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Named(n) => write!(f, "{n}"),
            Resource::Blank(b) => write!(f, "{b}"),
        }
    }
}

/// Object position of a statement: a resource or a literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Resource(Resource),
    Literal(Literal),
}

impl Value {
    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Value::Resource(r) => Some(r),
            Value::Literal(_) => None,
        }
    }

    /// The blank id if this value is a blank resource.
    pub fn as_blank(&self) -> Option<BlankId> {
        match self {
            Value::Resource(Resource::Blank(b)) => Some(*b),
            _ => None,
        }
    }

    pub(crate) fn to_ox(&self) -> Term {
        match self {
            Value::Resource(r) => r.to_ox().into(),
            Value::Literal(l) => l.clone().into(),
        }
    }

    #[allow(unreachable_patterns)]
    pub(crate) fn from_ox(term: Term) -> StoreResult<Self> {
        match term {
            Term::NamedNode(n) => Ok(Value::Resource(Resource::Named(n))),
            Term::BlankNode(b) => Resource::from_ox(b.into()).map(Value::Resource),
            Term::Literal(l) => Ok(Value::Literal(l)),
            other => Err(StoreError::UnsupportedTerm {
                term: other.to_string(),
            }),
        }
    }
}

impl From<Resource> for Value {
    fn from(r: Resource) -> Self {
        Value::Resource(r)
    }
}

impl From<NamedNode> for Value {
    fn from(n: NamedNode) -> Self {
        Value::Resource(Resource::Named(n))
    }
}

impl From<BlankId> for Value {
    fn from(b: BlankId) -> Self {
        Value::Resource(Resource::Blank(b))
    }
}

impl From<Literal> for Value {
    fn from(l: Literal) -> Self {
        Value::Literal(l)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Literal(Literal::new_simple_literal(s))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Resource(r) => write!(f, "{r}"),
            Value::Literal(l) => write!(f, "{l}"),
        }
    }
}

/// A concrete triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Statement {
    pub subject: Resource,
    pub predicate: NamedNode,
    pub object: Value,
}

impl Statement {
    pub fn new(
        subject: impl Into<Resource>,
        predicate: NamedNode,
        object: impl Into<Value>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate,
            object: object.into(),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.subject, self.predicate, self.object)
    }
}

/// A triple where any position may be unbound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StatementPattern {
    pub subject: Option<Resource>,
    pub predicate: Option<NamedNode>,
    pub object: Option<Value>,
}

impl StatementPattern {
    /// The pattern matching every statement.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, subject: impl Into<Resource>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_predicate(mut self, predicate: NamedNode) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_object(mut self, object: impl Into<Value>) -> Self {
        self.object = Some(object.into());
        self
    }

    /// Pattern of all statements pointing at `object`.
    pub fn referencing(object: impl Into<Value>) -> Self {
        Self::any().with_object(object)
    }

    /// Pattern of all statements about `subject`.
    pub fn about(subject: impl Into<Resource>) -> Self {
        Self::any().with_subject(subject)
    }
}

impl From<Statement> for StatementPattern {
    fn from(stmt: Statement) -> Self {
        Self {
            subject: Some(stmt.subject),
            predicate: Some(stmt.predicate),
            object: Some(stmt.object),
        }
    }
}

impl fmt::Display for StatementPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn slot<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map_or_else(|| "?".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "({} {} {})",
            slot(&self.subject),
            slot(&self.predicate),
            slot(&self.object)
        )
    }
}

/// Parse an IRI into a named node.
pub fn named_node(iri: &str) -> StoreResult<NamedNode> {
    NamedNode::new(iri).map_err(|_| StoreError::InvalidIri { iri: iri.into() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_id_survives_oxigraph_conversion() {
        let id = BlankId::from_raw(0xdead_beef);
        let node = id.to_blank_node();
        assert_eq!(BlankId::from_blank_node(&node), Some(id));
    }

    #[test]
    fn foreign_blank_nodes_are_rejected() {
        let foreign = BlankNode::new_unchecked("abc");
        let err = Resource::from_ox(foreign.into()).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedTerm { .. }));
    }

    #[test]
    fn non_canonical_blank_labels_are_rejected() {
        let short = format!("{BLANK_PREFIX}1");
        let upper = format!("{BLANK_PREFIX}{:032X}", 0xabcu128);
        let signed = format!("{BLANK_PREFIX}+{:031x}", 1u128);
        for label in [short, upper, signed] {
            let node = BlankNode::new_unchecked(label.as_str());
            let err = Resource::from_ox(node.into()).unwrap_err();
            assert!(matches!(err, StoreError::UnsupportedTerm { .. }), "{label}");
        }
    }

    #[test]
    fn fresh_blank_ids_differ() {
        assert_ne!(BlankId::fresh(), BlankId::fresh());
    }

    #[test]
    fn pattern_display_marks_wildcards() {
        let p = StatementPattern::about(Resource::named("urn:x:a").unwrap());
        assert_eq!(p.to_string(), "(<urn:x:a> ? ?)");
    }

    #[test]
    fn invalid_iri_is_an_error() {
        assert!(matches!(
            named_node("not an iri"),
            Err(StoreError::InvalidIri { .. })
        ));
    }
}
