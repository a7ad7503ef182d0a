//! # Element Identity
//!
//! Identifiers for graph elements, independent of their property payload,
//! and the relatedness rules between them.
//!
//! - `EntityId`: a single vertex value
//! - `EdgeId`: source, destination, directed type and matched vertex
//! - `Matches`: how two identifiers relate (none, source, destination, both)
//!
//! Equality is structural over the identifying tuple. For edges the
//! matched vertex is never part of that tuple.

use crate::types::{Edge, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

// =============================================================================
// DIRECTED TYPE & MATCHED VERTEX
// =============================================================================

/// Directedness of an edge identifier.
///
/// An unset directed type (`None` wherever it is stored) behaves as `Either`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectedType {
    Directed,
    Undirected,
    Either,
}

impl DirectedType {
    /// True unless the type is explicitly `Undirected`.
    #[must_use]
    pub fn is_directed(directed_type: Option<DirectedType>) -> bool {
        directed_type != Some(DirectedType::Undirected)
    }

    /// True unless the type is explicitly `Directed`.
    #[must_use]
    pub fn is_undirected(directed_type: Option<DirectedType>) -> bool {
        directed_type != Some(DirectedType::Directed)
    }

    /// Whether an edge with the given directedness passes this type.
    #[must_use]
    pub fn accepts(directed_type: Option<DirectedType>, edge_directed: bool) -> bool {
        if edge_directed {
            Self::is_directed(directed_type)
        } else {
            Self::is_undirected(directed_type)
        }
    }
}

/// Which endpoint of a retrieved edge matched the query seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchedVertex {
    Source,
    Destination,
}

impl MatchedVertex {
    /// Compare two optional matched vertices.
    ///
    /// An unset matched vertex means `Source`, so `None` equals
    /// `Some(Source)` in either position. Every other pairing with `None`
    /// is unequal.
    #[must_use]
    pub fn is_equal(a: Option<MatchedVertex>, b: Option<MatchedVertex>) -> bool {
        a == b
            || (a.is_none() && b == Some(MatchedVertex::Source))
            || (b.is_none() && a == Some(MatchedVertex::Source))
    }
}

/// How two identifiers relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Matches {
    None,
    Source,
    Destination,
    Both,
}

impl Matches {
    #[must_use]
    pub fn is_match(&self) -> bool {
        *self != Matches::None
    }
}

// =============================================================================
// ENTITY ID
// =============================================================================

/// Identifier of a vertex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId {
    pub vertex: Value,
}

impl EntityId {
    #[must_use]
    pub fn new(vertex: impl Into<Value>) -> Self {
        Self {
            vertex: vertex.into(),
        }
    }

    /// Relate this vertex to another identifier.
    ///
    /// Against an entity: `Both` when the vertices are equal. Against an
    /// edge: the edge's relation to this vertex.
    #[must_use]
    pub fn is_related(&self, other: &ElementId) -> Matches {
        match other {
            ElementId::Entity(entity) if entity == self => Matches::Both,
            ElementId::Entity(_) => Matches::None,
            ElementId::Edge(edge) => edge.is_related_to_entity(self),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId[vertex={}]", self.vertex)
    }
}

// =============================================================================
// EDGE ID
// =============================================================================

/// Identifier of an edge.
///
/// Equality and hashing cover source, destination and directed type only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeId {
    pub source: Value,
    pub destination: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directed_type: Option<DirectedType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_vertex: Option<MatchedVertex>,
}

impl EdgeId {
    #[must_use]
    pub fn new(
        source: impl Into<Value>,
        destination: impl Into<Value>,
        directed_type: Option<DirectedType>,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            directed_type,
            matched_vertex: None,
        }
    }

    #[must_use]
    pub fn with_matched_vertex(mut self, matched_vertex: MatchedVertex) -> Self {
        self.matched_vertex = Some(matched_vertex);
        self
    }

    /// The identifier of a concrete edge.
    #[must_use]
    pub fn from_edge(edge: &Edge) -> Self {
        let directed_type = if edge.directed {
            DirectedType::Directed
        } else {
            DirectedType::Undirected
        };
        Self {
            source: edge.source.clone(),
            destination: edge.destination.clone(),
            directed_type: Some(directed_type),
            matched_vertex: edge.matched_vertex,
        }
    }

    /// True if directed is `Directed`, `Either` or unset.
    #[must_use]
    pub fn is_directed(&self) -> bool {
        DirectedType::is_directed(self.directed_type)
    }

    /// True if directed is `Undirected`, `Either` or unset.
    #[must_use]
    pub fn is_undirected(&self) -> bool {
        DirectedType::is_undirected(self.directed_type)
    }

    /// Identity comparison. Does not include the matched vertex.
    #[must_use]
    pub fn is_equal(&self, other: &EdgeId) -> bool {
        self == other
    }

    /// Relate this edge to another identifier.
    ///
    /// Edges relate to edges only by full identity; entities relate through
    /// either endpoint.
    #[must_use]
    pub fn is_related(&self, other: &ElementId) -> Matches {
        match other {
            ElementId::Edge(edge) if self.is_equal(edge) => Matches::Both,
            ElementId::Edge(_) => Matches::None,
            ElementId::Entity(entity) => self.is_related_to_entity(entity),
        }
    }

    /// Relate this edge to a vertex. A self-loop on the vertex is `Both`.
    #[must_use]
    pub fn is_related_to_entity(&self, entity: &EntityId) -> Matches {
        let source_matches = self.source == entity.vertex;
        let destination_matches = self.destination == entity.vertex;
        match (source_matches, destination_matches) {
            (true, true) => Matches::Both,
            (true, false) => Matches::Source,
            (false, true) => Matches::Destination,
            (false, false) => Matches::None,
        }
    }
}

impl PartialEq for EdgeId {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.destination == other.destination
            && self.directed_type == other.directed_type
    }
}

impl Eq for EdgeId {}

impl Hash for EdgeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.destination.hash(state);
        self.directed_type.hash(state);
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EdgeId[source={},destination={},directedType={:?}]",
            self.source, self.destination, self.directed_type
        )
    }
}

// =============================================================================
// ELEMENT ID
// =============================================================================

/// Identifier of either kind of element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementId {
    Entity(EntityId),
    Edge(EdgeId),
}

impl ElementId {
    #[must_use]
    pub fn is_related(&self, other: &ElementId) -> Matches {
        match self {
            ElementId::Entity(entity) => entity.is_related(other),
            ElementId::Edge(edge) => edge.is_related(other),
        }
    }
}

impl From<EntityId> for ElementId {
    fn from(id: EntityId) -> Self {
        ElementId::Entity(id)
    }
}

impl From<EdgeId> for ElementId {
    fn from(id: EdgeId) -> Self {
        ElementId::Edge(id)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Entity(id) => id.fmt(f),
            ElementId::Edge(id) => id.fmt(f),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(source: &str, destination: &str, directed_type: Option<DirectedType>) -> EdgeId {
        EdgeId::new(source, destination, directed_type)
    }

    #[test]
    fn directed_flags_follow_directed_type() {
        let directed = edge("A", "B", Some(DirectedType::Directed));
        assert!(directed.is_directed());
        assert!(!directed.is_undirected());

        let undirected = edge("A", "B", Some(DirectedType::Undirected));
        assert!(!undirected.is_directed());
        assert!(undirected.is_undirected());

        for either in [edge("A", "B", Some(DirectedType::Either)), edge("A", "B", None)] {
            assert!(either.is_directed());
            assert!(either.is_undirected());
        }
    }

    #[test]
    fn equality_ignores_matched_vertex() {
        let a = edge("A", "B", Some(DirectedType::Directed))
            .with_matched_vertex(MatchedVertex::Source);
        let b = edge("A", "B", Some(DirectedType::Directed))
            .with_matched_vertex(MatchedVertex::Destination);
        assert!(a.is_equal(&b));
        assert!(b.is_equal(&a));
    }

    #[test]
    fn equality_includes_directed_type() {
        let a = edge("A", "B", Some(DirectedType::Directed));
        let b = edge("A", "B", None);
        assert!(!a.is_equal(&b));
    }

    #[test]
    fn null_endpoints_compare_equal() {
        let a = EdgeId::new(Value::Null, "B", None);
        let b = EdgeId::new(Value::Null, "B", None);
        assert!(a.is_equal(&b));
    }

    #[test]
    fn edge_relates_to_equal_edge_as_both() {
        let a = edge("A", "B", Some(DirectedType::Directed));
        let other = ElementId::Edge(edge("A", "B", Some(DirectedType::Directed)));
        assert_eq!(a.is_related(&other), Matches::Both);

        let partial = ElementId::Edge(edge("A", "C", Some(DirectedType::Directed)));
        assert_eq!(a.is_related(&partial), Matches::None);
    }

    #[test]
    fn edge_relates_to_entity_by_endpoint() {
        let e = edge("A", "B", None);
        assert_eq!(e.is_related(&EntityId::new("A").into()), Matches::Source);
        assert_eq!(e.is_related(&EntityId::new("B").into()), Matches::Destination);
        assert_eq!(e.is_related(&EntityId::new("C").into()), Matches::None);
    }

    #[test]
    fn self_loop_relates_as_both() {
        let e = edge("A", "A", None);
        assert_eq!(e.is_related(&EntityId::new("A").into()), Matches::Both);
    }

    #[test]
    fn entity_relatedness_is_symmetric_with_edges() {
        let e = ElementId::Edge(edge("A", "B", None));
        let v = ElementId::Entity(EntityId::new("B"));
        assert_eq!(v.is_related(&e), e.is_related(&v));
        assert_eq!(v.is_related(&v), Matches::Both);
        assert_eq!(
            v.is_related(&ElementId::Entity(EntityId::new("Z"))),
            Matches::None
        );
    }

    #[test]
    fn matched_vertex_unset_defaults_to_source() {
        use MatchedVertex::{Destination, Source};
        assert!(MatchedVertex::is_equal(None, Some(Source)));
        assert!(MatchedVertex::is_equal(Some(Source), None));
        assert!(MatchedVertex::is_equal(None, None));
        assert!(!MatchedVertex::is_equal(None, Some(Destination)));
        assert!(!MatchedVertex::is_equal(Some(Destination), None));
        assert!(!MatchedVertex::is_equal(Some(Source), Some(Destination)));
    }

    #[test]
    fn element_id_json_is_untagged() {
        let ids: Vec<ElementId> = serde_json::from_str(
            r#"[{"vertex":"A"},{"source":"A","destination":"B","directedType":"DIRECTED"}]"#,
        )
        .expect("parse");
        assert_eq!(ids[0], ElementId::Entity(EntityId::new("A")));
        assert_eq!(
            ids[1],
            ElementId::Edge(edge("A", "B", Some(DirectedType::Directed)))
        );
    }

    #[test]
    fn accepts_respects_edge_directedness() {
        assert!(DirectedType::accepts(None, true));
        assert!(DirectedType::accepts(None, false));
        assert!(DirectedType::accepts(Some(DirectedType::Directed), true));
        assert!(!DirectedType::accepts(Some(DirectedType::Directed), false));
        assert!(!DirectedType::accepts(Some(DirectedType::Undirected), true));
    }
}
