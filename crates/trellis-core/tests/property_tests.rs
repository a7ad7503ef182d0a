//! # Property-Based Tests
//!
//! Identity, relatedness and filter conjunction invariants checked with
//! proptest.

use proptest::collection::vec;
use proptest::prelude::*;
use trellis_core::predicate::TupleAdaptedPredicate;
use trellis_core::{
    DirectedType, EdgeId, Element, ElementFilter, EntityId, Entity, MatchedVertex, Matches,
    Predicate, Value,
};

// =============================================================================
// STRATEGIES
// =============================================================================

fn directed_type() -> impl Strategy<Value = Option<DirectedType>> {
    prop_oneof![
        Just(None),
        Just(Some(DirectedType::Directed)),
        Just(Some(DirectedType::Undirected)),
        Just(Some(DirectedType::Either)),
    ]
}

fn matched_vertex() -> impl Strategy<Value = Option<MatchedVertex>> {
    prop_oneof![
        Just(None),
        Just(Some(MatchedVertex::Source)),
        Just(Some(MatchedVertex::Destination)),
    ]
}

fn edge_id() -> impl Strategy<Value = EdgeId> {
    (0i64..8, 0i64..8, directed_type(), matched_vertex()).prop_map(|(s, d, t, m)| {
        let id = EdgeId::new(s, d, t);
        match m {
            Some(m) => id.with_matched_vertex(m),
            None => id,
        }
    })
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Edge identity ignores the matched vertex and is symmetric.
    #[test]
    fn edge_equality_ignores_matched_vertex(a in edge_id(), b in edge_id()) {
        prop_assert_eq!(a.is_equal(&b), b.is_equal(&a));

        let mut rematched = a.clone();
        rematched.matched_vertex = match a.matched_vertex {
            Some(MatchedVertex::Source) => Some(MatchedVertex::Destination),
            _ => Some(MatchedVertex::Source),
        };
        prop_assert!(a.is_equal(&rematched));
    }

    /// Relatedness follows which endpoints equal the vertex.
    #[test]
    fn relatedness_follows_endpoints(edge in edge_id(), vertex in 0i64..8) {
        let source = edge.source == Value::from(vertex);
        let destination = edge.destination == Value::from(vertex);
        let expected = match (source, destination) {
            (true, true) => Matches::Both,
            (true, false) => Matches::Source,
            (false, true) => Matches::Destination,
            (false, false) => Matches::None,
        };
        prop_assert_eq!(edge.is_related_to_entity(&EntityId::new(vertex)), expected);
    }

    /// A filter passes exactly when every component passes.
    #[test]
    fn filter_is_a_conjunction(
        age in -50i64..150,
        thresholds in vec(-50i64..150, 1..6),
    ) {
        let element = Element::from(Entity::new("person", "alice").with_property("age", age));

        let mut filter = ElementFilter::new();
        for &t in &thresholds {
            filter
                .add_component(TupleAdaptedPredicate::new(["age"], Predicate::is_more_than(t)))
                .expect("unlocked");
        }

        let expected = thresholds.iter().all(|&t| age > t);
        prop_assert_eq!(filter.test(&element).expect("test"), expected);
    }
}

#[test]
fn matched_vertex_null_equals_source_only() {
    assert!(MatchedVertex::is_equal(None, Some(MatchedVertex::Source)));
    assert!(MatchedVertex::is_equal(Some(MatchedVertex::Source), None));
    assert!(!MatchedVertex::is_equal(None, Some(MatchedVertex::Destination)));
}
