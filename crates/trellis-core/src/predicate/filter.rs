use super::{ElementTuple, Predicate};
use crate::types::{Element, TrellisError, Value};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// One filter component: a key selection and the predicate applied to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleAdaptedPredicate {
    pub selection: Vec<String>,
    pub predicate: Predicate,
}

impl TupleAdaptedPredicate {
    #[must_use]
    pub fn new<I, S>(selection: I, predicate: Predicate) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selection: selection.into_iter().map(Into::into).collect(),
            predicate,
        }
    }

    fn test(&self, tuple: &ElementTuple<'_>) -> bool {
        let values = tuple.select(&self.selection);
        let refs: Vec<Option<&Value>> = values.iter().map(|v| v.as_deref()).collect();
        self.predicate.test(&refs)
    }
}

/// Ordered conjunction of predicate components over one element.
///
/// Components run in build order; the first failure ends the test.
/// Once [`lock`](Self::lock)ed, the component list rejects mutation and the
/// filter can be shared freely: `test` keeps its element binding local.
///
/// Equality and hashing cover the components only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementFilter {
    components: Vec<TupleAdaptedPredicate>,
    #[serde(skip)]
    locked: bool,
}

impl ElementFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> ElementFilterBuilder {
        ElementFilterBuilder {
            filter: Self::new(),
        }
    }

    #[must_use]
    pub fn components(&self) -> &[TupleAdaptedPredicate] {
        &self.components
    }

    /// Mutable access to the components. Fails once locked.
    pub fn components_mut(&mut self) -> Result<&mut Vec<TupleAdaptedPredicate>, TrellisError> {
        if self.locked {
            return Err(TrellisError::Immutable("element filter"));
        }
        Ok(&mut self.components)
    }

    pub fn add_component(&mut self, component: TupleAdaptedPredicate) -> Result<(), TrellisError> {
        self.components_mut()?.push(component);
        Ok(())
    }

    /// Make the component list read-only.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Check every component's selection against its predicate's arity.
    pub fn validate(&self) -> Result<(), TrellisError> {
        self.components
            .iter()
            .try_for_each(|c| c.predicate.check_arity(&c.selection))
    }

    /// Test an element against every component.
    ///
    /// Arity is checked for all components before any is evaluated, so a
    /// mismatch is reported even when an earlier component would fail.
    pub fn test(&self, element: &Element) -> Result<bool, TrellisError> {
        self.validate()?;
        let tuple = ElementTuple::new(element);
        Ok(self.components.iter().all(|c| c.test(&tuple)))
    }
}

impl PartialEq for ElementFilter {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for ElementFilter {}

impl Hash for ElementFilter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}

/// Builds an [`ElementFilter`] from `select(..).execute(..)` pairs.
#[derive(Debug)]
pub struct ElementFilterBuilder {
    filter: ElementFilter,
}

impl ElementFilterBuilder {
    /// Start a component by naming the keys it reads.
    #[must_use]
    pub fn select<I, S>(self, selection: I) -> SelectedFilterBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SelectedFilterBuilder {
            filter: self.filter,
            selection: selection.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn build(self) -> ElementFilter {
        self.filter
    }
}

/// A builder holding a selection that still needs its predicate.
#[derive(Debug)]
pub struct SelectedFilterBuilder {
    filter: ElementFilter,
    selection: Vec<String>,
}

impl SelectedFilterBuilder {
    /// Attach the predicate for the pending selection.
    #[must_use]
    pub fn execute(mut self, predicate: Predicate) -> ElementFilterBuilder {
        self.filter.components.push(TupleAdaptedPredicate {
            selection: self.selection,
            predicate,
        });
        ElementFilterBuilder {
            filter: self.filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::TupleComponent;
    use crate::types::Entity;
    use std::collections::hash_map::DefaultHasher;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entity(p1: i64, p2: &str) -> Element {
        Element::from(
            Entity::new("person", "v")
                .with_property("p1", p1)
                .with_property("p2", p2),
        )
    }

    fn or_predicate() -> Predicate {
        Predicate::Or {
            components: vec![
                TupleComponent::new(vec![0], Predicate::is_more_than(2)),
                TupleComponent::new(vec![1], Predicate::is_equal("some value")),
            ],
        }
    }

    #[test]
    fn builder_preserves_component_order() {
        let filter = ElementFilter::builder()
            .select(["property 1"])
            .execute(Predicate::IsTrue)
            .select(["property 2a", "property 2b"])
            .execute(Predicate::custom("pair", 2, |_| true))
            .select(["property 3"])
            .execute(Predicate::Exists)
            .build();

        let components = filter.components();
        assert_eq!(components.len(), 3);
        assert_eq!(components[0].selection, vec!["property 1"]);
        assert_eq!(components[0].predicate, Predicate::IsTrue);
        assert_eq!(components[1].selection, vec!["property 2a", "property 2b"]);
        assert_eq!(components[1].predicate.name(), "pair");
        assert_eq!(components[2].selection, vec!["property 3"]);
    }

    #[test]
    fn or_predicate_over_two_properties() {
        let filter = ElementFilter::builder()
            .select(["p1", "p2"])
            .execute(or_predicate())
            .build();

        assert!(filter.test(&entity(3, "some value")).expect("test"));
        assert!(filter.test(&entity(1, "some value")).expect("test"));
        assert!(filter.test(&entity(3, "some invalid value")).expect("test"));
        assert!(!filter.test(&entity(1, "some invalid value")).expect("test"));
    }

    #[test]
    fn not_predicate_inverts() {
        let filter = ElementFilter::builder()
            .select(["p1", "p2"])
            .execute(Predicate::not(or_predicate()))
            .build();

        assert!(!filter.test(&entity(3, "some value")).expect("test"));
        assert!(!filter.test(&entity(1, "some value")).expect("test"));
        assert!(!filter.test(&entity(3, "some invalid value")).expect("test"));
        assert!(filter.test(&entity(1, "some invalid value")).expect("test"));
    }

    #[test]
    fn conjunction_short_circuits_on_first_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let filter = ElementFilter::builder()
            .select(["p1"])
            .execute(Predicate::is_more_than(100))
            .select(["p2"])
            .execute(Predicate::custom("counting", 1, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }))
            .build();

        assert!(!filter.test(&entity(1, "x")).expect("test"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(filter.test(&entity(101, "x")).expect("test"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_filter_passes_everything() {
        assert!(ElementFilter::new().test(&entity(0, "")).expect("test"));
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let filter = ElementFilter::builder()
            .select(["p1", "p2"])
            .execute(Predicate::is_more_than(1))
            .build();
        assert!(matches!(
            filter.test(&entity(3, "x")),
            Err(TrellisError::ArityMismatch { expected: 1, actual: 2, .. })
        ));
    }

    #[test]
    fn arity_is_checked_before_short_circuit() {
        let filter = ElementFilter::builder()
            .select(["p1"])
            .execute(Predicate::is_more_than(100))
            .select(["p1"])
            .execute(Predicate::custom("pair", 2, |_| true))
            .build();
        assert!(filter.test(&entity(1, "x")).is_err());
    }

    #[test]
    fn locked_filter_rejects_mutation() {
        let mut filter = ElementFilter::new();
        filter.lock();
        assert!(filter.is_locked());
        assert!(matches!(
            filter.components_mut(),
            Err(TrellisError::Immutable(_))
        ));
        assert!(
            filter
                .add_component(TupleAdaptedPredicate::new(["p1"], Predicate::Exists))
                .is_err()
        );
    }

    #[test]
    fn unlocked_filter_accepts_mutation() {
        let mut filter = ElementFilter::new();
        filter
            .add_component(TupleAdaptedPredicate::new(["p1"], Predicate::Exists))
            .expect("add");
        filter.components_mut().expect("mutable").clear();
        assert!(filter.is_empty());
    }

    #[test]
    fn equality_ignores_lock_state() {
        let build = || {
            ElementFilter::builder()
                .select(["p1"])
                .execute(Predicate::is_equal(1))
                .build()
        };
        let a = build();
        let mut b = build();
        b.lock();
        assert_eq!(a, b);

        let hash = |f: &ElementFilter| {
            let mut h = DefaultHasher::new();
            f.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn locked_filter_is_shareable_across_threads() {
        let mut filter = ElementFilter::builder()
            .select(["p1"])
            .execute(Predicate::is_more_than(10))
            .build();
        filter.lock();
        let filter = Arc::new(filter);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let filter = Arc::clone(&filter);
                std::thread::spawn(move || {
                    (0..100)
                        .filter(|n| {
                            filter
                                .test(&entity(i * 100 + n, "x"))
                                .unwrap_or(false)
                        })
                        .count()
                })
            })
            .collect();

        let passed: usize = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .sum();
        assert_eq!(passed, 400 - 11);
    }

    #[test]
    fn filter_json_is_component_list() {
        let filter = ElementFilter::builder()
            .select(["p1"])
            .execute(Predicate::is_more_than(2))
            .build();
        let json = serde_json::to_string(&filter).expect("serialize");
        assert_eq!(
            json,
            r#"[{"selection":["p1"],"predicate":{"class":"IsMoreThan","value":2,"orEqualTo":false}}]"#
        );
        let back: ElementFilter = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, filter);
    }
}
