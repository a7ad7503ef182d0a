//! # Predicate Engine
//!
//! Composable, named-property selection and evaluation over one element.
//!
//! A component selects a fixed-arity tuple of keys from an element and
//! applies a function to exactly that tuple:
//! - [`ElementFilter`]: ordered predicates, all of which must pass
//! - [`ElementTransformer`]: ordered functions whose output is projected
//!   back onto the element
//!
//! Keys resolve identifiers first (`GROUP`, `VERTEX`, `SOURCE`,
//! `DESTINATION`, `DIRECTED`, `MATCHED_VERTEX`, `ADJACENT_MATCHED_VERTEX`)
//! and otherwise name a property. The element binding is built per call,
//! so a filter holds no mutable state while it is evaluated.

mod filter;
mod transform;

pub use filter::{ElementFilter, ElementFilterBuilder, SelectedFilterBuilder, TupleAdaptedPredicate};
pub use transform::{
    ElementTransformer, ElementTransformerBuilder, Function, ProjectingTransformerBuilder,
    SelectedTransformerBuilder, TupleAdaptedFunction,
};

use crate::types::{Element, TrellisError, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

const NULL: &Value = &Value::Null;

// =============================================================================
// ELEMENT TUPLE
// =============================================================================

/// Identifier keys that resolve to element fields instead of properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdentifierType {
    Group,
    Vertex,
    Source,
    Destination,
    Directed,
    MatchedVertex,
    AdjacentMatchedVertex,
}

impl IdentifierType {
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "GROUP" => Some(Self::Group),
            "VERTEX" => Some(Self::Vertex),
            "SOURCE" => Some(Self::Source),
            "DESTINATION" => Some(Self::Destination),
            "DIRECTED" => Some(Self::Directed),
            "MATCHED_VERTEX" => Some(Self::MatchedVertex),
            "ADJACENT_MATCHED_VERTEX" => Some(Self::AdjacentMatchedVertex),
            _ => None,
        }
    }
}

/// Read-only view of one element as a keyed tuple.
///
/// Constructed inside each `test`/`apply` call and dropped with it.
#[derive(Debug, Clone, Copy)]
pub struct ElementTuple<'a> {
    element: &'a Element,
}

impl<'a> ElementTuple<'a> {
    #[must_use]
    pub fn new(element: &'a Element) -> Self {
        Self { element }
    }

    /// Resolve one key against the element.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Cow<'a, Value>> {
        let Some(identifier) = IdentifierType::from_key(key) else {
            return self.element.property(key).map(Cow::Borrowed);
        };

        match (identifier, self.element) {
            (IdentifierType::Group, element) => {
                Some(Cow::Owned(Value::Text(element.group().to_string())))
            }
            (IdentifierType::Vertex, Element::Entity(e)) => Some(Cow::Borrowed(&e.vertex)),
            (IdentifierType::Source, Element::Edge(e)) => Some(Cow::Borrowed(&e.source)),
            (IdentifierType::Destination, Element::Edge(e)) => {
                Some(Cow::Borrowed(&e.destination))
            }
            (IdentifierType::Directed, Element::Edge(e)) => Some(Cow::Owned(Value::Bool(e.directed))),
            (IdentifierType::MatchedVertex, Element::Edge(e)) => {
                Some(Cow::Borrowed(e.matched_endpoint()))
            }
            (IdentifierType::AdjacentMatchedVertex, Element::Edge(e)) => {
                Some(Cow::Borrowed(e.adjacent_endpoint()))
            }
            _ => None,
        }
    }

    /// Resolve a whole selection, preserving its order.
    #[must_use]
    pub fn select(&self, selection: &[String]) -> Vec<Option<Cow<'a, Value>>> {
        selection.iter().map(|key| self.get(key)).collect()
    }
}

fn first<'v>(tuple: &[Option<&'v Value>]) -> Option<&'v Value> {
    tuple.first().copied().flatten()
}

fn sub_tuple<'v>(tuple: &[Option<&'v Value>], selection: &[usize]) -> Vec<Option<&'v Value>> {
    selection
        .iter()
        .map(|index| tuple.get(*index).copied().flatten())
        .collect()
}

// =============================================================================
// CUSTOM PREDICATES
// =============================================================================

/// Extension point for predicates outside the built-in set.
pub trait TuplePredicate: Send + Sync + fmt::Debug {
    /// Name used in error messages.
    fn name(&self) -> &str;

    /// Number of values the predicate expects.
    fn arity(&self) -> usize;

    /// Evaluate over exactly `arity` values. Missing keys are `None`.
    fn test(&self, tuple: &[Option<&Value>]) -> bool;
}

/// A shared custom predicate.
///
/// Two custom predicates are equal only if they are the same instance.
#[derive(Debug, Clone)]
pub struct CustomPredicate(pub Arc<dyn TuplePredicate>);

impl PartialEq for CustomPredicate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for CustomPredicate {}

impl Hash for CustomPredicate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

type TupleFn = dyn Fn(&[Option<&Value>]) -> bool + Send + Sync;

/// A closure-backed [`TuplePredicate`].
pub struct FnPredicate {
    name: String,
    arity: usize,
    f: Box<TupleFn>,
}

impl fmt::Debug for FnPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPredicate")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

impl TuplePredicate for FnPredicate {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        self.arity
    }

    fn test(&self, tuple: &[Option<&Value>]) -> bool {
        (self.f)(tuple)
    }
}

// =============================================================================
// PREDICATES
// =============================================================================

/// A predicate component nested inside `And`/`Or`.
///
/// `selection` indexes into the enclosing tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleComponent {
    pub selection: Vec<usize>,
    pub predicate: Predicate,
}

impl TupleComponent {
    #[must_use]
    pub fn new(selection: Vec<usize>, predicate: Predicate) -> Self {
        Self {
            selection,
            predicate,
        }
    }
}

/// Built-in predicates over a value tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "class", rename_all_fields = "camelCase")]
pub enum Predicate {
    /// Passes when the value is present and not null.
    Exists,
    IsEqual {
        value: Value,
    },
    IsMoreThan {
        value: Value,
        #[serde(default)]
        or_equal_to: bool,
    },
    IsLessThan {
        value: Value,
        #[serde(default)]
        or_equal_to: bool,
    },
    IsIn {
        values: BTreeSet<Value>,
    },
    IsTrue,
    IsFalse,
    IsA {
        kind: ValueKind,
    },
    IsShorterThan {
        max_length: usize,
        #[serde(default)]
        or_equal_to: bool,
    },
    Not {
        predicate: Box<Predicate>,
    },
    And {
        components: Vec<TupleComponent>,
    },
    Or {
        components: Vec<TupleComponent>,
    },
    #[serde(skip)]
    Custom(CustomPredicate),
}

impl Predicate {
    #[must_use]
    pub fn is_equal(value: impl Into<Value>) -> Self {
        Predicate::IsEqual {
            value: value.into(),
        }
    }

    #[must_use]
    pub fn is_more_than(value: impl Into<Value>) -> Self {
        Predicate::IsMoreThan {
            value: value.into(),
            or_equal_to: false,
        }
    }

    #[must_use]
    pub fn is_less_than(value: impl Into<Value>) -> Self {
        Predicate::IsLessThan {
            value: value.into(),
            or_equal_to: false,
        }
    }

    #[must_use]
    pub fn is_in<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::IsIn {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn not(predicate: Predicate) -> Self {
        Predicate::Not {
            predicate: Box::new(predicate),
        }
    }

    /// Wrap a closure as a custom predicate of the given arity.
    #[must_use]
    pub fn custom<F>(name: impl Into<String>, arity: usize, f: F) -> Self
    where
        F: Fn(&[Option<&Value>]) -> bool + Send + Sync + 'static,
    {
        Predicate::Custom(CustomPredicate(Arc::new(FnPredicate {
            name: name.into(),
            arity,
            f: Box::new(f),
        })))
    }

    /// Name used in error messages.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Predicate::Exists => "Exists",
            Predicate::IsEqual { .. } => "IsEqual",
            Predicate::IsMoreThan { .. } => "IsMoreThan",
            Predicate::IsLessThan { .. } => "IsLessThan",
            Predicate::IsIn { .. } => "IsIn",
            Predicate::IsTrue => "IsTrue",
            Predicate::IsFalse => "IsFalse",
            Predicate::IsA { .. } => "IsA",
            Predicate::IsShorterThan { .. } => "IsShorterThan",
            Predicate::Not { .. } => "Not",
            Predicate::And { .. } => "And",
            Predicate::Or { .. } => "Or",
            Predicate::Custom(custom) => custom.0.name(),
        }
    }

    /// Number of values this predicate expects.
    ///
    /// Composites expect one more than the highest index they select.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Predicate::Not { predicate } => predicate.arity(),
            Predicate::And { components } | Predicate::Or { components } => components
                .iter()
                .flat_map(|c| c.selection.iter())
                .max()
                .map_or(0, |max| max + 1),
            Predicate::Custom(custom) => custom.0.arity(),
            _ => 1,
        }
    }

    /// Check a selection against this predicate, including nested components.
    pub fn check_arity(&self, selection: &[String]) -> Result<(), TrellisError> {
        let expected = self.arity();
        if selection.len() != expected {
            return Err(TrellisError::ArityMismatch {
                selection: selection.to_vec(),
                function: self.name().to_string(),
                expected,
                actual: selection.len(),
            });
        }

        match self {
            Predicate::Not { predicate } => predicate.check_arity(selection),
            Predicate::And { components } | Predicate::Or { components } => {
                for component in components {
                    let nested: Vec<String> =
                        component.selection.iter().map(ToString::to_string).collect();
                    component.predicate.check_arity(&nested)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Evaluate over a tuple whose arity has already been checked.
    #[must_use]
    pub fn test(&self, tuple: &[Option<&Value>]) -> bool {
        match self {
            Predicate::Exists => first(tuple).is_some_and(|v| !v.is_null()),
            Predicate::IsEqual { value } => first(tuple).unwrap_or(NULL) == value,
            Predicate::IsMoreThan { value, or_equal_to } => first(tuple)
                .and_then(|v| v.compare(value))
                .is_some_and(|ord| ord.is_gt() || (*or_equal_to && ord.is_eq())),
            Predicate::IsLessThan { value, or_equal_to } => first(tuple)
                .and_then(|v| v.compare(value))
                .is_some_and(|ord| ord.is_lt() || (*or_equal_to && ord.is_eq())),
            Predicate::IsIn { values } => values.contains(first(tuple).unwrap_or(NULL)),
            Predicate::IsTrue => first(tuple).and_then(Value::as_bool) == Some(true),
            Predicate::IsFalse => first(tuple).and_then(Value::as_bool) == Some(false),
            Predicate::IsA { kind } => first(tuple).is_some_and(|v| v.kind() == *kind),
            Predicate::IsShorterThan {
                max_length,
                or_equal_to,
            } => first(tuple)
                .and_then(Value::len)
                .is_some_and(|len| len < *max_length || (*or_equal_to && len == *max_length)),
            Predicate::Not { predicate } => !predicate.test(tuple),
            Predicate::And { components } => components
                .iter()
                .all(|c| c.predicate.test(&sub_tuple(tuple, &c.selection))),
            Predicate::Or { components } => components
                .iter()
                .any(|c| c.predicate.test(&sub_tuple(tuple, &c.selection))),
            Predicate::Custom(custom) => custom.0.test(tuple),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
