//! # Core Type Definitions
//!
//! This module contains the data types shared by every layer of the engine:
//! - Property values (`Value`, `ValueKind`, `Properties`)
//! - Graph elements (`Element`, `Entity`, `Edge`)
//! - The executing principal (`User`)
//! - Error types (`TrellisError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer values only (no floating-point)
//! - Implement `Ord` where they key a `BTreeMap`/`BTreeSet`
//! - Compare structurally; no identity-based equality

mod error;

pub use error::TrellisError;

use crate::identity::{EdgeId, ElementId, EntityId, MatchedVertex};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

// =============================================================================
// VALUES
// =============================================================================

/// A typed property or vertex value.
///
/// Serialised untagged, so JSON scalars map directly onto the variants.
/// `Null` compares equal to `Null`, which gives identifiers null-safe equality.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    /// The kind of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Text(_) => ValueKind::Text,
            Value::List(_) => ValueKind::List,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Length of a text (in chars) or list value.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Text(s) => Some(s.chars().count()),
            Value::List(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Order two values of the same kind.
    ///
    /// Returns `None` when the kinds differ; range predicates treat that as
    /// a failed comparison rather than falling back to variant order.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if self.kind() != other.kind() || self.is_null() {
            return None;
        }
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Text(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

/// The kind of a [`Value`], used by schema type definitions and `IsA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Text,
    List,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Text => "text",
            ValueKind::List => "list",
        };
        f.write_str(name)
    }
}

// =============================================================================
// PROPERTIES
// =============================================================================

/// Named property values of an element. Keys are unique.
///
/// Properties keep the order they were first inserted in; iteration,
/// display and serialization follow it. Equality and hashing ignore it.
/// Elements carry a handful of properties, so lookups scan.
#[derive(Debug, Clone, Default)]
pub struct Properties(Vec<(String, Value)>);

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a property, returning the previous value if present. A
    /// replaced property keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let value = value.into();
        if let Some((_, current)) = self.0.iter_mut().find(|(key, _)| *key == name) {
            return Some(std::mem::replace(current, value));
        }
        self.0.push((name, value));
        None
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(key, _)| key == name).map(|(_, value)| value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let position = self.0.iter().position(|(key, _)| key == name)?;
        Some(self.0.remove(position).1)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Properties in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().map(|(key, value)| (key, value))
    }

    fn sorted(&self) -> Vec<&(String, Value)> {
        let mut entries: Vec<_> = self.0.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl PartialEq for Properties {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(key, value)| other.get(key) == Some(value))
    }
}

impl Eq for Properties {}

impl Hash for Properties {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sorted().hash(state);
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut properties = Self::new();
        for (key, value) in iter {
            properties.insert(key, value);
        }
        properties
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<'de> Deserialize<'de> for Properties {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PropertiesVisitor;

        impl<'de> Visitor<'de> for PropertiesVisitor {
            type Value = Properties;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of property values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Properties, A::Error> {
                let mut properties = Properties::new();
                while let Some((name, value)) = map.next_entry::<String, Value>()? {
                    properties.insert(name, value);
                }
                Ok(properties)
            }
        }

        deserializer.deserialize_map(PropertiesVisitor)
    }
}

// =============================================================================
// ELEMENTS
// =============================================================================

/// A vertex-keyed graph item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub group: String,
    pub vertex: Value,
    #[serde(default)]
    pub properties: Properties,
}

impl Entity {
    #[must_use]
    pub fn new(group: impl Into<String>, vertex: impl Into<Value>) -> Self {
        Self {
            group: group.into(),
            vertex: vertex.into(),
            properties: Properties::new(),
        }
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name, value);
        self
    }
}

/// A source/destination graph item.
///
/// Equality and hashing ignore `matched_vertex`, matching [`EdgeId`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub group: String,
    pub source: Value,
    pub destination: Value,
    pub directed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_vertex: Option<MatchedVertex>,
    #[serde(default)]
    pub properties: Properties,
}

impl Edge {
    #[must_use]
    pub fn new(
        group: impl Into<String>,
        source: impl Into<Value>,
        destination: impl Into<Value>,
        directed: bool,
    ) -> Self {
        Self {
            group: group.into(),
            source: source.into(),
            destination: destination.into(),
            directed,
            matched_vertex: None,
            properties: Properties::new(),
        }
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name, value);
        self
    }

    /// The endpoint named by `matched_vertex` (source when unset).
    #[must_use]
    pub fn matched_endpoint(&self) -> &Value {
        match self.matched_vertex {
            Some(MatchedVertex::Destination) => &self.destination,
            _ => &self.source,
        }
    }

    /// The endpoint opposite to the matched one.
    #[must_use]
    pub fn adjacent_endpoint(&self) -> &Value {
        match self.matched_vertex {
            Some(MatchedVertex::Destination) => &self.source,
            _ => &self.destination,
        }
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.group == other.group
            && self.source == other.source
            && self.destination == other.destination
            && self.directed == other.directed
            && self.properties == other.properties
    }
}

impl Eq for Edge {}

impl Hash for Edge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.group.hash(state);
        self.source.hash(state);
        self.destination.hash(state);
        self.directed.hash(state);
        self.properties.hash(state);
    }
}

/// A graph element: either an [`Entity`] or an [`Edge`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum Element {
    Entity(Entity),
    Edge(Edge),
}

impl Element {
    #[must_use]
    pub fn group(&self) -> &str {
        match self {
            Element::Entity(e) => &e.group,
            Element::Edge(e) => &e.group,
        }
    }

    #[must_use]
    pub fn properties(&self) -> &Properties {
        match self {
            Element::Entity(e) => &e.properties,
            Element::Edge(e) => &e.properties,
        }
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        match self {
            Element::Entity(e) => &mut e.properties,
            Element::Edge(e) => &mut e.properties,
        }
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties().get(name)
    }

    #[must_use]
    pub fn is_entity(&self) -> bool {
        matches!(self, Element::Entity(_))
    }

    #[must_use]
    pub fn is_edge(&self) -> bool {
        matches!(self, Element::Edge(_))
    }

    /// Derive the identifier of this element.
    #[must_use]
    pub fn id(&self) -> ElementId {
        match self {
            Element::Entity(e) => ElementId::Entity(EntityId::new(e.vertex.clone())),
            Element::Edge(e) => ElementId::Edge(EdgeId::from_edge(e)),
        }
    }
}

impl From<Entity> for Element {
    fn from(entity: Entity) -> Self {
        Element::Entity(entity)
    }
}

impl From<Edge> for Element {
    fn from(edge: Edge) -> Self {
        Element::Edge(edge)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Entity(e) => write!(f, "Entity[group={},vertex={}", e.group, e.vertex)?,
            Element::Edge(e) => write!(
                f,
                "Edge[group={},source={},destination={},directed={}",
                e.group, e.source, e.destination, e.directed
            )?,
        }
        for (name, value) in self.properties().iter() {
            write!(f, ",{}={}", name, value)?;
        }
        write!(f, "]")
    }
}

// =============================================================================
// USER
// =============================================================================

/// User id assigned when none is supplied.
pub const UNKNOWN_USER_ID: &str = "UNKNOWN";

/// User id for work the graph does on its own behalf, such as seeding.
pub const SYSTEM_USER_ID: &str = "_system";

/// The principal an operation chain executes as.
///
/// `op_auths` gate which operations a user may run or have injected;
/// `data_auths` are passed through to stores that enforce visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    #[serde(default)]
    pub op_auths: BTreeSet<String>,
    #[serde(default)]
    pub data_auths: BTreeSet<String>,
}

impl Default for User {
    fn default() -> Self {
        Self::new(UNKNOWN_USER_ID)
    }
}

impl User {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            op_auths: BTreeSet::new(),
            data_auths: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_op_auths<I, S>(mut self, auths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.op_auths.extend(auths.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_data_auths<I, S>(mut self, auths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.data_auths.extend(auths.into_iter().map(Into::into));
        self
    }

    /// True if the user holds at least one of `required`.
    ///
    /// An empty requirement is always satisfied.
    #[must_use]
    pub fn has_any_op_auth(&self, required: &BTreeSet<String>) -> bool {
        required.is_empty() || !self.op_auths.is_disjoint(required)
    }
}

// =============================================================================
// TESTS
// =============================================================================
