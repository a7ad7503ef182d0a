//! # Schema
//!
//! The structural description of a graph: entity and edge groups, their
//! properties, and the named types those properties use.
//!
//! Schemas arrive as fragments (one JSON document per concern is common)
//! and are merged into one validated schema when a graph is built.
//! Validation collects every problem before failing.

use crate::predicate::IdentifierType;
use crate::types::{Element, TrellisError, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

// =============================================================================
// TYPE DEFINITIONS
// =============================================================================

/// How a store may combine two values of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Sum,
    Max,
    Min,
    First,
    And,
    Or,
    Concat,
}

impl AggregateFunction {
    #[must_use]
    pub fn supports(&self, kind: ValueKind) -> bool {
        match self {
            AggregateFunction::Sum | AggregateFunction::Max | AggregateFunction::Min => {
                kind == ValueKind::Int
            }
            AggregateFunction::And | AggregateFunction::Or => kind == ValueKind::Bool,
            AggregateFunction::Concat => matches!(kind, ValueKind::Text | ValueKind::List),
            AggregateFunction::First => true,
        }
    }

    /// Combine a stored value with an incoming one.
    ///
    /// A null side yields the other; values the function cannot combine
    /// yield the incoming value.
    #[must_use]
    pub fn apply(&self, current: &Value, incoming: &Value) -> Value {
        if current.is_null() {
            return incoming.clone();
        }
        if incoming.is_null() {
            return current.clone();
        }
        match (self, current, incoming) {
            (AggregateFunction::Sum, Value::Int(a), Value::Int(b)) => Value::Int(a.saturating_add(*b)),
            (AggregateFunction::Max, a, b) if a.compare(b) == Some(Ordering::Less) => b.clone(),
            (AggregateFunction::Min, a, b) if a.compare(b) == Some(Ordering::Greater) => b.clone(),
            (AggregateFunction::Max | AggregateFunction::Min, a, b) if a.kind() == b.kind() => a.clone(),
            (AggregateFunction::First, a, _) => a.clone(),
            (AggregateFunction::And, Value::Bool(a), Value::Bool(b)) => Value::Bool(*a && *b),
            (AggregateFunction::Or, Value::Bool(a), Value::Bool(b)) => Value::Bool(*a || *b),
            (AggregateFunction::Concat, Value::Text(a), Value::Text(b)) => Value::Text(format!("{},{}", a, b)),
            (AggregateFunction::Concat, Value::List(a), Value::List(b)) => {
                Value::List(a.iter().chain(b).cloned().collect())
            }
            (_, _, b) => b.clone(),
        }
    }
}

/// How a store may encode a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Serialiser {
    OrderedInt,
    CompactInt,
    Boolean,
    Text,
    Json,
}

impl Serialiser {
    #[must_use]
    pub fn supports(&self, kind: ValueKind) -> bool {
        match self {
            Serialiser::OrderedInt | Serialiser::CompactInt => kind == ValueKind::Int,
            Serialiser::Boolean => kind == ValueKind::Bool,
            Serialiser::Text => kind == ValueKind::Text,
            Serialiser::Json => true,
        }
    }
}

/// A named type used by vertices, endpoints and properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDefinition {
    pub class: ValueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_function: Option<AggregateFunction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialiser: Option<Serialiser>,
}

impl TypeDefinition {
    #[must_use]
    pub fn new(class: ValueKind) -> Self {
        Self {
            class,
            aggregate_function: None,
            serialiser: None,
        }
    }

    #[must_use]
    pub fn with_aggregate_function(mut self, function: AggregateFunction) -> Self {
        self.aggregate_function = Some(function);
        self
    }

    #[must_use]
    pub fn with_serialiser(mut self, serialiser: Serialiser) -> Self {
        self.serialiser = Some(serialiser);
        self
    }
}

// =============================================================================
// GROUP DEFINITIONS
// =============================================================================

/// An entity group: its vertex type and property types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntityDefinition {
    pub vertex: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl SchemaEntityDefinition {
    #[must_use]
    pub fn new(vertex: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.properties.insert(name.into(), type_name.into());
        self
    }
}

/// An edge group: endpoint types, directedness and property types.
///
/// `directed: None` allows both directed and undirected edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEdgeDefinition {
    pub source: String,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directed: Option<bool>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl SchemaEdgeDefinition {
    #[must_use]
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            directed: None,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_directed(mut self, directed: bool) -> Self {
        self.directed = Some(directed);
        self
    }

    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.properties.insert(name.into(), type_name.into());
        self
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

/// The merged structural description of a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub entities: BTreeMap<String, SchemaEntityDefinition>,
    #[serde(default)]
    pub edges: BTreeMap<String, SchemaEdgeDefinition>,
    #[serde(default)]
    pub types: BTreeMap<String, TypeDefinition>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entity(mut self, group: impl Into<String>, def: SchemaEntityDefinition) -> Self {
        self.entities.insert(group.into(), def);
        self
    }

    #[must_use]
    pub fn with_edge(mut self, group: impl Into<String>, def: SchemaEdgeDefinition) -> Self {
        self.edges.insert(group.into(), def);
        self
    }

    #[must_use]
    pub fn with_type(mut self, name: impl Into<String>, def: TypeDefinition) -> Self {
        self.types.insert(name.into(), def);
        self
    }

    /// Parse one schema fragment from JSON. Does not validate.
    pub fn from_json(bytes: &[u8]) -> Result<Self, TrellisError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Read and parse one schema fragment from a file. Does not validate.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TrellisError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            TrellisError::Io(format!("Cannot read schema '{}': {}", path.display(), e))
        })?;
        Self::from_json(&bytes)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, TrellisError> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }

    pub fn entity_groups(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn edge_groups(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.edges.is_empty() && self.types.is_empty()
    }

    /// Merge fragments in order, then validate the result.
    ///
    /// A group may appear in several fragments as long as the definitions
    /// agree; its properties are unioned. Every conflict and validation
    /// problem is reported together.
    pub fn merge<I>(fragments: I) -> Result<Schema, TrellisError>
    where
        I: IntoIterator<Item = Schema>,
    {
        let mut merged = Schema::new();
        let mut reasons = Vec::new();

        for fragment in fragments {
            merged.merge_fragment(fragment, &mut reasons);
        }

        reasons.extend(merged.problems());
        if reasons.is_empty() {
            Ok(merged)
        } else {
            Err(TrellisError::SchemaValidation { reasons })
        }
    }

    /// Validate a single schema.
    pub fn validate(&self) -> Result<(), TrellisError> {
        let reasons = self.problems();
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(TrellisError::SchemaValidation { reasons })
        }
    }

    fn merge_fragment(&mut self, fragment: Schema, reasons: &mut Vec<String>) {
        for (name, def) in fragment.types {
            match self.types.get(&name) {
                Some(existing) if *existing != def => reasons.push(format!(
                    "Type {} is defined twice with different definitions",
                    name
                )),
                Some(_) => {}
                None => {
                    self.types.insert(name, def);
                }
            }
        }

        for (group, def) in fragment.entities {
            if self.edges.contains_key(&group) {
                reasons.push(format!(
                    "Group {} is defined as both an entity and an edge",
                    group
                ));
                continue;
            }
            match self.entities.get_mut(&group) {
                Some(existing) => {
                    if existing.vertex != def.vertex {
                        reasons.push(format!(
                            "Group {} has conflicting vertex types: {} and {}",
                            group, existing.vertex, def.vertex
                        ));
                    }
                    merge_properties(&group, &mut existing.properties, def.properties, reasons);
                }
                None => {
                    self.entities.insert(group, def);
                }
            }
        }

        for (group, def) in fragment.edges {
            if self.entities.contains_key(&group) {
                reasons.push(format!(
                    "Group {} is defined as both an entity and an edge",
                    group
                ));
                continue;
            }
            match self.edges.get_mut(&group) {
                Some(existing) => {
                    if existing.source != def.source || existing.destination != def.destination {
                        reasons.push(format!(
                            "Group {} has conflicting endpoint types: {}->{} and {}->{}",
                            group,
                            existing.source,
                            existing.destination,
                            def.source,
                            def.destination
                        ));
                    }
                    if existing.directed != def.directed {
                        reasons.push(format!("Group {} has conflicting directedness", group));
                    }
                    merge_properties(&group, &mut existing.properties, def.properties, reasons);
                }
                None => {
                    self.edges.insert(group, def);
                }
            }
        }
    }

    fn problems(&self) -> Vec<String> {
        let mut reasons = Vec::new();

        for (name, def) in &self.types {
            if let Some(function) = def.aggregate_function {
                if !function.supports(def.class) {
                    reasons.push(format!(
                        "Type {}: aggregate function {:?} cannot aggregate {}",
                        name, function, def.class
                    ));
                }
            }
            if let Some(serialiser) = def.serialiser {
                if !serialiser.supports(def.class) {
                    reasons.push(format!(
                        "Type {}: serialiser {:?} cannot handle {}",
                        name, serialiser, def.class
                    ));
                }
            }
        }

        for (group, def) in &self.entities {
            if group.is_empty() {
                reasons.push("Entity group name must not be empty".to_string());
            }
            self.check_type_ref(group, "vertex", &def.vertex, &mut reasons);
            self.check_properties(group, &def.properties, &mut reasons);
        }

        for (group, def) in &self.edges {
            if group.is_empty() {
                reasons.push("Edge group name must not be empty".to_string());
            }
            self.check_type_ref(group, "source", &def.source, &mut reasons);
            self.check_type_ref(group, "destination", &def.destination, &mut reasons);
            self.check_properties(group, &def.properties, &mut reasons);
        }

        reasons
    }

    fn check_type_ref(&self, group: &str, field: &str, type_name: &str, reasons: &mut Vec<String>) {
        if !self.types.contains_key(type_name) {
            reasons.push(format!(
                "Group {}: type {} for {} is not defined",
                group, type_name, field
            ));
        }
    }

    fn check_properties(
        &self,
        group: &str,
        properties: &BTreeMap<String, String>,
        reasons: &mut Vec<String>,
    ) {
        for (name, type_name) in properties {
            if IdentifierType::from_key(name).is_some() {
                reasons.push(format!(
                    "Group {}: property name {} is a reserved identifier",
                    group, name
                ));
            }
            self.check_type_ref(group, name, type_name, reasons);
        }
    }

    /// The aggregate function of a group's property, if its type has one.
    #[must_use]
    pub fn aggregate_function(&self, group: &str, property: &str) -> Option<AggregateFunction> {
        let type_name = match self.entities.get(group) {
            Some(def) => def.properties.get(property),
            None => self.edges.get(group).and_then(|def| def.properties.get(property)),
        }?;
        self.types.get(type_name).and_then(|t| t.aggregate_function)
    }

    fn kind_of(&self, type_name: &str) -> Option<ValueKind> {
        self.types.get(type_name).map(|t| t.class)
    }

    /// Check an element against its group definition.
    pub fn validate_element(&self, element: &Element) -> Result<(), TrellisError> {
        let invalid = |msg: String| Err(TrellisError::InvalidElement(msg));

        let properties = match element {
            Element::Entity(e) => {
                let Some(def) = self.entities.get(&e.group) else {
                    return invalid(format!("unknown entity group {}", e.group));
                };
                if !e.vertex.is_null() && self.kind_of(&def.vertex) != Some(e.vertex.kind()) {
                    return invalid(format!(
                        "vertex {} of group {} is not of type {}",
                        e.vertex, e.group, def.vertex
                    ));
                }
                &def.properties
            }
            Element::Edge(e) => {
                let Some(def) = self.edges.get(&e.group) else {
                    return invalid(format!("unknown edge group {}", e.group));
                };
                if def.directed.is_some_and(|d| d != e.directed) {
                    return invalid(format!("edge group {} has the wrong directedness", e.group));
                }
                for (value, type_name) in [(&e.source, &def.source), (&e.destination, &def.destination)] {
                    if !value.is_null() && self.kind_of(type_name) != Some(value.kind()) {
                        return invalid(format!(
                            "endpoint {} of group {} is not of type {}",
                            value, e.group, type_name
                        ));
                    }
                }
                &def.properties
            }
        };

        for (name, value) in element.properties().iter() {
            let Some(type_name) = properties.get(name) else {
                return invalid(format!(
                    "property {} is not defined for group {}",
                    name,
                    element.group()
                ));
            };
            if !value.is_null() && self.kind_of(type_name) != Some(value.kind()) {
                return invalid(format!(
                    "property {} of group {} is not of type {}",
                    name,
                    element.group(),
                    type_name
                ));
            }
        }
        Ok(())
    }
}

fn merge_properties(
    group: &str,
    existing: &mut BTreeMap<String, String>,
    incoming: BTreeMap<String, String>,
    reasons: &mut Vec<String>,
) {
    for (name, type_name) in incoming {
        match existing.get(&name) {
            Some(current) if *current != type_name => reasons.push(format!(
                "Group {} has incompatible definitions for property {}: {} and {}",
                group, name, current, type_name
            )),
            Some(_) => {}
            None => {
                existing.insert(name, type_name);
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
