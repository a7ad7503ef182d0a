//! # View
//!
//! Per-execution selection of element groups, with the filters and
//! transforms that apply to each group.
//!
//! A graph derives a default view from its schema (every group, no filters).
//! An operation may carry its own view, which always wins.

use crate::predicate::{ElementFilter, ElementTransformer};
use crate::schema::Schema;
use crate::types::{Element, TrellisError, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a view applies to one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewElementDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_aggregation_filter: Option<ElementFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_aggregation_filter: Option<ElementFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformer: Option<ElementTransformer>,
    /// Properties produced by the transformer that the schema does not hold.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transient_properties: BTreeMap<String, ValueKind>,
}

impl ViewElementDefinition {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_pre_aggregation_filter(mut self, filter: ElementFilter) -> Self {
        self.pre_aggregation_filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_post_aggregation_filter(mut self, filter: ElementFilter) -> Self {
        self.post_aggregation_filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_transformer(mut self, transformer: ElementTransformer) -> Self {
        self.transformer = Some(transformer);
        self
    }

    #[must_use]
    pub fn with_transient_property(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.transient_properties.insert(name.into(), kind);
        self
    }

    fn lock(&mut self) {
        if let Some(filter) = self.pre_aggregation_filter.as_mut() {
            filter.lock();
        }
        if let Some(filter) = self.post_aggregation_filter.as_mut() {
            filter.lock();
        }
        if let Some(transformer) = self.transformer.as_mut() {
            transformer.lock();
        }
    }

    /// Filter, transform, then filter again.
    fn apply(&self, mut element: Element) -> Result<Option<Element>, TrellisError> {
        if let Some(filter) = &self.pre_aggregation_filter {
            if !filter.test(&element)? {
                return Ok(None);
            }
        }
        if let Some(transformer) = &self.transformer {
            transformer.apply(&mut element)?;
        }
        if let Some(filter) = &self.post_aggregation_filter {
            if !filter.test(&element)? {
                return Ok(None);
            }
        }
        Ok(Some(element))
    }
}

/// Entity and edge groups to return, keyed by group name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    #[serde(default)]
    pub entities: BTreeMap<String, ViewElementDefinition>,
    #[serde(default)]
    pub edges: BTreeMap<String, ViewElementDefinition>,
}

impl View {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A view over every group in the schema with empty definitions.
    #[must_use]
    pub fn from_schema(schema: &Schema) -> Self {
        Self {
            entities: schema
                .entity_groups()
                .map(|g| (g.to_string(), ViewElementDefinition::new()))
                .collect(),
            edges: schema
                .edge_groups()
                .map(|g| (g.to_string(), ViewElementDefinition::new()))
                .collect(),
        }
    }

    #[must_use]
    pub fn with_entity(mut self, group: impl Into<String>, def: ViewElementDefinition) -> Self {
        self.entities.insert(group.into(), def);
        self
    }

    #[must_use]
    pub fn with_edge(mut self, group: impl Into<String>, def: ViewElementDefinition) -> Self {
        self.edges.insert(group.into(), def);
        self
    }

    pub fn entity_groups(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn edge_groups(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    #[must_use]
    pub fn entity(&self, group: &str) -> Option<&ViewElementDefinition> {
        self.entities.get(group)
    }

    #[must_use]
    pub fn edge(&self, group: &str) -> Option<&ViewElementDefinition> {
        self.edges.get(group)
    }

    /// The definition that applies to an element, if its group is in view.
    #[must_use]
    pub fn definition_for(&self, element: &Element) -> Option<&ViewElementDefinition> {
        match element {
            Element::Entity(e) => self.entity(&e.group),
            Element::Edge(e) => self.edge(&e.group),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.edges.is_empty()
    }

    /// Lock every filter so the view can be shared across executions.
    pub fn lock(&mut self) {
        self.entities
            .values_mut()
            .chain(self.edges.values_mut())
            .for_each(ViewElementDefinition::lock);
    }

    /// Run an element through the view.
    ///
    /// Returns `None` if its group is not in view or a filter rejects it.
    pub fn apply(&self, element: Element) -> Result<Option<Element>, TrellisError> {
        match self.definition_for(&element) {
            Some(def) => def.apply(element),
            None => Ok(None),
        }
    }
}
