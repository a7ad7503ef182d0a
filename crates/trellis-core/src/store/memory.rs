//! # Memory Store
//!
//! A reference back end that keeps elements in a `BTreeMap` behind a
//! `RwLock`. Elements sharing a group and identifier are aggregated with
//! the schema's aggregate functions. It runs every built-in operation
//! except `SplitStore`.
//!
//! Set exports belong to a single run. Each chain or job gets a fresh
//! [`MemoryContext`], so nothing exported by one run is visible to the
//! next.

use super::{HandlerRegistry, OperationHandler, Store, StoreTrait};
use crate::identity::{DirectedType, EdgeId, ElementId, EntityId, MatchedVertex, Matches};
use crate::operation::{
    GroupCounts, IncludeIncomingOutgoing, JobDetail, JobStatus, Limit, Operation, OperationChain,
    OperationKind, Output, SeedMatching,
};
use crate::schema::Schema;
use crate::types::{Edge, Element, TrellisError, User, Value};
use crate::view::View;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::hash::Hash;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// =============================================================================
// STATE
// =============================================================================

/// Storage key: group plus identifier. Undirected edges are keyed with
/// their endpoints in order so both orientations meet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum ElementKey {
    Entity {
        group: String,
        vertex: Value,
    },
    Edge {
        group: String,
        source: Value,
        destination: Value,
        directed: bool,
    },
}

impl ElementKey {
    fn of(element: &Element) -> Self {
        match element {
            Element::Entity(e) => ElementKey::Entity {
                group: e.group.clone(),
                vertex: e.vertex.clone(),
            },
            Element::Edge(e) => {
                let (source, destination) = if !e.directed && e.destination < e.source {
                    (&e.destination, &e.source)
                } else {
                    (&e.source, &e.destination)
                };
                ElementKey::Edge {
                    group: e.group.clone(),
                    source: source.clone(),
                    destination: destination.clone(),
                    directed: e.directed,
                }
            }
        }
    }
}

/// The graph binding, the stored elements and the job records.
#[derive(Debug, Default)]
pub struct MemoryStoreState {
    graph_id: String,
    schema: Option<Schema>,
    elements: RwLock<BTreeMap<ElementKey, Element>>,
    jobs: RwLock<Vec<JobDetail>>,
}

impl MemoryStoreState {
    #[must_use]
    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    #[must_use]
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<ElementKey, Element>>, TrellisError> {
        self.elements.read().map_err(|_| TrellisError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<ElementKey, Element>>, TrellisError> {
        self.elements.write().map_err(|_| TrellisError::LockPoisoned)
    }

    /// Snapshot of every stored element in key order.
    pub fn elements(&self) -> Result<Vec<Element>, TrellisError> {
        Ok(self.read()?.values().cloned().collect())
    }

    pub fn len(&self) -> Result<usize, TrellisError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, TrellisError> {
        Ok(self.read()?.is_empty())
    }

    /// Insert an element, aggregating into any stored element with the
    /// same key.
    pub fn add(&self, mut element: Element) -> Result<(), TrellisError> {
        if let Element::Edge(edge) = &mut element {
            edge.matched_vertex = None;
        }
        let key = ElementKey::of(&element);
        let mut elements = self.write()?;
        match elements.get_mut(&key) {
            Some(stored) => {
                let group = element.group().to_string();
                let properties = stored.properties_mut();
                for (name, incoming) in element.properties().iter() {
                    let merged = match (
                        properties.get(name),
                        self.schema
                            .as_ref()
                            .and_then(|s| s.aggregate_function(&group, name)),
                    ) {
                        (Some(current), Some(function)) => function.apply(current, incoming),
                        _ => incoming.clone(),
                    };
                    properties.insert(name.clone(), merged);
                }
            }
            None => {
                elements.insert(key, element);
            }
        }
        Ok(())
    }

    fn record_job(&self, job: JobDetail) -> Result<(), TrellisError> {
        self.jobs
            .write()
            .map_err(|_| TrellisError::LockPoisoned)?
            .push(job);
        Ok(())
    }

    pub fn jobs(&self) -> Result<Vec<JobDetail>, TrellisError> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| TrellisError::LockPoisoned)?
            .clone())
    }
}

// =============================================================================
// RUN CONTEXT
// =============================================================================

/// What a handler sees while one chain or job runs.
#[derive(Debug)]
pub struct MemoryContext {
    state: Arc<MemoryStoreState>,
    exports: RwLock<BTreeMap<String, Output>>,
}

impl MemoryContext {
    fn new(state: Arc<MemoryStoreState>) -> Self {
        Self {
            state,
            exports: RwLock::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn state(&self) -> &MemoryStoreState {
        &self.state
    }

    /// Append `items` to the set export under `key`. Items already in the
    /// set are skipped; first insertion order is kept.
    pub fn export(&self, key: &str, items: &Output) -> Result<(), TrellisError> {
        let mut exports = self.exports.write().map_err(|_| TrellisError::LockPoisoned)?;
        let set = exports.entry(key.to_string()).or_default();
        if set.is_empty() {
            *set = match items {
                Output::Elements(_) => Output::Elements(Vec::new()),
                Output::Ids(_) => Output::Ids(Vec::new()),
                _ => Output::Empty,
            };
        }
        match (set, items) {
            (_, Output::Empty) => {}
            (Output::Elements(stored), Output::Elements(incoming)) => extend_distinct(stored, incoming),
            (Output::Ids(stored), Output::Ids(incoming)) => extend_distinct(stored, incoming),
            (stored, Output::Elements(_) | Output::Ids(_)) => {
                return Err(TrellisError::Execution(format!(
                    "Cannot export {} into set {} holding {}",
                    items.type_name(),
                    key,
                    stored.type_name()
                )));
            }
            (_, other) => return Err(unsupported_input(OperationKind::ExportToSet, other)),
        }
        tracing::debug!("Exported {} to set {}", items.type_name(), key);
        Ok(())
    }

    /// Items `start..end` of the set export under `key`. A missing key
    /// reads as empty; a page past the end is empty.
    pub fn exported(&self, key: &str, start: usize, end: Option<usize>) -> Result<Output, TrellisError> {
        if let Some(end) = end.filter(|end| *end < start) {
            return Err(TrellisError::Execution(format!(
                "Export page end {} is before start {}",
                end, start
            )));
        }
        let exports = self.exports.read().map_err(|_| TrellisError::LockPoisoned)?;
        Ok(match exports.get(key) {
            Some(Output::Elements(items)) => Output::Elements(page(items, start, end)),
            Some(Output::Ids(ids)) => Output::Ids(page(ids, start, end)),
            _ => Output::Empty,
        })
    }
}

fn extend_distinct<T: Clone + Eq + Hash>(stored: &mut Vec<T>, incoming: &[T]) {
    let mut seen: HashSet<T> = stored.iter().cloned().collect();
    for item in incoming {
        if seen.insert(item.clone()) {
            stored.push(item.clone());
        }
    }
}

fn page<T: Clone>(items: &[T], start: usize, end: Option<usize>) -> Vec<T> {
    let end = end.map_or(items.len(), |end| end.min(items.len()));
    items.get(start..end).map(<[T]>::to_vec).unwrap_or_default()
}

// =============================================================================
// STORE
// =============================================================================

/// In-memory [`Store`].
#[derive(Debug)]
pub struct MemoryStore {
    state: Arc<MemoryStoreState>,
    handlers: HandlerRegistry<MemoryContext>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(MemoryStoreState::default()),
            handlers: default_handlers(),
        }
    }

    /// A store that supplies its own schema to the graph.
    #[must_use]
    pub fn with_schema(schema: Schema) -> Self {
        let state = MemoryStoreState {
            schema: Some(schema),
            ..MemoryStoreState::default()
        };
        Self {
            state: Arc::new(state),
            handlers: default_handlers(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &MemoryStoreState {
        &self.state
    }

    /// Add or replace the handler for a kind.
    pub fn register_handler<H>(&mut self, kind: OperationKind, handler: H)
    where
        H: OperationHandler<MemoryContext> + 'static,
    {
        self.handlers.register(kind, handler);
    }
}

impl Store for MemoryStore {
    fn initialise(&mut self, graph_id: &str, schema: Schema) -> Result<(), TrellisError> {
        let state = Arc::get_mut(&mut self.state).ok_or_else(|| {
            TrellisError::Construction("Memory store is in use and cannot be initialised".to_string())
        })?;
        state.graph_id = graph_id.to_string();
        state.schema = Some(schema);
        tracing::debug!("Initialised memory store for graph {}", graph_id);
        Ok(())
    }

    fn execute(&self, chain: &mut OperationChain, user: &User) -> Result<Output, TrellisError> {
        let context = MemoryContext::new(Arc::clone(&self.state));
        let mut result = Output::Empty;
        for (i, op) in chain.operations_mut().iter_mut().enumerate() {
            if i > 0 && !op.has_input() {
                op.set_input(std::mem::take(&mut result))?;
            }
            let handler = self.handlers.resolve(op)?;
            tracing::debug!("Executing {} on graph {}", op, self.state.graph_id);
            result = handler.handle(op, &context, user)?;
        }
        Ok(result)
    }

    fn execute_job(&self, chain: &mut OperationChain, user: &User) -> Result<JobDetail, TrellisError> {
        let mut job = JobDetail::new(user.user_id.clone(), chain.to_string());
        let outcome = self.execute(chain, user);
        job.status = if outcome.is_ok() {
            JobStatus::Finished
        } else {
            JobStatus::Failed
        };
        self.state.record_job(job.clone())?;
        outcome.map(|_| job)
    }

    fn schema(&self) -> Option<&Schema> {
        self.state.schema()
    }

    fn traits(&self) -> BTreeSet<StoreTrait> {
        BTreeSet::from([
            StoreTrait::PreAggregationFiltering,
            StoreTrait::PostAggregationFiltering,
            StoreTrait::Transformation,
            StoreTrait::StoreAggregation,
        ])
    }

    fn is_supported(&self, kind: &OperationKind) -> bool {
        self.handlers.is_supported(kind)
    }

    fn next_operations(&self, kind: &OperationKind) -> BTreeSet<OperationKind> {
        let wants_input = kind.produces_output();
        self.handlers
            .supported()
            .into_iter()
            .filter(|next| next.accepts_input() == wants_input)
            .collect()
    }

    fn supported_operations(&self) -> BTreeSet<OperationKind> {
        self.handlers.supported()
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

type Handler = fn(&mut Operation, &MemoryContext, &User) -> Result<Output, TrellisError>;

fn default_handlers() -> HandlerRegistry<MemoryContext> {
    let table: [(OperationKind, Handler); 14] = [
        (OperationKind::AddElements, add_elements),
        (OperationKind::GetElements, get_elements),
        (OperationKind::GetAllElements, get_all_elements),
        (OperationKind::GetAdjacentIds, get_adjacent_ids),
        (OperationKind::Validate, validate),
        (OperationKind::Count, count),
        (OperationKind::CountGroups, count_groups),
        (OperationKind::Limit, limit),
        (OperationKind::ToSet, to_set),
        (OperationKind::ToEntitySeeds, to_entity_seeds),
        (OperationKind::DiscardOutput, discard_output),
        (OperationKind::ExportToSet, export_to_set),
        (OperationKind::GetSetExport, get_set_export),
        (OperationKind::ToArray, to_array),
    ];
    let mut registry = HandlerRegistry::new();
    for (kind, handler) in table {
        registry.register(kind, handler);
    }
    registry
}

/// The operation as the built-in `kind`, converting custom operations
/// that were dispatched through a supertype.
fn built_in<'a>(op: &'a Operation, kind: &OperationKind) -> Result<Cow<'a, Operation>, TrellisError> {
    if op.kind() == *kind {
        return Ok(Cow::Borrowed(op));
    }
    match op {
        Operation::Custom(custom) => custom
            .as_built_in(kind)
            .filter(|converted| converted.kind() == *kind)
            .map(Cow::Owned)
            .ok_or_else(|| TrellisError::UnsupportedOperation(op.kind())),
        _ => Err(TrellisError::UnsupportedOperation(op.kind())),
    }
}

macro_rules! expect_op {
    ($op:expr, $variant:ident) => {
        match built_in($op, &OperationKind::$variant)? {
            Cow::Borrowed(Operation::$variant(inner)) => Cow::Borrowed(inner),
            Cow::Owned(Operation::$variant(inner)) => Cow::Owned(inner),
            other => return Err(TrellisError::UnsupportedOperation(other.kind())),
        }
    };
}

fn require_schema(state: &MemoryStoreState) -> Result<&Schema, TrellisError> {
    state
        .schema()
        .ok_or_else(|| TrellisError::Execution("Store has not been initialised".to_string()))
}

/// Validated elements. Invalid ones are skipped or fail the operation.
fn checked(schema: &Schema, elements: &[Element], skip_invalid: bool) -> Result<Vec<Element>, TrellisError> {
    let mut valid = Vec::with_capacity(elements.len());
    for element in elements {
        match schema.validate_element(element) {
            Ok(()) => valid.push(element.clone()),
            Err(e) if skip_invalid => tracing::debug!("Skipping invalid element {}: {}", element, e),
            Err(e) => return Err(e),
        }
    }
    Ok(valid)
}

fn in_view(view: Option<&View>, element: Element) -> Result<Option<Element>, TrellisError> {
    match view {
        Some(view) => view.apply(element),
        None => Ok(Some(element)),
    }
}

fn add_elements(op: &mut Operation, ctx: &MemoryContext, _user: &User) -> Result<Output, TrellisError> {
    let state = ctx.state();
    let add = expect_op!(op, AddElements);
    let elements = if add.validate {
        checked(require_schema(state)?, &add.input, add.skip_invalid_elements)?
    } else {
        add.input.clone()
    };
    for element in elements {
        state.add(element)?;
    }
    Ok(Output::Empty)
}

/// The edge with its matched vertex set, if it relates to `seed` in the
/// requested direction.
fn matched_edge(
    edge: &Edge,
    seed: &EntityId,
    in_out: IncludeIncomingOutgoing,
    directed_type: Option<DirectedType>,
) -> Option<Edge> {
    if !DirectedType::accepts(directed_type, edge.directed) {
        return None;
    }
    let relation = EdgeId::from_edge(edge).is_related_to_entity(seed);
    let source = matches!(relation, Matches::Both | Matches::Source);
    let destination = matches!(relation, Matches::Both | Matches::Destination);
    let matched = match (edge.directed, in_out) {
        (true, IncludeIncomingOutgoing::Outgoing) if source => MatchedVertex::Source,
        (true, IncludeIncomingOutgoing::Incoming) if destination => MatchedVertex::Destination,
        (true, IncludeIncomingOutgoing::Outgoing | IncludeIncomingOutgoing::Incoming) => return None,
        _ if source => MatchedVertex::Source,
        _ if destination => MatchedVertex::Destination,
        _ => return None,
    };
    let mut edge = edge.clone();
    edge.matched_vertex = Some(matched);
    Some(edge)
}

fn edge_matches_seed(edge: &Edge, seed: &EdgeId) -> bool {
    if !DirectedType::accepts(seed.directed_type, edge.directed) {
        return false;
    }
    let forward = edge.source == seed.source && edge.destination == seed.destination;
    let reverse = !edge.directed && edge.source == seed.destination && edge.destination == seed.source;
    forward || reverse
}

fn get_elements(op: &mut Operation, ctx: &MemoryContext, _user: &User) -> Result<Output, TrellisError> {
    let state = ctx.state();
    let get = expect_op!(op, GetElements);
    let related = get.seed_matching == SeedMatching::Related;
    let stored = state.read()?;
    let mut found = Vec::new();

    for seed in &get.input {
        for element in stored.values() {
            let candidate = match (seed, element) {
                (ElementId::Entity(seed), Element::Entity(entity)) => {
                    (entity.vertex == seed.vertex).then(|| element.clone())
                }
                (ElementId::Entity(seed), Element::Edge(edge)) if related => {
                    matched_edge(edge, seed, get.include_incoming_out_going, get.directed_type)
                        .map(Element::Edge)
                }
                (ElementId::Edge(seed), Element::Entity(entity)) if related => {
                    (entity.vertex == seed.source || entity.vertex == seed.destination)
                        .then(|| element.clone())
                }
                (ElementId::Edge(seed), Element::Edge(edge)) => (edge_matches_seed(edge, seed)
                    && DirectedType::accepts(get.directed_type, edge.directed))
                .then(|| element.clone()),
                _ => None,
            };
            if let Some(candidate) = candidate {
                if let Some(kept) = in_view(get.view.as_ref(), candidate)? {
                    found.push(kept);
                }
            }
        }
    }
    Ok(Output::Elements(found))
}

fn get_all_elements(op: &mut Operation, ctx: &MemoryContext, _user: &User) -> Result<Output, TrellisError> {
    let state = ctx.state();
    let all = expect_op!(op, GetAllElements);
    let stored = state.read()?;
    let mut found = Vec::new();
    for element in stored.values() {
        if let Element::Edge(edge) = element {
            if !DirectedType::accepts(all.directed_type, edge.directed) {
                continue;
            }
        }
        if let Some(kept) = in_view(all.view.as_ref(), element.clone())? {
            found.push(kept);
        }
    }
    Ok(Output::Elements(found))
}

fn get_adjacent_ids(op: &mut Operation, ctx: &MemoryContext, _user: &User) -> Result<Output, TrellisError> {
    let state = ctx.state();
    let adjacent = expect_op!(op, GetAdjacentIds);
    let stored = state.read()?;
    let mut ids = Vec::new();
    for seed in &adjacent.input {
        for element in stored.values() {
            let Element::Edge(edge) = element else {
                continue;
            };
            let Some(matched) = matched_edge(
                edge,
                seed,
                adjacent.include_incoming_out_going,
                adjacent.directed_type,
            ) else {
                continue;
            };
            if let Some(Element::Edge(kept)) = in_view(adjacent.view.as_ref(), Element::Edge(matched))? {
                ids.push(ElementId::Entity(EntityId::new(kept.adjacent_endpoint().clone())));
            }
        }
    }
    Ok(Output::Ids(ids))
}

fn validate(op: &mut Operation, ctx: &MemoryContext, _user: &User) -> Result<Output, TrellisError> {
    let state = ctx.state();
    let validate = expect_op!(op, Validate);
    let valid = checked(
        require_schema(state)?,
        &validate.input,
        validate.skip_invalid_elements,
    )?;
    Ok(Output::Elements(valid))
}

fn unsupported_input(kind: OperationKind, input: &Output) -> TrellisError {
    TrellisError::Execution(format!("{} cannot take {} as input", kind, input.type_name()))
}

fn count(op: &mut Operation, _ctx: &MemoryContext, _user: &User) -> Result<Output, TrellisError> {
    let count = expect_op!(op, Count);
    let n = match &count.input {
        Output::Empty => 0,
        Output::Elements(elements) => elements.len(),
        Output::Ids(ids) => ids.len(),
        other => return Err(unsupported_input(OperationKind::Count, other)),
    };
    Ok(Output::Count(n as u64))
}

fn count_groups(op: &mut Operation, _ctx: &MemoryContext, _user: &User) -> Result<Output, TrellisError> {
    let count_groups = expect_op!(op, CountGroups);
    let elements: &[Element] = match &count_groups.input {
        Output::Empty => &[],
        Output::Elements(elements) => elements,
        other => return Err(unsupported_input(OperationKind::CountGroups, other)),
    };
    let mut counts = GroupCounts::default();
    let mut total = 0u64;
    for element in elements {
        if count_groups.limit.is_some_and(|limit| total >= limit) {
            counts.limit_hit = true;
            break;
        }
        let groups = if element.is_entity() {
            &mut counts.entity_groups
        } else {
            &mut counts.edge_groups
        };
        *groups.entry(element.group().to_string()).or_insert(0) += 1;
        total += 1;
    }
    Ok(Output::GroupCounts(counts))
}

fn truncated<T: Clone>(items: &[T], limit: &Limit) -> Result<Vec<T>, TrellisError> {
    if items.len() > limit.result_limit && !limit.truncate {
        return Err(TrellisError::LimitExceeded(limit.result_limit));
    }
    Ok(items.iter().take(limit.result_limit).cloned().collect())
}

fn limit(op: &mut Operation, _ctx: &MemoryContext, _user: &User) -> Result<Output, TrellisError> {
    let limit = expect_op!(op, Limit);
    match &limit.input {
        Output::Empty => Ok(Output::Empty),
        Output::Elements(elements) => Ok(Output::Elements(truncated(elements, &limit)?)),
        Output::Ids(ids) => Ok(Output::Ids(truncated(ids, &limit)?)),
        other => Err(unsupported_input(OperationKind::Limit, other)),
    }
}

fn distinct<T: Clone + Eq + Hash>(items: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    items.iter().filter(|item| seen.insert(*item)).cloned().collect()
}

fn to_set(op: &mut Operation, _ctx: &MemoryContext, _user: &User) -> Result<Output, TrellisError> {
    let to_set = expect_op!(op, ToSet);
    match &to_set.input {
        Output::Empty => Ok(Output::Empty),
        Output::Elements(elements) => Ok(Output::Elements(distinct(elements))),
        Output::Ids(ids) => Ok(Output::Ids(distinct(ids))),
        other => Err(unsupported_input(OperationKind::ToSet, other)),
    }
}

fn to_entity_seeds(op: &mut Operation, _ctx: &MemoryContext, _user: &User) -> Result<Output, TrellisError> {
    let to_seeds = expect_op!(op, ToEntitySeeds);
    let ids = match &to_seeds.input {
        Output::Empty | Output::Elements(_) | Output::Ids(_) => to_seeds.input.clone().into_ids()?,
        other => return Err(unsupported_input(OperationKind::ToEntitySeeds, other)),
    };
    let seeds = ids
        .into_iter()
        .flat_map(|id| match id {
            ElementId::Entity(entity) => vec![entity.vertex],
            ElementId::Edge(edge) => vec![edge.source, edge.destination],
        })
        .map(|vertex| ElementId::Entity(EntityId::new(vertex)))
        .collect();
    Ok(Output::Ids(seeds))
}

fn discard_output(op: &mut Operation, _ctx: &MemoryContext, _user: &User) -> Result<Output, TrellisError> {
    let _ = expect_op!(op, DiscardOutput);
    Ok(Output::Empty)
}

/// Records the input in the run's set export and passes it on unchanged.
fn export_to_set(op: &mut Operation, ctx: &MemoryContext, _user: &User) -> Result<Output, TrellisError> {
    let export = expect_op!(op, ExportToSet);
    ctx.export(&export.key, &export.input)?;
    Ok(export.input.clone())
}

fn get_set_export(op: &mut Operation, ctx: &MemoryContext, _user: &User) -> Result<Output, TrellisError> {
    let get = expect_op!(op, GetSetExport);
    ctx.exported(&get.key, get.start, get.end)
}

/// Outputs are already materialised; only lists are accepted.
fn to_array(op: &mut Operation, _ctx: &MemoryContext, _user: &User) -> Result<Output, TrellisError> {
    let to_array = expect_op!(op, ToArray);
    match &to_array.input {
        Output::Empty | Output::Elements(_) | Output::Ids(_) => Ok(to_array.input.clone()),
        other => Err(unsupported_input(OperationKind::ToArray, other)),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::operation::{
        AddElements, Count, CountGroups, CustomOperation, DiscardOutput, ExportToSet,
        GetAdjacentIds, GetAllElements, GetElements, GetSetExport, SplitStore, ToArray,
        ToEntitySeeds, ToSet, Validate,
    };
    use crate::predicate::{ElementFilter, Predicate};
    use crate::schema::{
        AggregateFunction, SchemaEdgeDefinition, SchemaEntityDefinition, TypeDefinition,
    };
    use crate::types::{Entity, ValueKind};
    use crate::view::ViewElementDefinition;

    fn schema() -> Schema {
        Schema::new()
            .with_type("string", TypeDefinition::new(ValueKind::Text))
            .with_type(
                "count",
                TypeDefinition::new(ValueKind::Int).with_aggregate_function(AggregateFunction::Sum),
            )
            .with_entity(
                "person",
                SchemaEntityDefinition::new("string").with_property("count", "count"),
            )
            .with_edge(
                "knows",
                SchemaEdgeDefinition::new("string", "string")
                    .with_directed(true)
                    .with_property("count", "count"),
            )
            .with_edge("near", SchemaEdgeDefinition::new("string", "string").with_directed(false))
    }

    fn elements() -> Vec<Element> {
        vec![
            Entity::new("person", "a").with_property("count", 1).into(),
            Entity::new("person", "b").with_property("count", 2).into(),
            Edge::new("knows", "a", "b", true).with_property("count", 1).into(),
            Edge::new("knows", "c", "a", true).with_property("count", 1).into(),
            Edge::new("near", "b", "a", false).into(),
        ]
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.initialise("test", schema()).expect("initialise");
        let mut chain = OperationChain::from(Operation::from(AddElements {
            input: elements(),
            ..AddElements::default()
        }));
        store.execute(&mut chain, &User::default()).expect("add");
        store
    }

    fn run(store: &MemoryStore, chain: OperationChain) -> Result<Output, TrellisError> {
        let mut chain = chain;
        store.execute(&mut chain, &User::default())
    }

    fn seeds(vertices: &[&str]) -> Vec<ElementId> {
        vertices
            .iter()
            .map(|v| ElementId::Entity(EntityId::new(*v)))
            .collect()
    }

    fn get(vertices: &[&str]) -> GetElements {
        GetElements {
            input: seeds(vertices),
            ..GetElements::default()
        }
    }

    #[test]
    fn stores_and_aggregates() {
        let store = store();
        assert_eq!(store.state().len().expect("len"), 5);

        let mut chain = OperationChain::from(Operation::from(AddElements {
            input: vec![Entity::new("person", "a").with_property("count", 4).into()],
            ..AddElements::default()
        }));
        store.execute(&mut chain, &User::default()).expect("add");

        let out = run(&store, OperationChain::from(Operation::from(get(&["a"])))).expect("get");
        let entity = out
            .as_elements()
            .and_then(|e| e.iter().find(|e| e.is_entity()))
            .expect("entity");
        assert_eq!(entity.property("count"), Some(&Value::Int(5)));
    }

    #[test]
    fn undirected_edges_meet_in_either_orientation() {
        let store = store();
        let mut chain = OperationChain::from(Operation::from(AddElements {
            input: vec![Edge::new("near", "a", "b", false).into()],
            ..AddElements::default()
        }));
        store.execute(&mut chain, &User::default()).expect("add");
        assert_eq!(store.state().len().expect("len"), 5);
    }

    #[test]
    fn invalid_elements_fail_or_are_skipped() {
        let store = store();
        let bad: Element = Entity::new("person", "z").with_property("count", "x").into();

        let mut chain = OperationChain::from(Operation::from(AddElements {
            input: vec![bad.clone()],
            ..AddElements::default()
        }));
        assert!(matches!(
            store.execute(&mut chain, &User::default()),
            Err(TrellisError::InvalidElement(_))
        ));

        let mut chain = OperationChain::from(Operation::from(AddElements {
            input: vec![bad],
            skip_invalid_elements: true,
            ..AddElements::default()
        }));
        store.execute(&mut chain, &User::default()).expect("skip");
        assert_eq!(store.state().len().expect("len"), 5);
    }

    #[test]
    fn entity_seeds_match_entities_and_edges_with_matched_vertex() {
        let out = run(&store(), OperationChain::from(Operation::from(get(&["a"])))).expect("get");
        let found = out.as_elements().expect("elements");
        assert_eq!(found.len(), 4);

        for element in found {
            if let Element::Edge(edge) = element {
                let expected = if edge.source == Value::from("a") {
                    MatchedVertex::Source
                } else {
                    MatchedVertex::Destination
                };
                assert_eq!(edge.matched_vertex, Some(expected));
            }
        }
    }

    #[test]
    fn direction_filters_apply_to_directed_edges() {
        let outgoing = GetElements {
            include_incoming_out_going: IncludeIncomingOutgoing::Outgoing,
            ..get(&["a"])
        };
        let out = run(&store(), OperationChain::from(Operation::from(outgoing))).expect("get");
        let edges: Vec<_> = out
            .as_elements()
            .expect("elements")
            .iter()
            .filter(|e| e.is_edge())
            .collect();
        // a->b plus the undirected edge
        assert_eq!(edges.len(), 2);

        let directed_only = GetElements {
            directed_type: Some(DirectedType::Directed),
            ..get(&["a"])
        };
        let out = run(&store(), OperationChain::from(Operation::from(directed_only))).expect("get");
        assert_eq!(out.as_elements().expect("elements").len(), 3);
    }

    #[test]
    fn equal_matching_ignores_related_edges() {
        let equal = GetElements {
            seed_matching: SeedMatching::Equal,
            ..get(&["a"])
        };
        let out = run(&store(), OperationChain::from(Operation::from(equal))).expect("get");
        assert_eq!(out.as_elements().expect("elements").len(), 1);
    }

    #[test]
    fn edge_seeds_match_edges() {
        let seed = ElementId::Edge(EdgeId::new("a", "b", Some(DirectedType::Either)));
        let out = run(
            &store(),
            OperationChain::from(Operation::from(GetElements {
                input: vec![seed],
                seed_matching: SeedMatching::Equal,
                ..GetElements::default()
            })),
        )
        .expect("get");
        // knows a->b, and the undirected near b-a
        assert_eq!(out.as_elements().expect("elements").len(), 2);
    }

    #[test]
    fn views_filter_results() {
        let view = View::new().with_entity(
            "person",
            ViewElementDefinition::new().with_pre_aggregation_filter(
                ElementFilter::builder()
                    .select(["count"])
                    .execute(Predicate::is_more_than(1))
                    .build(),
            ),
        );
        let out = run(
            &store(),
            OperationChain::from(Operation::from(GetAllElements {
                view: Some(view),
                ..GetAllElements::default()
            })),
        )
        .expect("get");
        assert_eq!(
            out.as_elements().expect("elements"),
            &[Element::from(Entity::new("person", "b").with_property("count", 2))]
        );
    }

    #[test]
    fn adjacent_ids_follow_edges() {
        let out = run(
            &store(),
            OperationChain::from(Operation::from(GetAdjacentIds {
                input: vec![EntityId::new("a")],
                ..GetAdjacentIds::default()
            })),
        )
        .expect("adjacent");
        let mut ids: Vec<String> = out
            .as_ids()
            .expect("ids")
            .iter()
            .map(ToString::to_string)
            .collect();
        ids.sort();
        assert_eq!(
            ids,
            vec![
                "EntityId[vertex=b]",
                "EntityId[vertex=b]",
                "EntityId[vertex=c]"
            ]
        );
    }

    #[test]
    fn outputs_thread_through_the_chain() {
        let chain = OperationChain::first(GetAllElements::default())
            .then(ToEntitySeeds::default())
            .then(ToSet::default())
            .then(Count::default())
            .build();
        assert_eq!(run(&store(), chain).expect("run"), Output::Count(3));
    }

    #[test]
    fn count_groups_respects_limit() {
        let chain = OperationChain::first(GetAllElements::default())
            .then(CountGroups::default())
            .build();
        let Output::GroupCounts(counts) = run(&store(), chain).expect("run") else {
            panic!("expected group counts");
        };
        assert_eq!(counts.entity_groups.get("person"), Some(&2));
        assert_eq!(counts.edge_groups.get("knows"), Some(&2));
        assert!(!counts.limit_hit);

        let chain = OperationChain::first(GetAllElements::default())
            .then(CountGroups {
                limit: Some(2),
                ..CountGroups::default()
            })
            .build();
        let Output::GroupCounts(counts) = run(&store(), chain).expect("run") else {
            panic!("expected group counts");
        };
        assert!(counts.limit_hit);
    }

    #[test]
    fn limit_truncates_or_fails() {
        let chain = OperationChain::first(GetAllElements::default())
            .then(Limit::new(2))
            .build();
        assert_eq!(
            run(&store(), chain).expect("run").as_elements().map(<[_]>::len),
            Some(2)
        );

        let strict = Limit {
            truncate: false,
            ..Limit::new(2)
        };
        let chain = OperationChain::first(GetAllElements::default())
            .then(strict)
            .build();
        assert!(matches!(
            run(&store(), chain),
            Err(TrellisError::LimitExceeded(2))
        ));
    }

    fn export_and_read(read: GetSetExport) -> OperationChain {
        OperationChain::first(GetAllElements::default())
            .then(ExportToSet::default())
            .then(DiscardOutput::default())
            .then(read)
            .build()
    }

    #[test]
    fn exports_are_read_back_within_the_chain() {
        let store = store();
        let all = store.state().elements().expect("elements");
        let out = run(&store, export_and_read(GetSetExport::default())).expect("run");
        assert_eq!(out, Output::Elements(all));
    }

    #[test]
    fn set_exports_page_with_start_and_end() {
        let store = store();
        let all = store.state().elements().expect("elements");

        let out = run(&store, export_and_read(GetSetExport::default().page(2, 4))).expect("run");
        assert_eq!(out, Output::Elements(all[2..4].to_vec()));

        let past_end = run(&store, export_and_read(GetSetExport::default().page(4, 99))).expect("run");
        assert_eq!(past_end, Output::Elements(all[4..].to_vec()));

        let backwards = export_and_read(GetSetExport::default().page(3, 1));
        assert!(matches!(run(&store, backwards), Err(TrellisError::Execution(_))));
    }

    #[test]
    fn set_exports_are_keyed_and_distinct() {
        let chain = OperationChain::first(get(&["a"]))
            .then(ExportToSet::keyed("a"))
            .then(DiscardOutput::default())
            .then(get(&["b"]))
            .then(ExportToSet::keyed("b"))
            .then(ExportToSet::keyed("b"))
            .then(DiscardOutput::default())
            .then(GetSetExport::keyed("b"))
            .then(Count::default())
            .build();
        // b, a->b, near b-a
        assert_eq!(run(&store(), chain).expect("run"), Output::Count(3));

        let chain = OperationChain::first(get(&["a"]))
            .then(ExportToSet::keyed("a"))
            .then(DiscardOutput::default())
            .then(GetSetExport::keyed("b"))
            .build();
        assert_eq!(run(&store(), chain).expect("run"), Output::Empty);
    }

    #[test]
    fn exports_do_not_outlive_their_chain() {
        let store = store();
        run(&store, export_and_read(GetSetExport::default())).expect("export");

        let later = OperationChain::from(Operation::from(GetSetExport::default()));
        assert_eq!(run(&store, later).expect("run"), Output::Empty);

        let mut job = export_and_read(GetSetExport::default());
        store.execute_job(&mut job, &User::default()).expect("job");
        let later = OperationChain::from(Operation::from(GetSetExport::default()));
        assert_eq!(run(&store, later).expect("run"), Output::Empty);
    }

    #[test]
    fn export_rejects_mixed_items() {
        let chain = OperationChain::first(GetAllElements::default())
            .then(ExportToSet::default())
            .then(ToEntitySeeds::default())
            .then(ExportToSet::default())
            .build();
        assert!(matches!(run(&store(), chain), Err(TrellisError::Execution(_))));
    }

    #[test]
    fn to_array_passes_lists_only() {
        let chain = OperationChain::first(get(&["b"])).then(ToArray::default()).build();
        assert_eq!(
            run(&store(), chain).expect("run").as_elements().map(<[_]>::len),
            Some(3)
        );

        let chain = OperationChain::first(GetAllElements::default())
            .then(Count::default())
            .then(ToArray::default())
            .build();
        assert!(matches!(run(&store(), chain), Err(TrellisError::Execution(_))));
    }

    #[test]
    fn validate_reports_invalid_elements() {
        let op = Validate {
            input: vec![Entity::new("ghost", "x").into()],
            skip_invalid_elements: false,
        };
        assert!(run(&store(), OperationChain::from(Operation::from(op))).is_err());
    }

    #[test]
    fn split_store_is_unsupported() {
        let store = store();
        assert!(!store.is_supported(&OperationKind::SplitStore));
        assert!(matches!(
            run(&store, OperationChain::from(Operation::from(SplitStore::default()))),
            Err(TrellisError::UnsupportedOperation(OperationKind::SplitStore))
        ));
    }

    #[test]
    fn next_operations_follow_output() {
        let store = store();
        let after_get = store.next_operations(&OperationKind::GetElements);
        assert!(after_get.contains(&OperationKind::Count));
        assert!(!after_get.contains(&OperationKind::GetAllElements));

        let after_add = store.next_operations(&OperationKind::AddElements);
        assert_eq!(
            after_add,
            BTreeSet::from([OperationKind::GetAllElements, OperationKind::GetSetExport])
        );
    }

    #[test]
    fn jobs_are_recorded() {
        let store = store();
        let mut chain = OperationChain::from(Operation::from(GetAllElements::default()));
        let job = store
            .execute_job(&mut chain, &User::new("alice"))
            .expect("job");
        assert_eq!(job.status, JobStatus::Finished);
        assert_eq!(job.user_id, "alice");
        assert_eq!(store.state().jobs().expect("jobs"), vec![job]);
    }

    #[derive(Debug, Clone)]
    struct Neighbours {
        vertex: String,
    }

    impl CustomOperation for Neighbours {
        fn kind_name(&self) -> &str {
            "Neighbours"
        }

        fn supertypes(&self) -> Vec<OperationKind> {
            vec![OperationKind::GetAdjacentIds]
        }

        fn as_built_in(&self, kind: &OperationKind) -> Option<Operation> {
            (*kind == OperationKind::GetAdjacentIds).then(|| {
                Operation::from(GetAdjacentIds {
                    input: vec![EntityId::new(self.vertex.as_str())],
                    ..GetAdjacentIds::default()
                })
            })
        }

        fn clone_box(&self) -> Box<dyn CustomOperation> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn custom_operations_run_through_supertype_handlers() {
        let op = Operation::Custom(Box::new(Neighbours {
            vertex: "c".to_string(),
        }));
        let out = run(&store(), OperationChain::from(op)).expect("run");
        assert_eq!(out, Output::Ids(seeds(&["a"])));
    }

    #[test]
    fn custom_handlers_can_be_registered() {
        let mut store = store();
        store.register_handler(
            OperationKind::Custom("Neighbours".to_string()),
            |_: &mut Operation, ctx: &MemoryContext, _: &User| -> Result<Output, TrellisError> {
                Ok(Output::Count(ctx.state().len()? as u64))
            },
        );
        let op = Operation::Custom(Box::new(Neighbours {
            vertex: "c".to_string(),
        }));
        assert_eq!(run(&store, OperationChain::from(op)).expect("run"), Output::Count(5));
    }
}
