//! # Operations
//!
//! The units of work a graph executes. Built-in kinds form a closed tagged
//! set; anything else plugs in through [`CustomOperation`].
//!
//! Operations that consume data hold it in an `input` slot. That input is
//! the resource an [`OperationChain`] releases on close.

mod chain;
mod registry;

pub use chain::{OperationChain, OperationChainBuilder};
pub use registry::{CustomOperationFactory, OperationRegistry};

use crate::identity::{DirectedType, ElementId, EntityId};
use crate::types::{Element, TrellisError};
use crate::view::View;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// =============================================================================
// OPERATION KIND
// =============================================================================

/// The discriminator of an operation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    AddElements,
    GetElements,
    GetAllElements,
    GetAdjacentIds,
    Validate,
    Count,
    CountGroups,
    Limit,
    ToSet,
    ToEntitySeeds,
    DiscardOutput,
    SplitStore,
    ExportToSet,
    GetSetExport,
    ToArray,
    /// A kind registered at runtime, by name.
    Custom(String),
}

impl OperationKind {
    /// Every built-in kind, in declaration order.
    pub const BUILT_IN: [OperationKind; 15] = [
        OperationKind::AddElements,
        OperationKind::GetElements,
        OperationKind::GetAllElements,
        OperationKind::GetAdjacentIds,
        OperationKind::Validate,
        OperationKind::Count,
        OperationKind::CountGroups,
        OperationKind::Limit,
        OperationKind::ToSet,
        OperationKind::ToEntitySeeds,
        OperationKind::DiscardOutput,
        OperationKind::SplitStore,
        OperationKind::ExportToSet,
        OperationKind::GetSetExport,
        OperationKind::ToArray,
    ];

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            OperationKind::AddElements => "AddElements",
            OperationKind::GetElements => "GetElements",
            OperationKind::GetAllElements => "GetAllElements",
            OperationKind::GetAdjacentIds => "GetAdjacentIds",
            OperationKind::Validate => "Validate",
            OperationKind::Count => "Count",
            OperationKind::CountGroups => "CountGroups",
            OperationKind::Limit => "Limit",
            OperationKind::ToSet => "ToSet",
            OperationKind::ToEntitySeeds => "ToEntitySeeds",
            OperationKind::DiscardOutput => "DiscardOutput",
            OperationKind::SplitStore => "SplitStore",
            OperationKind::ExportToSet => "ExportToSet",
            OperationKind::GetSetExport => "GetSetExport",
            OperationKind::ToArray => "ToArray",
            OperationKind::Custom(name) => name,
        }
    }

    /// Seed-based retrievals receive the graph's default view.
    #[must_use]
    pub fn is_seeded_retrieval(&self) -> bool {
        matches!(
            self,
            OperationKind::GetElements | OperationKind::GetAdjacentIds
        )
    }

    #[must_use]
    pub fn accepts_input(&self) -> bool {
        !matches!(
            self,
            OperationKind::GetAllElements | OperationKind::GetSetExport | OperationKind::SplitStore
        )
    }

    #[must_use]
    pub fn produces_output(&self) -> bool {
        !matches!(
            self,
            OperationKind::AddElements | OperationKind::DiscardOutput | OperationKind::SplitStore
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

/// Counts per group, as produced by `CountGroups`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCounts {
    pub entity_groups: BTreeMap<String, u64>,
    pub edge_groups: BTreeMap<String, u64>,
    /// True when counting stopped at the configured limit.
    pub limit_hit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Finished,
    Failed,
}

/// Record of a chain submitted as a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    pub job_id: Uuid,
    pub user_id: String,
    pub status: JobStatus,
    pub description: String,
}

impl JobDetail {
    #[must_use]
    pub fn new(user_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            user_id: user_id.into(),
            status: JobStatus::Running,
            description: description.into(),
        }
    }
}

/// The result of an operation or chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Output {
    #[default]
    Empty,
    Elements(Vec<Element>),
    Ids(Vec<ElementId>),
    Count(u64),
    GroupCounts(GroupCounts),
    Job(JobDetail),
}

impl Output {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Output::Empty)
    }

    #[must_use]
    pub fn as_elements(&self) -> Option<&[Element]> {
        match self {
            Output::Elements(elements) => Some(elements),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_ids(&self) -> Option<&[ElementId]> {
        match self {
            Output::Ids(ids) => Some(ids),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_count(&self) -> Option<u64> {
        match self {
            Output::Count(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Output::Empty => "empty",
            Output::Elements(_) => "elements",
            Output::Ids(_) => "ids",
            Output::Count(_) => "count",
            Output::GroupCounts(_) => "group counts",
            Output::Job(_) => "job",
        }
    }

    /// Identifiers of the items, converting elements to ids.
    pub fn into_ids(self) -> Result<Vec<ElementId>, TrellisError> {
        match self {
            Output::Empty => Ok(Vec::new()),
            Output::Ids(ids) => Ok(ids),
            Output::Elements(elements) => Ok(elements.iter().map(Element::id).collect()),
            other => Err(TrellisError::Execution(format!(
                "Cannot use {} as identifiers",
                other.type_name()
            ))),
        }
    }

    pub fn into_elements(self) -> Result<Vec<Element>, TrellisError> {
        match self {
            Output::Empty => Ok(Vec::new()),
            Output::Elements(elements) => Ok(elements),
            other => Err(TrellisError::Execution(format!(
                "Cannot use {} as elements",
                other.type_name()
            ))),
        }
    }
}

// =============================================================================
// BUILT-IN OPERATIONS
// =============================================================================

/// Which edges a seed matches by direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncludeIncomingOutgoing {
    #[default]
    Either,
    Incoming,
    Outgoing,
}

/// Whether seeds match related elements or only equal ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeedMatching {
    #[default]
    Related,
    Equal,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddElements {
    #[serde(default)]
    pub input: Vec<Element>,
    #[serde(default = "yes")]
    pub validate: bool,
    #[serde(default)]
    pub skip_invalid_elements: bool,
}

impl Default for AddElements {
    fn default() -> Self {
        Self {
            input: Vec::new(),
            validate: true,
            skip_invalid_elements: false,
        }
    }
}

/// Elements related to the seeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetElements {
    #[serde(default)]
    pub input: Vec<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    #[serde(default)]
    pub include_incoming_out_going: IncludeIncomingOutgoing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directed_type: Option<DirectedType>,
    #[serde(default)]
    pub seed_matching: SeedMatching,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAllElements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directed_type: Option<DirectedType>,
}

/// Vertices one hop away from the seeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAdjacentIds {
    #[serde(default)]
    pub input: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    #[serde(default)]
    pub include_incoming_out_going: IncludeIncomingOutgoing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directed_type: Option<DirectedType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validate {
    #[serde(default)]
    pub input: Vec<Element>,
    #[serde(default)]
    pub skip_invalid_elements: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Count {
    #[serde(skip)]
    pub input: Output,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountGroups {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip)]
    pub input: Output,
}

/// Keep at most `result_limit` items; fail instead when `truncate` is off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limit {
    pub result_limit: usize,
    #[serde(default = "yes")]
    pub truncate: bool,
    #[serde(skip)]
    pub input: Output,
}

impl Limit {
    #[must_use]
    pub fn new(result_limit: usize) -> Self {
        Self {
            result_limit,
            truncate: true,
            input: Output::Empty,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToSet {
    #[serde(skip)]
    pub input: Output,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToEntitySeeds {
    #[serde(skip)]
    pub input: Output,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardOutput {
    #[serde(skip)]
    pub input: Output,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitStore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_path: Option<String>,
}

/// Key used by set exports that do not name one.
pub const DEFAULT_EXPORT_KEY: &str = "ALL";

fn default_export_key() -> String {
    DEFAULT_EXPORT_KEY.to_string()
}

/// Append the input to the chain's set export under `key` and pass it on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportToSet {
    #[serde(default = "default_export_key")]
    pub key: String,
    #[serde(skip)]
    pub input: Output,
}

impl Default for ExportToSet {
    fn default() -> Self {
        Self {
            key: default_export_key(),
            input: Output::Empty,
        }
    }
}

impl ExportToSet {
    #[must_use]
    pub fn keyed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            input: Output::Empty,
        }
    }
}

/// Read back a set export. `start` and `end` page through it, end exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSetExport {
    #[serde(default = "default_export_key")]
    pub key: String,
    #[serde(default)]
    pub start: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
}

impl Default for GetSetExport {
    fn default() -> Self {
        Self {
            key: default_export_key(),
            start: 0,
            end: None,
        }
    }
}

impl GetSetExport {
    #[must_use]
    pub fn keyed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn page(mut self, start: usize, end: usize) -> Self {
        self.start = start;
        self.end = Some(end);
        self
    }
}

/// Materialise the input as a single array of items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToArray {
    #[serde(skip)]
    pub input: Output,
}

// =============================================================================
// CUSTOM OPERATIONS
// =============================================================================

/// An operation kind outside the built-in set.
///
/// `supertypes` lists the kinds whose handlers may run this operation when
/// no handler is registered for its own kind, most specific first. A
/// custom operation that lists a seeded retrieval kind is treated as one.
pub trait CustomOperation: fmt::Debug + Send + Sync {
    fn kind_name(&self) -> &str;

    fn supertypes(&self) -> Vec<OperationKind> {
        Vec::new()
    }

    fn view(&self) -> Option<&View> {
        None
    }

    fn set_view(&mut self, _view: View) {}

    fn has_input(&self) -> bool {
        false
    }

    fn set_input(&mut self, _input: Output) -> Result<(), TrellisError> {
        Ok(())
    }

    /// Release whatever input the operation holds.
    fn close(&mut self) {}

    /// The built-in form of this operation for a supertype handler.
    fn as_built_in(&self, _kind: &OperationKind) -> Option<Operation> {
        None
    }

    fn clone_box(&self) -> Box<dyn CustomOperation>;
}

impl Clone for Box<dyn CustomOperation> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

// =============================================================================
// OPERATION
// =============================================================================

/// One unit of work in a chain.
#[derive(Debug, Clone)]
pub enum Operation {
    AddElements(AddElements),
    GetElements(GetElements),
    GetAllElements(GetAllElements),
    GetAdjacentIds(GetAdjacentIds),
    Validate(Validate),
    Count(Count),
    CountGroups(CountGroups),
    Limit(Limit),
    ToSet(ToSet),
    ToEntitySeeds(ToEntitySeeds),
    DiscardOutput(DiscardOutput),
    SplitStore(SplitStore),
    ExportToSet(ExportToSet),
    GetSetExport(GetSetExport),
    ToArray(ToArray),
    Custom(Box<dyn CustomOperation>),
}

impl Operation {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::AddElements(_) => OperationKind::AddElements,
            Operation::GetElements(_) => OperationKind::GetElements,
            Operation::GetAllElements(_) => OperationKind::GetAllElements,
            Operation::GetAdjacentIds(_) => OperationKind::GetAdjacentIds,
            Operation::Validate(_) => OperationKind::Validate,
            Operation::Count(_) => OperationKind::Count,
            Operation::CountGroups(_) => OperationKind::CountGroups,
            Operation::Limit(_) => OperationKind::Limit,
            Operation::ToSet(_) => OperationKind::ToSet,
            Operation::ToEntitySeeds(_) => OperationKind::ToEntitySeeds,
            Operation::DiscardOutput(_) => OperationKind::DiscardOutput,
            Operation::SplitStore(_) => OperationKind::SplitStore,
            Operation::ExportToSet(_) => OperationKind::ExportToSet,
            Operation::GetSetExport(_) => OperationKind::GetSetExport,
            Operation::ToArray(_) => OperationKind::ToArray,
            Operation::Custom(op) => OperationKind::Custom(op.kind_name().to_string()),
        }
    }

    /// Fallback kinds for handler resolution. Empty for built-ins.
    #[must_use]
    pub fn supertypes(&self) -> Vec<OperationKind> {
        match self {
            Operation::Custom(op) => op.supertypes(),
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn is_seeded_retrieval(&self) -> bool {
        match self {
            Operation::Custom(op) => op
                .supertypes()
                .iter()
                .any(OperationKind::is_seeded_retrieval),
            other => other.kind().is_seeded_retrieval(),
        }
    }

    #[must_use]
    pub fn view(&self) -> Option<&View> {
        match self {
            Operation::GetElements(op) => op.view.as_ref(),
            Operation::GetAllElements(op) => op.view.as_ref(),
            Operation::GetAdjacentIds(op) => op.view.as_ref(),
            Operation::Custom(op) => op.view(),
            _ => None,
        }
    }

    /// Attach a view. Ignored by operations that do not read elements.
    pub fn set_view(&mut self, view: View) {
        match self {
            Operation::GetElements(op) => op.view = Some(view),
            Operation::GetAllElements(op) => op.view = Some(view),
            Operation::GetAdjacentIds(op) => op.view = Some(view),
            Operation::Custom(op) => op.set_view(view),
            _ => {}
        }
    }

    #[must_use]
    pub fn has_input(&self) -> bool {
        match self {
            Operation::AddElements(op) => !op.input.is_empty(),
            Operation::GetElements(op) => !op.input.is_empty(),
            Operation::GetAdjacentIds(op) => !op.input.is_empty(),
            Operation::Validate(op) => !op.input.is_empty(),
            Operation::Count(Count { input })
            | Operation::CountGroups(CountGroups { input, .. })
            | Operation::Limit(Limit { input, .. })
            | Operation::ToSet(ToSet { input })
            | Operation::ToEntitySeeds(ToEntitySeeds { input })
            | Operation::DiscardOutput(DiscardOutput { input })
            | Operation::ExportToSet(ExportToSet { input, .. })
            | Operation::ToArray(ToArray { input }) => !input.is_empty(),
            Operation::GetAllElements(_) | Operation::GetSetExport(_) | Operation::SplitStore(_) => {
                false
            }
            Operation::Custom(op) => op.has_input(),
        }
    }

    /// Hand the previous operation's output to this one.
    pub fn set_input(&mut self, output: Output) -> Result<(), TrellisError> {
        match self {
            Operation::AddElements(op) => op.input = output.into_elements()?,
            Operation::Validate(op) => op.input = output.into_elements()?,
            Operation::GetElements(op) => op.input = output.into_ids()?,
            Operation::GetAdjacentIds(op) => {
                op.input = output
                    .into_ids()?
                    .into_iter()
                    .map(|id| match id {
                        ElementId::Entity(entity) => Ok(entity),
                        ElementId::Edge(edge) => Err(TrellisError::Execution(format!(
                            "GetAdjacentIds cannot take edge seed {}",
                            edge
                        ))),
                    })
                    .collect::<Result<_, _>>()?;
            }
            Operation::Count(Count { input })
            | Operation::CountGroups(CountGroups { input, .. })
            | Operation::Limit(Limit { input, .. })
            | Operation::ToSet(ToSet { input })
            | Operation::ToEntitySeeds(ToEntitySeeds { input })
            | Operation::DiscardOutput(DiscardOutput { input })
            | Operation::ExportToSet(ExportToSet { input, .. })
            | Operation::ToArray(ToArray { input }) => *input = output,
            Operation::GetAllElements(_) | Operation::GetSetExport(_) | Operation::SplitStore(_) => {}
            Operation::Custom(op) => op.set_input(output)?,
        }
        Ok(())
    }

    /// Release the held input.
    pub fn close(&mut self) {
        match self {
            Operation::AddElements(op) => op.input = Vec::new(),
            Operation::Validate(op) => op.input = Vec::new(),
            Operation::GetElements(op) => op.input = Vec::new(),
            Operation::GetAdjacentIds(op) => op.input = Vec::new(),
            Operation::Count(Count { input })
            | Operation::CountGroups(CountGroups { input, .. })
            | Operation::Limit(Limit { input, .. })
            | Operation::ToSet(ToSet { input })
            | Operation::ToEntitySeeds(ToEntitySeeds { input })
            | Operation::DiscardOutput(DiscardOutput { input })
            | Operation::ExportToSet(ExportToSet { input, .. })
            | Operation::ToArray(ToArray { input }) => *input = Output::Empty,
            Operation::GetAllElements(_) | Operation::GetSetExport(_) | Operation::SplitStore(_) => {}
            Operation::Custom(op) => op.close(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().name())
    }
}

macro_rules! impl_from_operation {
    ($($name:ident),* $(,)?) => {
        $(
            impl From<$name> for Operation {
                fn from(op: $name) -> Self {
                    Operation::$name(op)
                }
            }
        )*
    };
}

impl_from_operation!(
    AddElements,
    GetElements,
    GetAllElements,
    GetAdjacentIds,
    Validate,
    Count,
    CountGroups,
    Limit,
    ToSet,
    ToEntitySeeds,
    DiscardOutput,
    SplitStore,
    ExportToSet,
    GetSetExport,
    ToArray,
);

impl From<Box<dyn CustomOperation>> for Operation {
    fn from(op: Box<dyn CustomOperation>) -> Self {
        Operation::Custom(op)
    }
}

// =============================================================================
// TESTS
// =============================================================================
