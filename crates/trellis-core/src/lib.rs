//! # trellis-core
//!
//! The execution engine for Trellis, a schema-driven graph database.
//!
//! Clients build operation chains (`GetElements`, `Limit`, `Count`, ...) and
//! hand them to a [`Graph`]. The graph runs its hooks around the chain,
//! fills in its default view, and dispatches the chain to a pluggable
//! [`Store`].
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies
//! - Deterministic: ordered collections everywhere, integer-only values
//! - Open at two seams only: [`GraphHook`] and custom operation kinds
//! - Stores dispatch through an explicit handler registry, never through
//!   runtime discovery

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod graph;
pub mod hook;
pub mod identity;
pub mod operation;
pub mod predicate;
pub mod schema;
pub mod store;
pub mod types;
pub mod view;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Edge, Element, Entity, Properties, SYSTEM_USER_ID, TrellisError, UNKNOWN_USER_ID, User, Value,
    ValueKind,
};

// =============================================================================
// RE-EXPORTS: Identity & Predicates
// =============================================================================

pub use identity::{DirectedType, EdgeId, ElementId, EntityId, MatchedVertex, Matches};
pub use predicate::{ElementFilter, ElementTransformer, Function, IdentifierType, Predicate};
pub use schema::{AggregateFunction, Schema, Serialiser, TypeDefinition};
pub use view::{View, ViewElementDefinition};

// =============================================================================
// RE-EXPORTS: Execution
// =============================================================================

pub use config::{GraphConfig, HookConfig};
pub use graph::{Graph, GraphBuilder};
pub use hook::{
    AddOperationsToChain, GraphHook, LoggingHook, OperationAuthoriser, OperationTemplate,
};
pub use operation::{
    CustomOperation, JobDetail, JobStatus, Operation, OperationChain, OperationKind,
    OperationRegistry, Output,
};
pub use store::{HandlerRegistry, MemoryContext, MemoryStore, OperationHandler, Store, StoreTrait};
