//! # Store
//!
//! The contract a storage back end satisfies for the graph layer, and the
//! handler registry back ends use to dispatch operations.
//!
//! Handler resolution is explicit: the operation's own kind first, then
//! each of its declared supertypes in order. Nothing is discovered at
//! runtime beyond what was registered at setup.

mod memory;

pub use memory::{MemoryContext, MemoryStore, MemoryStoreState};

use crate::operation::{JobDetail, Operation, OperationChain, OperationKind, Output};
use crate::schema::Schema;
use crate::types::{TrellisError, User};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

// =============================================================================
// STORE TRAITS
// =============================================================================

/// Capabilities a store advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreTrait {
    PreAggregationFiltering,
    PostAggregationFiltering,
    Transformation,
    StoreAggregation,
    Ordered,
    Visibility,
}

// =============================================================================
// STORE
// =============================================================================

/// A storage back end.
pub trait Store: Send + Sync {
    /// Bind the store to a graph and its merged schema.
    fn initialise(&mut self, graph_id: &str, schema: Schema) -> Result<(), TrellisError>;

    /// Run a chain to completion.
    fn execute(&self, chain: &mut OperationChain, user: &User) -> Result<Output, TrellisError>;

    /// Run a chain as a job and return its record.
    fn execute_job(&self, chain: &mut OperationChain, user: &User) -> Result<JobDetail, TrellisError>;

    /// The store's schema, if it has one yet.
    fn schema(&self) -> Option<&Schema>;

    fn traits(&self) -> BTreeSet<StoreTrait>;

    fn is_supported(&self, kind: &OperationKind) -> bool;

    /// Kinds that can follow `kind` in a chain.
    fn next_operations(&self, kind: &OperationKind) -> BTreeSet<OperationKind>;

    fn supported_operations(&self) -> BTreeSet<OperationKind>;
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Runs one operation against a store's state `S`.
pub trait OperationHandler<S: ?Sized>: Send + Sync {
    fn handle(&self, operation: &mut Operation, state: &S, user: &User) -> Result<Output, TrellisError>;
}

impl<S, F> OperationHandler<S> for F
where
    S: ?Sized,
    F: Fn(&mut Operation, &S, &User) -> Result<Output, TrellisError> + Send + Sync,
{
    fn handle(&self, operation: &mut Operation, state: &S, user: &User) -> Result<Output, TrellisError> {
        self(operation, state, user)
    }
}

/// Kind → handler table, filled once when a store is set up.
pub struct HandlerRegistry<S: ?Sized> {
    handlers: BTreeMap<OperationKind, Arc<dyn OperationHandler<S>>>,
}

impl<S: ?Sized> Default for HandlerRegistry<S> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }
}

impl<S: ?Sized> Clone for HandlerRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<S: ?Sized> HandlerRegistry<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the handler for `kind`.
    pub fn register<H>(&mut self, kind: OperationKind, handler: H)
    where
        H: OperationHandler<S> + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
    }

    pub fn remove(&mut self, kind: &OperationKind) -> bool {
        self.handlers.remove(kind).is_some()
    }

    #[must_use]
    pub fn is_supported(&self, kind: &OperationKind) -> bool {
        self.handlers.contains_key(kind)
    }

    #[must_use]
    pub fn supported(&self) -> BTreeSet<OperationKind> {
        self.handlers.keys().cloned().collect()
    }

    /// The handler for an operation: its own kind, else the first
    /// registered supertype.
    pub fn resolve(&self, operation: &Operation) -> Result<Arc<dyn OperationHandler<S>>, TrellisError> {
        let kind = operation.kind();
        if let Some(handler) = self.handlers.get(&kind) {
            return Ok(Arc::clone(handler));
        }
        operation
            .supertypes()
            .iter()
            .find_map(|supertype| self.handlers.get(supertype))
            .map(Arc::clone)
            .ok_or(TrellisError::UnsupportedOperation(kind))
    }
}

impl<S: ?Sized> fmt::Debug for HandlerRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Count, CustomOperation, GetElements};

    #[derive(Debug, Clone)]
    struct Special {
        supertypes: Vec<OperationKind>,
    }

    impl CustomOperation for Special {
        fn kind_name(&self) -> &str {
            "Special"
        }

        fn supertypes(&self) -> Vec<OperationKind> {
            self.supertypes.clone()
        }

        fn clone_box(&self) -> Box<dyn CustomOperation> {
            Box::new(self.clone())
        }
    }

    fn special(supertypes: Vec<OperationKind>) -> Operation {
        Operation::Custom(Box::new(Special { supertypes }))
    }

    fn registry() -> HandlerRegistry<()> {
        let mut registry = HandlerRegistry::new();
        registry.register(OperationKind::Count, |_: &mut Operation, _: &(), _: &User| -> Result<Output, TrellisError> {
            Ok(Output::Count(1))
        });
        registry.register(OperationKind::GetElements, |_: &mut Operation, _: &(), _: &User| -> Result<Output, TrellisError> {
            Ok(Output::Count(2))
        });
        registry
    }

    fn run(registry: &HandlerRegistry<()>, mut op: Operation) -> Result<Output, TrellisError> {
        registry.resolve(&op)?.handle(&mut op, &(), &User::default())
    }

    #[test]
    fn exact_kind_wins() {
        let out = run(&registry(), Operation::from(Count::default())).expect("run");
        assert_eq!(out, Output::Count(1));
    }

    #[test]
    fn supertypes_are_tried_in_order() {
        let op = special(vec![
            OperationKind::Limit,
            OperationKind::GetElements,
            OperationKind::Count,
        ]);
        assert_eq!(run(&registry(), op).expect("run"), Output::Count(2));
    }

    #[test]
    fn own_handler_beats_supertypes() {
        let mut registry = registry();
        registry.register(
            OperationKind::Custom("Special".to_string()),
            |_: &mut Operation, _: &(), _: &User| -> Result<Output, TrellisError> {
                Ok(Output::Count(3))
            },
        );
        let op = special(vec![OperationKind::Count]);
        assert_eq!(run(&registry, op).expect("run"), Output::Count(3));
    }

    #[test]
    fn no_match_is_unsupported() {
        let result = run(&registry(), special(vec![OperationKind::Limit]));
        assert!(matches!(
            result,
            Err(TrellisError::UnsupportedOperation(OperationKind::Custom(ref name))) if name == "Special"
        ));
        assert!(run(&registry(), Operation::from(GetElements::default())).is_ok());
    }

    #[test]
    fn supported_lists_registered_kinds() {
        let mut registry = registry();
        assert!(registry.is_supported(&OperationKind::Count));
        assert!(registry.remove(&OperationKind::Count));
        assert_eq!(
            registry.supported(),
            BTreeSet::from([OperationKind::GetElements])
        );
    }
}
