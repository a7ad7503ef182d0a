//! # Graph
//!
//! The entry point for running operation chains. A `Graph` binds a store to
//! a merged schema, a default view and an ordered list of hooks.
//!
//! Every execution follows the same pipeline:
//!
//! 1. `pre_execute` on each hook, in registration order. Hooks may rewrite
//!    the chain or reject it.
//! 2. Seeded retrievals without a view receive the graph's default view.
//! 3. The store runs the chain.
//! 4. `post_execute` on each hook, threading the result through them.
//! 5. The chain is closed.
//!
//! If any stage fails, every hook is told through `on_failure`, the chain is
//! closed, and the failing stage's error is returned unchanged.
//!
//! [`Graph::load`] is the one path around the pipeline: it writes seed
//! elements straight to the store as [`SYSTEM_USER_ID`].

use crate::hook::GraphHook;
use crate::operation::{AddElements, JobDetail, Operation, OperationChain, OperationKind, Output};
use crate::schema::Schema;
use crate::store::{Store, StoreTrait};
use crate::types::{Element, SYSTEM_USER_ID, TrellisError, User};
use crate::view::View;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// GRAPH
// =============================================================================

/// A configured graph: store, schema, default view and hooks.
pub struct Graph {
    graph_id: String,
    schema: Schema,
    view: View,
    store: Box<dyn Store>,
    hooks: Vec<Arc<dyn GraphHook>>,
}

impl Graph {
    #[must_use]
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    #[must_use]
    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    /// The merged schema the store was initialised with.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The locked view given to seeded retrievals that have none.
    #[must_use]
    pub fn view(&self) -> &View {
        &self.view
    }

    #[must_use]
    pub fn hooks(&self) -> &[Arc<dyn GraphHook>] {
        &self.hooks
    }

    #[must_use]
    pub fn traits(&self) -> BTreeSet<StoreTrait> {
        self.store.traits()
    }

    #[must_use]
    pub fn is_supported(&self, kind: &OperationKind) -> bool {
        self.store.is_supported(kind)
    }

    #[must_use]
    pub fn next_operations(&self, kind: &OperationKind) -> BTreeSet<OperationKind> {
        self.store.next_operations(kind)
    }

    #[must_use]
    pub fn supported_operations(&self) -> BTreeSet<OperationKind> {
        self.store.supported_operations()
    }

    /// Add seed elements directly to the store, bypassing hooks.
    ///
    /// Elements are validated against the schema. Returns how many were
    /// submitted.
    pub fn load(&self, elements: Vec<Element>) -> Result<usize, TrellisError> {
        let count = elements.len();
        let add = AddElements {
            input: elements,
            ..AddElements::default()
        };
        let mut chain = OperationChain::from(Operation::from(add));
        let result = self.store.execute(&mut chain, &User::new(SYSTEM_USER_ID));
        chain.close();
        result?;
        tracing::debug!("Loaded {} elements into graph {}", count, self.graph_id);
        Ok(count)
    }

    /// Run a chain and return its result.
    pub fn execute(&self, chain: OperationChain, user: &User) -> Result<Output, TrellisError> {
        self.run(chain, user, |store, chain, user| store.execute(chain, user))
    }

    /// Run a chain as a job and return its record.
    ///
    /// Post hooks see the record as `Output::Job`. A hook that replaces it
    /// with another kind of output fails the execution.
    pub fn execute_job(&self, chain: OperationChain, user: &User) -> Result<JobDetail, TrellisError> {
        let output = self.run(chain, user, |store, chain, user| {
            store.execute_job(chain, user).map(Output::Job)
        })?;
        match output {
            Output::Job(detail) => Ok(detail),
            other => Err(TrellisError::Execution(format!(
                "Hooks replaced the job detail with {}",
                other.type_name()
            ))),
        }
    }

    fn run<F>(&self, mut chain: OperationChain, user: &User, dispatch: F) -> Result<Output, TrellisError>
    where
        F: FnOnce(&dyn Store, &mut OperationChain, &User) -> Result<Output, TrellisError>,
    {
        match self.pipeline(&mut chain, user, dispatch) {
            Ok(result) => {
                chain.close();
                Ok(result)
            }
            Err(error) => {
                tracing::debug!("Chain failed on graph {}: {}", self.graph_id, error);
                for hook in &self.hooks {
                    if let Err(hook_error) = hook.on_failure(None, &chain, user, &error) {
                        tracing::warn!("Hook {:?} failed while handling an error: {}", hook, hook_error);
                    }
                }
                chain.close();
                Err(error)
            }
        }
    }

    fn pipeline<F>(&self, chain: &mut OperationChain, user: &User, dispatch: F) -> Result<Output, TrellisError>
    where
        F: FnOnce(&dyn Store, &mut OperationChain, &User) -> Result<Output, TrellisError>,
    {
        for hook in &self.hooks {
            hook.pre_execute(chain, user)?;
        }
        self.apply_default_view(chain);

        tracing::debug!("Dispatching {} to graph {}", chain, self.graph_id);
        let mut result = dispatch(self.store.as_ref(), chain, user)?;

        for hook in &self.hooks {
            result = hook.post_execute(result, chain, user)?;
        }
        Ok(result)
    }

    fn apply_default_view(&self, chain: &mut OperationChain) {
        for op in chain.operations_mut() {
            if op.is_seeded_retrieval() && op.view().is_none() {
                op.set_view(self.view.clone());
            }
        }
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("graph_id", &self.graph_id)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Assembles a [`Graph`].
///
/// Schema fragments are merged in the order they were added. Without any
/// fragments the store's own schema is used.
#[derive(Default)]
pub struct GraphBuilder {
    graph_id: Option<String>,
    schemas: Vec<Schema>,
    store: Option<Box<dyn Store>>,
    hooks: Vec<Arc<dyn GraphHook>>,
    view: Option<View>,
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn graph_id(mut self, graph_id: impl Into<String>) -> Self {
        self.graph_id = Some(graph_id.into());
        self
    }

    #[must_use]
    pub fn add_schema(mut self, schema: Schema) -> Self {
        self.schemas.push(schema);
        self
    }

    #[must_use]
    pub fn add_schemas(mut self, schemas: impl IntoIterator<Item = Schema>) -> Self {
        self.schemas.extend(schemas);
        self
    }

    #[must_use]
    pub fn store(mut self, store: impl Store + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    #[must_use]
    pub fn boxed_store(mut self, store: Box<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Append a hook. Hooks run in the order they are added.
    #[must_use]
    pub fn add_hook(self, hook: impl GraphHook + 'static) -> Self {
        self.add_shared_hook(Arc::new(hook))
    }

    #[must_use]
    pub fn add_shared_hook(mut self, hook: Arc<dyn GraphHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    #[must_use]
    pub fn add_hooks(mut self, hooks: impl IntoIterator<Item = Arc<dyn GraphHook>>) -> Self {
        self.hooks.extend(hooks);
        self
    }

    /// Replace the default view derived from the schema.
    #[must_use]
    pub fn view(mut self, view: View) -> Self {
        self.view = Some(view);
        self
    }

    pub fn build(self) -> Result<Graph, TrellisError> {
        let graph_id = self
            .graph_id
            .ok_or_else(|| TrellisError::Construction("A graphId is required".to_string()))?;
        validate_graph_id(&graph_id)?;

        let mut store = self
            .store
            .ok_or_else(|| TrellisError::Construction("A store is required".to_string()))?;

        let schema = if self.schemas.is_empty() {
            let schema = store.schema().cloned().ok_or_else(|| TrellisError::SchemaValidation {
                reasons: vec!["Schema is missing".to_string()],
            })?;
            schema.validate()?;
            schema
        } else {
            Schema::merge(self.schemas)?
        };

        store.initialise(&graph_id, schema.clone())?;

        let mut view = self.view.unwrap_or_else(|| View::from_schema(&schema));
        view.lock();

        tracing::debug!(
            "Built graph {} with {} hooks",
            graph_id,
            self.hooks.len()
        );

        Ok(Graph {
            graph_id,
            schema,
            view,
            store,
            hooks: self.hooks,
        })
    }
}

impl fmt::Debug for GraphBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphBuilder")
            .field("graph_id", &self.graph_id)
            .field("schemas", &self.schemas.len())
            .field("has_store", &self.store.is_some())
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Graph ids are non-empty and made of ASCII letters, digits and `_`.
pub fn validate_graph_id(graph_id: &str) -> Result<(), TrellisError> {
    if !graph_id.is_empty() && graph_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(TrellisError::Construction(format!(
            "graphId is invalid: {graph_id:?}, it must match [a-zA-Z0-9_]+"
        )))
    }
}

// =============================================================================
// TESTS
// =============================================================================
