//! # Graph Hooks
//!
//! Collaborators that wrap every chain execution. A graph runs each hook's
//! `pre_execute` in registration order before dispatch, then threads the
//! result through each `post_execute` in the same order.
//!
//! Hooks are shared across executions and must not keep references to a
//! chain's operations past the call that received them.

mod add_operations;
mod authoriser;
mod logging;

pub use add_operations::{AddOperationsToChain, OperationTemplate};
pub use authoriser::OperationAuthoriser;
pub use logging::LoggingHook;

use crate::operation::{OperationChain, Output};
use crate::types::{TrellisError, User};
use std::fmt;

/// A cross-cutting step around chain execution.
pub trait GraphHook: fmt::Debug + Send + Sync {
    /// Inspect or rewrite the chain. An error aborts before dispatch.
    fn pre_execute(&self, _chain: &mut OperationChain, _user: &User) -> Result<(), TrellisError> {
        Ok(())
    }

    /// Receive the previous hook's result and return the next one.
    fn post_execute(
        &self,
        result: Output,
        _chain: &OperationChain,
        _user: &User,
    ) -> Result<Output, TrellisError> {
        Ok(result)
    }

    /// Notification that execution failed with `error`.
    ///
    /// `result` is any output that survived the failure; a [`Graph`] always
    /// passes `None` since the failing stage owns the partial result. The
    /// graph still returns `error` to the caller, and an error returned from
    /// here is logged and otherwise ignored.
    ///
    /// [`Graph`]: crate::graph::Graph
    fn on_failure(
        &self,
        result: Option<Output>,
        _chain: &OperationChain,
        _user: &User,
        _error: &TrellisError,
    ) -> Result<Option<Output>, TrellisError> {
        Ok(result)
    }
}
