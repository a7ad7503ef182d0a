use crate::operation::OperationKind;
use thiserror::Error;

/// Errors that can occur in the Trellis engine.
///
/// - No silent failures
/// - Use `Result<T, TrellisError>` for fallible operations
/// - Errors raised by hooks or stores reach the caller as the same variant
#[derive(Debug, Error)]
pub enum TrellisError {
    /// Required configuration is missing or malformed.
    #[error("Construction error: {0}")]
    Construction(String),

    /// The merged schema failed validation. Carries every reason found.
    #[error("Schema is not valid: {}", reasons.join("; "))]
    SchemaValidation { reasons: Vec<String> },

    /// No handler is registered for the operation kind.
    #[error("Operation is not supported: {0}")]
    UnsupportedOperation(OperationKind),

    /// A selection's arity does not match what its function expects.
    #[error("Arity mismatch: selection {selection:?} has {actual} keys but {function} expects {expected}")]
    ArityMismatch {
        selection: Vec<String>,
        function: String,
        expected: usize,
        actual: usize,
    },

    /// A locked component list was mutated.
    #[error("Immutable: {0} is locked")]
    Immutable(&'static str),

    /// The user lacks the operation authorisations for a chain.
    #[error("User {user_id} is not authorised to run {kind}")]
    Unauthorised { user_id: String, kind: OperationKind },

    /// An element failed schema validation.
    #[error("Invalid element: {0}")]
    InvalidElement(String),

    /// A result exceeded the configured limit and truncation was disabled.
    #[error("Limit of {0} exceeded")]
    LimitExceeded(usize),

    /// A hook or store failed while executing a chain.
    #[error("Execution error: {0}")]
    Execution(String),

    /// A store lock was poisoned by a panicking writer.
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for TrellisError {
    fn from(e: serde_json::Error) -> Self {
        TrellisError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for TrellisError {
    fn from(e: std::io::Error) -> Self {
        TrellisError::Io(e.to_string())
    }
}
