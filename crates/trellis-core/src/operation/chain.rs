use super::{Operation, OperationKind};
use std::fmt;

/// An ordered, owned sequence of operations executed as one unit.
///
/// Closing releases every operation's input. `close` runs the release at
/// most once; a chain dropped without being closed is closed on drop.
#[derive(Debug, Default)]
pub struct OperationChain {
    operations: Vec<Operation>,
    closed: bool,
}

impl OperationChain {
    #[must_use]
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            operations,
            closed: false,
        }
    }

    /// Start a chain with its first operation.
    #[must_use]
    pub fn first(operation: impl Into<Operation>) -> OperationChainBuilder {
        OperationChainBuilder {
            operations: vec![operation.into()],
        }
    }

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn operations_mut(&mut self) -> &mut Vec<Operation> {
        &mut self.operations
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<OperationKind> {
        self.operations.iter().map(Operation::kind).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Release every operation's input. Returns false if already closed.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.operations.iter_mut().for_each(Operation::close);
        true
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Clone for OperationChain {
    /// A clone is a fresh, open chain.
    fn clone(&self) -> Self {
        Self::new(self.operations.clone())
    }
}

impl Drop for OperationChain {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Display for OperationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OperationChain[")?;
        for (i, op) in self.operations.iter().enumerate() {
            if i > 0 {
                f.write_str("->")?;
            }
            write!(f, "{}", op)?;
        }
        f.write_str("]")
    }
}

impl From<Operation> for OperationChain {
    fn from(operation: Operation) -> Self {
        Self::new(vec![operation])
    }
}

/// Builds an [`OperationChain`] from `first(..).then(..)`.
#[derive(Debug)]
pub struct OperationChainBuilder {
    operations: Vec<Operation>,
}

impl OperationChainBuilder {
    #[must_use]
    pub fn then(mut self, operation: impl Into<Operation>) -> Self {
        self.operations.push(operation.into());
        self
    }

    #[must_use]
    pub fn build(self) -> OperationChain {
        OperationChain::new(self.operations)
    }
}
