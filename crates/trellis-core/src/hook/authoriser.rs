use super::GraphHook;
use crate::operation::{OperationChain, OperationKind, OperationRegistry};
use crate::types::{TrellisError, User};
use std::collections::{BTreeMap, BTreeSet};

/// Rejects chains containing operations the user is not allowed to run.
///
/// Each kind maps to a set of op auths; a user needs at least one of them.
/// A custom operation must also pass the checks of its supertypes. Kinds
/// without an entry are open to everyone.
#[derive(Debug, Clone, Default)]
pub struct OperationAuthoriser {
    auths: BTreeMap<OperationKind, BTreeSet<String>>,
}

impl OperationAuthoriser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_auths<I, S>(mut self, kind: OperationKind, auths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auths
            .entry(kind)
            .or_default()
            .extend(auths.into_iter().map(Into::into));
        self
    }

    /// Build from class names, resolving each through the registry.
    pub fn from_names(
        names: &BTreeMap<String, Vec<String>>,
        registry: &OperationRegistry,
    ) -> Result<Self, TrellisError> {
        names.iter().try_fold(Self::new(), |acc, (name, auths)| {
            Ok(acc.with_auths(registry.resolve_kind(name)?, auths.iter().cloned()))
        })
    }

    fn check(&self, kind: &OperationKind, user: &User) -> Result<(), TrellisError> {
        match self.auths.get(kind) {
            Some(required) if !user.has_any_op_auth(required) => Err(TrellisError::Unauthorised {
                user_id: user.user_id.clone(),
                kind: kind.clone(),
            }),
            _ => Ok(()),
        }
    }
}

impl GraphHook for OperationAuthoriser {
    fn pre_execute(&self, chain: &mut OperationChain, user: &User) -> Result<(), TrellisError> {
        for op in chain.operations() {
            self.check(&op.kind(), user)?;
            for supertype in op.supertypes() {
                self.check(&supertype, user)?;
            }
        }
        Ok(())
    }
}
