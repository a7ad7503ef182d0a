//! Chain rewriting: splices configured operations around a user's chain.
//!
//! Configuration document:
//!
//! ```json
//! {
//!   "start":  [ {"class": "DiscardOutput"} ],
//!   "before": { "GetElements": [ {"class": "Validate", "auths": ["auditor"]} ] },
//!   "after":  { "GetElements": [ {"class": "Count"} ] },
//!   "end":    [ {"class": "Count"} ]
//! }
//! ```
//!
//! Every template is an operation object. An optional `auths` array limits
//! it to users holding at least one of those operation auths.

use super::GraphHook;
use crate::operation::{Operation, OperationChain, OperationKind, OperationRegistry};
use crate::types::{TrellisError, User};
use serde::Deserialize;
use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// An operation to insert, with the auths that allow it.
#[derive(Debug, Clone)]
pub struct OperationTemplate {
    pub operation: Operation,
    pub auths: BTreeSet<String>,
}

impl OperationTemplate {
    #[must_use]
    pub fn new(operation: impl Into<Operation>) -> Self {
        Self {
            operation: operation.into(),
            auths: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_auths<I, S>(mut self, auths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auths.extend(auths.into_iter().map(Into::into));
        self
    }

    fn allows(&self, user: &User) -> bool {
        user.has_any_op_auth(&self.auths)
    }

    fn parse(json: &Json, registry: &OperationRegistry) -> Result<Self, TrellisError> {
        let operation = registry.parse_operation(json)?;
        let auths = match json.get("auths") {
            None | Some(Json::Null) => BTreeSet::new(),
            Some(Json::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        TrellisError::Construction(format!(
                            "Template auths must be strings, got {}",
                            item
                        ))
                    })
                })
                .collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(TrellisError::Construction(format!(
                    "Template auths must be an array, got {}",
                    other
                )));
            }
        };
        Ok(Self { operation, auths })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    start: Vec<Json>,
    #[serde(default)]
    before: BTreeMap<String, Vec<Json>>,
    #[serde(default)]
    after: BTreeMap<String, Vec<Json>>,
    #[serde(default)]
    end: Vec<Json>,
}

/// Adds operations to the start and end of a chain, and around
/// operations of given kinds.
#[derive(Debug, Clone, Default)]
pub struct AddOperationsToChain {
    start: Vec<OperationTemplate>,
    before: BTreeMap<OperationKind, Vec<OperationTemplate>>,
    after: BTreeMap<OperationKind, Vec<OperationTemplate>>,
    end: Vec<OperationTemplate>,
}

impl AddOperationsToChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON document. Every template and key is resolved here.
    pub fn from_json(bytes: &[u8], registry: &OperationRegistry) -> Result<Self, TrellisError> {
        let raw: RawConfig = serde_json::from_slice(bytes).map_err(|e| {
            TrellisError::Construction(format!("Invalid operations document: {}", e))
        })?;

        let parse_all = |items: &[Json]| -> Result<Vec<OperationTemplate>, TrellisError> {
            items
                .iter()
                .map(|item| OperationTemplate::parse(item, registry))
                .collect()
        };
        let parse_keyed = |map: &BTreeMap<String, Vec<Json>>| {
            map.iter()
                .map(|(key, items)| Ok((registry.resolve_kind(key)?, parse_all(items)?)))
                .collect::<Result<BTreeMap<_, _>, TrellisError>>()
        };

        Ok(Self {
            start: parse_all(&raw.start)?,
            before: parse_keyed(&raw.before)?,
            after: parse_keyed(&raw.after)?,
            end: parse_all(&raw.end)?,
        })
    }

    pub fn from_path(path: impl AsRef<Path>, registry: &OperationRegistry) -> Result<Self, TrellisError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            TrellisError::Construction(format!(
                "Cannot read operations document '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&bytes, registry)
    }

    #[must_use]
    pub fn with_start(mut self, template: OperationTemplate) -> Self {
        self.start.push(template);
        self
    }

    #[must_use]
    pub fn with_before(mut self, kind: OperationKind, template: OperationTemplate) -> Self {
        self.before.entry(kind).or_default().push(template);
        self
    }

    #[must_use]
    pub fn with_after(mut self, kind: OperationKind, template: OperationTemplate) -> Self {
        self.after.entry(kind).or_default().push(template);
        self
    }

    #[must_use]
    pub fn with_end(mut self, template: OperationTemplate) -> Self {
        self.end.push(template);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.before.is_empty() && self.after.is_empty() && self.end.is_empty()
    }

    /// Rewrite `operations` for `user`.
    fn rewrite(&self, operations: Vec<Operation>, user: &User) -> Vec<Operation> {
        let mut rewritten = Vec::with_capacity(operations.len() + self.start.len() + self.end.len());
        emit(&self.start, user, &mut rewritten);
        for op in operations {
            let kind = op.kind();
            if let Some(templates) = self.before.get(&kind) {
                emit(templates, user, &mut rewritten);
            }
            rewritten.push(op);
            if let Some(templates) = self.after.get(&kind) {
                emit(templates, user, &mut rewritten);
            }
        }
        emit(&self.end, user, &mut rewritten);
        rewritten
    }
}

fn emit(templates: &[OperationTemplate], user: &User, out: &mut Vec<Operation>) {
    out.extend(
        templates
            .iter()
            .filter(|t| t.allows(user))
            .map(|t| t.operation.clone()),
    );
}

impl GraphHook for AddOperationsToChain {
    fn pre_execute(&self, chain: &mut OperationChain, user: &User) -> Result<(), TrellisError> {
        let before = chain.len();
        let operations = std::mem::take(chain.operations_mut());
        *chain.operations_mut() = self.rewrite(operations, user);
        tracing::debug!(
            "Added {} operations to chain for {}",
            chain.len() - before,
            user.user_id
        );
        Ok(())
    }
}
