//! # Graph Configuration
//!
//! A TOML description of a graph: its id, schema fragments, optional seed
//! data and hook list.
//!
//! ```toml
//! graph_id = "people"
//! schemas = ["schema/elements.json", "schema/types.json"]
//! data = "data.json"
//!
//! [[hooks]]
//! type = "logging"
//!
//! [[hooks]]
//! type = "add_operations"
//! path = "hooks/add_operations.json"
//!
//! [[hooks]]
//! type = "operation_authoriser"
//! auths = { AddElements = ["writer"] }
//! ```
//!
//! Relative paths resolve against the directory holding the config file.

use crate::graph::Graph;
use crate::hook::{AddOperationsToChain, GraphHook, LoggingHook, OperationAuthoriser};
use crate::operation::OperationRegistry;
use crate::schema::Schema;
use crate::store::Store;
use crate::types::{Element, TrellisError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One `[[hooks]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HookConfig {
    Logging,
    AddOperations { path: PathBuf },
    OperationAuthoriser {
        #[serde(default)]
        auths: BTreeMap<String, Vec<String>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphConfig {
    pub graph_id: String,
    #[serde(default)]
    pub schemas: Vec<PathBuf>,
    #[serde(default)]
    pub data: Option<PathBuf>,
    #[serde(default)]
    pub hooks: Vec<HookConfig>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl GraphConfig {
    /// Parse a config whose relative paths resolve against the working
    /// directory.
    pub fn from_toml(text: &str) -> Result<Self, TrellisError> {
        toml::from_str(text).map_err(|e| TrellisError::Construction(format!("Invalid graph config: {e}")))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TrellisError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TrellisError::Construction(format!("Cannot read graph config {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml(&text)?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Read every schema fragment, in listed order.
    pub fn load_schemas(&self) -> Result<Vec<Schema>, TrellisError> {
        self.schemas
            .iter()
            .map(|p| Schema::from_path(self.resolve(p)))
            .collect()
    }

    /// Read the seed elements, a JSON array. Empty without a `data` entry.
    pub fn load_data(&self) -> Result<Vec<Element>, TrellisError> {
        let Some(path) = &self.data else {
            return Ok(Vec::new());
        };
        let bytes = std::fs::read(self.resolve(path))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn build_hooks(&self, registry: &OperationRegistry) -> Result<Vec<Arc<dyn GraphHook>>, TrellisError> {
        self.hooks
            .iter()
            .map(|hook| -> Result<Arc<dyn GraphHook>, TrellisError> {
                Ok(match hook {
                    HookConfig::Logging => Arc::new(LoggingHook),
                    HookConfig::AddOperations { path } => {
                        Arc::new(AddOperationsToChain::from_path(self.resolve(path), registry)?)
                    }
                    HookConfig::OperationAuthoriser { auths } => {
                        Arc::new(OperationAuthoriser::from_names(auths, registry)?)
                    }
                })
            })
            .collect()
    }

    /// Assemble a graph over `store` using the built-in operation registry.
    pub fn build_graph(&self, store: impl Store + 'static) -> Result<Graph, TrellisError> {
        self.build_graph_with(store, &OperationRegistry::new())
    }

    /// Assemble a graph, resolving operation names in hook documents
    /// through `registry`.
    pub fn build_graph_with(
        &self,
        store: impl Store + 'static,
        registry: &OperationRegistry,
    ) -> Result<Graph, TrellisError> {
        tracing::debug!(
            "Building graph {} from {} schema fragments",
            self.graph_id,
            self.schemas.len()
        );
        Graph::builder()
            .graph_id(self.graph_id.clone())
            .add_schemas(self.load_schemas()?)
            .store(store)
            .add_hooks(self.build_hooks(registry)?)
            .build()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::fs;

    const SCHEMA: &str = r#"{
        "entities": {"person": {"vertex": "id"}},
        "edges": {"knows": {"source": "id", "destination": "id", "directed": true}},
        "types": {"id": {"class": "text"}}
    }"#;

    const HOOK: &str = r#"{"start": [{"class": "Validate"}]}"#;

    const DATA: &str = r#"[
        {"class": "Entity", "group": "person", "vertex": "alice"},
        {"class": "Edge", "group": "knows", "source": "alice", "destination": "bob", "directed": true}
    ]"#;

    fn write_fixture(dir: &Path) -> PathBuf {
        fs::create_dir_all(dir.join("schema")).expect("mkdir");
        fs::write(dir.join("schema/elements.json"), SCHEMA).expect("schema");
        fs::write(dir.join("hook.json"), HOOK).expect("hook");
        fs::write(dir.join("data.json"), DATA).expect("data");
        let config = dir.join("graph.toml");
        fs::write(
            &config,
            r#"
graph_id = "people"
schemas = ["schema/elements.json"]
data = "data.json"

[[hooks]]
type = "logging"

[[hooks]]
type = "add_operations"
path = "hook.json"

[[hooks]]
type = "operation_authoriser"
auths = { AddElements = ["writer"] }
"#,
        )
        .expect("config");
        config
    }

    #[test]
    fn parses_hook_entries() {
        let config = GraphConfig::from_toml(
            "graph_id = \"g\"\n[[hooks]]\ntype = \"add_operations\"\npath = \"a.json\"\n",
        )
        .expect("config");
        assert_eq!(
            config.hooks,
            vec![HookConfig::AddOperations {
                path: PathBuf::from("a.json")
            }]
        );
        assert!(config.schemas.is_empty());
        assert!(config.data.is_none());
    }

    #[test]
    fn rejects_unknown_fields_and_hook_types() {
        assert!(GraphConfig::from_toml("graph_id = \"g\"\nextra = 1\n").is_err());
        assert!(GraphConfig::from_toml("graph_id = \"g\"\n[[hooks]]\ntype = \"nope\"\n").is_err());
        assert!(GraphConfig::from_toml("schemas = []\n").is_err());
    }

    #[test]
    fn builds_graph_relative_to_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = GraphConfig::from_path(write_fixture(dir.path())).expect("config");

        let graph = config.build_graph(MemoryStore::new()).expect("graph");
        assert_eq!(graph.graph_id(), "people");
        assert_eq!(graph.hooks().len(), 3);
        assert_eq!(graph.schema().entity_groups().collect::<Vec<_>>(), vec!["person"]);

        let data = config.load_data().expect("data");
        assert_eq!(data.len(), 2);
        assert!(data[0].is_entity());
        assert!(data[1].is_edge());
    }

    #[test]
    fn missing_files_fail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = GraphConfig::from_path(write_fixture(dir.path())).expect("config");
        fs::remove_file(dir.path().join("hook.json")).expect("rm");
        assert!(config.build_graph(MemoryStore::new()).is_err());

        assert!(GraphConfig::from_path(dir.path().join("absent.toml")).is_err());
    }
}
