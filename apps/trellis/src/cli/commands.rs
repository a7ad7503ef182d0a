//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use std::path::Path;
use trellis_core::{
    Graph, GraphConfig, JobDetail, MemoryStore, OperationChain, OperationKind, OperationRegistry,
    Output, TrellisError, User,
};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a chain document (10 MB).
const MAX_CHAIN_FILE_SIZE: u64 = 10 * 1024 * 1024;

fn validate_file_size(path: &Path, max_size: u64) -> Result<(), TrellisError> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() > max_size {
        return Err(TrellisError::Serialization(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

// =============================================================================
// GRAPH LOADING
// =============================================================================

/// Build the configured graph over a fresh memory store and load its seed
/// data. Seeding goes straight to the store, so configured hooks only see
/// the chains users submit.
pub fn load_graph(config_path: &Path) -> Result<Graph, TrellisError> {
    let config = GraphConfig::from_path(config_path)?;
    let graph = config.build_graph(MemoryStore::new())?;

    let data = config.load_data()?;
    if !data.is_empty() {
        let count = graph.load(data)?;
        tracing::info!("Loaded {} elements into {}", count, graph.graph_id());
    }

    Ok(graph)
}

/// Read and parse a chain document.
pub fn read_chain(path: &Path) -> Result<OperationChain, TrellisError> {
    validate_file_size(path, MAX_CHAIN_FILE_SIZE)?;
    let bytes = std::fs::read(path)?;
    OperationRegistry::new().parse_chain(&bytes)
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// What a `run` produced.
#[derive(Debug)]
pub enum RunResult {
    Output(Output),
    Job(JobDetail),
}

/// Load the graph and execute the chain in `chain_path`.
pub fn run_chain(
    config_path: &Path,
    chain_path: &Path,
    user: &User,
    job: bool,
) -> Result<RunResult, TrellisError> {
    let graph = load_graph(config_path)?;
    let chain = read_chain(chain_path)?;
    tracing::info!("Running {} on {}", chain, graph.graph_id());

    if job {
        graph.execute_job(chain, user).map(RunResult::Job)
    } else {
        graph.execute(chain, user).map(RunResult::Output)
    }
}

/// Execute a chain and print its result.
pub fn cmd_run(
    config_path: &Path,
    chain_path: &Path,
    user_id: &str,
    op_auths: &[String],
    job: bool,
    json_mode: bool,
) -> Result<(), TrellisError> {
    let user = User::new(user_id).with_op_auths(op_auths.iter().cloned());
    let result = run_chain(config_path, chain_path, &user, job)?;

    if json_mode {
        let json = match &result {
            RunResult::Output(output) => serde_json::to_string_pretty(output)?,
            RunResult::Job(detail) => serde_json::to_string_pretty(detail)?,
        };
        println!("{}", json);
        return Ok(());
    }

    for line in describe(&result) {
        println!("{}", line);
    }
    Ok(())
}

/// Human-readable lines for a result.
pub fn describe(result: &RunResult) -> Vec<String> {
    match result {
        RunResult::Job(detail) => vec![format!(
            "Job {} for {}: {:?}",
            detail.job_id, detail.user_id, detail.status
        )],
        RunResult::Output(Output::Empty) => vec!["(no output)".to_string()],
        RunResult::Output(Output::Elements(elements)) => {
            elements.iter().map(ToString::to_string).collect()
        }
        RunResult::Output(Output::Ids(ids)) => ids.iter().map(ToString::to_string).collect(),
        RunResult::Output(Output::Count(n)) => vec![format!("Count: {}", n)],
        RunResult::Output(Output::GroupCounts(counts)) => {
            let mut lines: Vec<String> = counts
                .entity_groups
                .iter()
                .map(|(group, n)| format!("entity {}: {}", group, n))
                .chain(
                    counts
                        .edge_groups
                        .iter()
                        .map(|(group, n)| format!("edge {}: {}", group, n)),
                )
                .collect();
            if counts.limit_hit {
                lines.push("(limit reached)".to_string());
            }
            lines
        }
        RunResult::Output(Output::Job(detail)) => vec![format!("Job {}", detail.job_id)],
    }
}

// =============================================================================
// SCHEMA COMMAND
// =============================================================================

/// Print the merged schema as JSON.
pub fn cmd_schema(config_path: &Path) -> Result<(), TrellisError> {
    let config = GraphConfig::from_path(config_path)?;
    let graph = config.build_graph(MemoryStore::new())?;
    println!("{}", graph.schema().to_json(true)?);
    Ok(())
}

// =============================================================================
// OPERATIONS COMMAND
// =============================================================================

/// Supported operation names, or the names that may follow `next`.
pub fn list_operations(graph: &Graph, next: Option<&str>) -> Result<Vec<String>, TrellisError> {
    let kinds = match next {
        Some(name) => {
            let kind = OperationRegistry::new().resolve_kind(name)?;
            graph.next_operations(&kind)
        }
        None => graph.supported_operations(),
    };
    Ok(kinds.iter().map(OperationKind::to_string).collect())
}

/// List supported operations and store traits.
pub fn cmd_operations(config_path: &Path, next: Option<&str>, json_mode: bool) -> Result<(), TrellisError> {
    let graph = GraphConfig::from_path(config_path)?.build_graph(MemoryStore::new())?;
    let names = list_operations(&graph, next)?;
    let traits = graph.traits();

    if json_mode {
        let output = serde_json::json!({
            "after": next,
            "operations": names,
            "traits": traits,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match next {
        Some(name) => println!("Operations after {}:", name),
        None => println!("Supported operations:"),
    }
    for name in &names {
        println!("  {}", name);
    }
    println!();
    println!("Store traits:");
    for t in &traits {
        println!("  {:?}", t);
    }
    Ok(())
}
