use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::api::Workflow;
use crate::config::DriverConfig;
use crate::store::{MemoryStore, WorkflowStore};

use super::Commands;

pub mod parse;
pub mod reconcile;
pub mod run;

pub async fn execute(command: Commands, config: &DriverConfig) -> Result<()> {
    match command {
        Commands::Run { workflows } => run::run(config, workflows.as_deref()).await,
        Commands::Reconcile { workflows } => reconcile::reconcile(config, &workflows).await,
        Commands::Parse { directive } => parse::parse(&directive),
    }
}

/// Read a JSON array of Workflows
pub fn load_workflows(path: &Path) -> Result<Vec<Workflow>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflows from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse workflows in {}", path.display()))
}

/// In-memory store populated with the given workflows
pub async fn seeded_store(workflows: Vec<Workflow>) -> Result<Arc<MemoryStore>> {
    let store = Arc::new(MemoryStore::new());
    for workflow in workflows {
        let key = workflow.key();
        store
            .create(workflow)
            .await
            .with_context(|| format!("Failed to load workflow {key}"))?;
    }
    Ok(store)
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
