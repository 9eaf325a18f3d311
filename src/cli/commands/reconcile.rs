use anyhow::Result;
use std::path::Path;
use tracing::error;

use crate::config::DriverConfig;
use crate::observability::OperationTimer;
use crate::reconciler::WorkflowReconciler;
use crate::store::WorkflowStore;

use super::{load_workflows, print_json, seeded_store};

/// One reconcile pass per workflow, no control loop
pub async fn reconcile(config: &DriverConfig, workflows: &Path) -> Result<()> {
    let workflows = load_workflows(workflows)?;
    let keys: Vec<_> = workflows.iter().map(|wf| wf.key()).collect();
    let store = seeded_store(workflows).await?;
    let reconciler = WorkflowReconciler::new(store.clone(), &config.driver.driver_id);

    let timer = OperationTimer::new("reconcile_pass");
    let mut failed = 0usize;
    for key in &keys {
        if let Err(e) = reconciler.reconcile(key).await {
            error!(workflow = %key, error = %e, "Reconcile failed");
            failed += 1;
        }
    }

    drop(timer);
    print_json(&store.list().await?)?;

    if config.observability.metrics_enabled {
        reconciler.metrics().log_stats();
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} workflows failed to reconcile", keys.len());
    }
    Ok(())
}
