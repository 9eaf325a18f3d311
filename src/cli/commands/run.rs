use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::DriverConfig;
use crate::controller::Controller;
use crate::observability::OperationTimer;
use crate::reconciler::WorkflowReconciler;
use crate::shutdown::ShutdownCoordinator;
use crate::store::{ClusterStore, WorkflowStore};

use super::{load_workflows, print_json, seeded_store};

/// Run the controller until interrupted. A workflows file selects the
/// in-memory store, otherwise the driver watches the cluster.
pub async fn run(config: &DriverConfig, workflows: Option<&Path>) -> Result<()> {
    let offline = match workflows {
        Some(path) => Some(seeded_store(load_workflows(path)?).await?),
        None => None,
    };
    let store: Arc<dyn WorkflowStore> = match &offline {
        Some(store) => store.clone(),
        None => {
            info!("No workflows file given, watching the cluster");
            Arc::new(ClusterStore::try_default().await?)
        }
    };

    let reconciler = Arc::new(WorkflowReconciler::new(store, &config.driver.driver_id));
    let controller = Controller::new(reconciler.clone(), config.controller.clone());

    let shutdown = ShutdownCoordinator::new();
    shutdown.install_signal_handlers();
    let timer = OperationTimer::new("controller_run");
    controller.run(shutdown.signal()).await;
    drop(timer);

    if config.observability.metrics_enabled {
        reconciler.metrics().log_stats();
    }
    match offline {
        Some(store) => print_json(&store.list().await?),
        None => Ok(()),
    }
}
