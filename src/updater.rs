// Scoped status updater
//
// Snapshots a workflow's status when created; `close_with_update` writes the
// status back at most once, and only if it differs from the snapshot.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::{Workflow, WorkflowStatus};
use crate::error::{DriverError, Result};
use crate::observability::ReconcileMetrics;
use crate::store::WorkflowStore;

#[derive(Debug)]
pub struct StatusUpdater {
    original: Option<WorkflowStatus>,
    metrics: Option<Arc<ReconcileMetrics>>,
}

impl StatusUpdater {
    pub fn new(workflow: &Workflow) -> Self {
        Self {
            original: workflow.status.clone(),
            metrics: None,
        }
    }

    /// Count persisted writes in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<ReconcileMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_changed(&self, workflow: &Workflow) -> bool {
        self.original != workflow.status
    }

    /// Persist any status change and merge the outcome with `result`.
    ///
    /// The processing error in `result` wins over a write error; partial
    /// progress is still written when processing failed.
    pub async fn close_with_update<T>(
        self,
        store: &dyn WorkflowStore,
        workflow: &Workflow,
        result: Result<T>,
    ) -> Result<T> {
        if !self.is_changed(workflow) {
            return result;
        }

        let key = workflow.key();
        match store.update_status(workflow.clone()).await {
            Ok(updated) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_status_write();
                }
                debug!(
                    workflow = %key,
                    resource_version = updated.metadata.resource_version.as_deref().unwrap_or_default(),
                    "persisted driver status changes"
                );
                result
            }
            Err(write_err) => {
                warn!(workflow = %key, error = %write_err, "failed to persist workflow status");
                match result {
                    Err(e) => Err(e),
                    Ok(_) => Err(DriverError::Store(write_err)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DriverStatus, WorkflowSpec, WorkflowState};
    use crate::error::StoreError;
    use crate::store::MockWorkflowStore;

    fn workflow() -> Workflow {
        let mut wf = Workflow::namespaced("default", "wf", WorkflowSpec::default());
        wf.status = Some(WorkflowStatus {
            drivers: vec![DriverStatus::new("tester", 0, WorkflowState::Proposal)],
            ..Default::default()
        });
        wf
    }

    fn entry(wf: &mut Workflow) -> &mut DriverStatus {
        &mut wf.status.as_mut().unwrap().drivers[0]
    }

    #[tokio::test]
    async fn test_unchanged_status_skips_write() {
        let mut store = MockWorkflowStore::new();
        store.expect_update_status().times(0);

        let wf = workflow();
        let updater = StatusUpdater::new(&wf);
        let out = updater.close_with_update(&store, &wf, Ok(7)).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn test_changed_status_writes_once() {
        let mut store = MockWorkflowStore::new();
        store
            .expect_update_status()
            .times(1)
            .withf(|wf| wf.status.as_ref().unwrap().drivers[0].completed)
            .returning(Ok);

        let metrics = Arc::new(ReconcileMetrics::new());
        let mut wf = workflow();
        let updater = StatusUpdater::new(&wf).with_metrics(metrics.clone());
        entry(&mut wf).completed = true;
        assert!(updater.is_changed(&wf));

        updater.close_with_update(&store, &wf, Ok(())).await.unwrap();
        assert_eq!(metrics.get_stats().status_writes, 1);
    }

    #[tokio::test]
    async fn test_processing_error_wins_but_progress_is_written() {
        let mut store = MockWorkflowStore::new();
        store.expect_update_status().times(1).returning(|wf| {
            Err(StoreError::Conflict {
                key: wf.key(),
                resource_version: "1".to_string(),
            })
        });

        let mut wf = workflow();
        let updater = StatusUpdater::new(&wf);
        entry(&mut wf).message = "partial".to_string();

        let processing: Result<()> = Err(DriverError::DirectiveIndexOutOfRange { index: 4, len: 1 });
        let err = updater
            .close_with_update(&store, &wf, processing)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::DirectiveIndexOutOfRange { index: 4, .. }));
    }

    #[tokio::test]
    async fn test_write_error_surfaces_when_processing_succeeded() {
        let mut store = MockWorkflowStore::new();
        store
            .expect_update_status()
            .times(1)
            .returning(|_| Err(StoreError::Unavailable("connection reset".to_string())));

        let metrics = Arc::new(ReconcileMetrics::new());
        let mut wf = workflow();
        let updater = StatusUpdater::new(&wf).with_metrics(metrics.clone());
        entry(&mut wf).completed = true;

        let err = updater.close_with_update(&store, &wf, Ok(())).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            StoreError::Unavailable("connection reset".to_string()).to_string()
        );
        // A failed write is not counted
        assert_eq!(metrics.get_stats().status_writes, 0);
    }
}
