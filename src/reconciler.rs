//! Mock driver reconciler for Workflow resources.
//!
//! For every driver status entry owned by this driver and watching the
//! workflow's desired state, the reconciler reads the `#DW` directive the
//! entry points at and reports progress the way a real driver would:
//!
//! | action     | effect                                                   |
//! |------------|----------------------------------------------------------|
//! | `complete` | entry is marked completed with a completion timestamp    |
//! | `wait`     | nothing; something outside this process completes it     |
//! | `error`    | message/error recorded, status derived from `severity`   |

use chrono::{DateTime, SubsecRound, Utc};
use kube::runtime::controller::Action;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::api::{DriverStatus, Severity, StatusCode, Workflow, WorkflowRef, WorkflowState};
use crate::dwdparse::{build_args_map, DirectiveArgs};
use crate::error::{DriverError, Result};
use crate::observability::ReconcileMetrics;
use crate::store::WorkflowStore;
use crate::updater::StatusUpdater;

/// Driver identity used when none is configured
pub const DEFAULT_DRIVER_ID: &str = "tester";

/// Outcome of applying one directive to one driver status entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Completed,
    /// Left pending for external completion
    Waiting,
    /// Error recorded; carries the resulting status
    Failed(StatusCode),
}

/// Apply a parsed directive to a driver status entry.
///
/// `complete` and `error` mutate the entry; `wait` leaves it untouched.
/// Any other action is rejected without touching the entry.
pub fn apply_directive(
    entry: &mut DriverStatus,
    directive: &str,
    args: &DirectiveArgs,
    now: DateTime<Utc>,
) -> Result<Transition> {
    match args.action() {
        Some("complete") => {
            entry.completed = true;
            entry.status = StatusCode::Completed;
            entry.complete_time = Some(now);
            Ok(Transition::Completed)
        }
        Some("wait") => Ok(Transition::Waiting),
        Some("error") => {
            let message = args.message();
            entry.message = format!("Reported error: {message}");
            // Directive tokens cannot contain spaces, so messages use underscores
            entry.error = message.replace('_', " ");

            match Severity::status_for(args.severity()) {
                Ok(status) => entry.status = status,
                Err(e) => {
                    entry.status = StatusCode::Error;
                    entry.message = format!("Internal error: {e}");
                    entry.error = e.to_string();
                }
            }
            Ok(Transition::Failed(entry.status))
        }
        other => Err(DriverError::UnsupportedAction {
            action: other.unwrap_or_default().to_string(),
            directive: directive.to_string(),
        }),
    }
}

/// Current time at the precision the status record stores
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub struct WorkflowReconciler {
    store: Arc<dyn WorkflowStore>,
    driver_id: String,
    metrics: Arc<ReconcileMetrics>,
}

impl WorkflowReconciler {
    pub fn new(store: Arc<dyn WorkflowStore>, driver_id: impl Into<String>) -> Self {
        Self::with_metrics(store, driver_id, Arc::new(ReconcileMetrics::new()))
    }

    pub fn with_metrics(
        store: Arc<dyn WorkflowStore>,
        driver_id: impl Into<String>,
        metrics: Arc<ReconcileMetrics>,
    ) -> Self {
        Self {
            store,
            driver_id: driver_id.into(),
            metrics,
        }
    }

    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    pub fn metrics(&self) -> &Arc<ReconcileMetrics> {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Reconcile one workflow.
    ///
    /// A missing workflow is not an error. Deleting, ready, and
    /// mid-transition workflows are left alone. Otherwise status changes
    /// are written back in a single update, even if a later entry failed.
    #[instrument(skip(self), fields(workflow = %key, driver_id = %self.driver_id))]
    pub async fn reconcile(&self, key: &WorkflowRef) -> Result<Action> {
        info!("Reconciling Workflow");
        self.metrics.record_reconcile();

        let mut workflow = match self.store.get(key).await {
            Ok(workflow) => workflow,
            Err(e) if e.is_not_found() => {
                debug!("Workflow no longer exists");
                return Ok(Action::await_change());
            }
            Err(e) => {
                self.metrics.record_error();
                return Err(e.into());
            }
        };

        if workflow.is_deleting() {
            debug!("Workflow is being deleted");
            self.metrics.record_skip();
            return Ok(Action::await_change());
        }

        if workflow.is_ready() {
            debug!(state = %workflow.observed_state(), "Workflow already ready");
            self.metrics.record_skip();
            return Ok(Action::await_change());
        }

        if !workflow.has_settled() {
            debug!(
                state = %workflow.observed_state(),
                desired_state = %workflow.spec.desired_state,
                "Workflow transitioning states"
            );
            self.metrics.record_skip();
            return Ok(Action::await_change());
        }

        info!(desired_state = %workflow.spec.desired_state, "Reconciling Workflow Driver Statuses");

        let updater = StatusUpdater::new(&workflow).with_metrics(Arc::clone(&self.metrics));
        let result = self.reconcile_drivers(&mut workflow);
        let result = updater
            .close_with_update(self.store.as_ref(), &workflow, result)
            .await;

        if let Err(e) = &result {
            self.metrics.record_error();
            error!(error = %e, retryable = e.is_retryable(), "Reconcile failed");
        }

        result.map(|_| Action::await_change())
    }

    fn is_actionable(&self, entry: &DriverStatus, desired_state: WorkflowState) -> bool {
        entry.driver_id == self.driver_id
            && entry.watch_state == desired_state
            && !entry.is_settled()
    }

    fn reconcile_drivers(&self, workflow: &mut Workflow) -> Result<()> {
        let desired_state = workflow.spec.desired_state;
        let directives = &workflow.spec.dw_directives;
        let Some(status) = workflow.status.as_mut() else {
            debug!("Workflow has no driver statuses yet");
            return Ok(());
        };
        let now = now_micros();

        for (index, entry) in status.drivers.iter_mut().enumerate() {
            if !self.is_actionable(entry, desired_state) {
                continue;
            }

            let directive = directives.get(entry.dwd_index).ok_or_else(|| {
                DriverError::DirectiveIndexOutOfRange {
                    index: entry.dwd_index,
                    len: directives.len(),
                }
            })?;

            let args = build_args_map(directive).map_err(|source| {
                error!(directive = %directive, error = %source, "Could not parse driver args from directive");
                DriverError::Directive {
                    directive: directive.clone(),
                    source,
                }
            })?;

            match apply_directive(entry, directive, &args, now)? {
                Transition::Completed => {
                    info!(entry = index, "Completing workflow driver status");
                    self.metrics.record_completed();
                }
                Transition::Waiting => {
                    info!(
                        entry = index,
                        desired_state = %desired_state,
                        "Driver waiting on external completion"
                    );
                    self.metrics.record_waiting();
                }
                Transition::Failed(code) => {
                    warn!(
                        entry = index,
                        status = %code,
                        error = %entry.error,
                        "Failing workflow driver status"
                    );
                    self.metrics.record_failed();
                }
            }
        }

        Ok(())
    }
}
