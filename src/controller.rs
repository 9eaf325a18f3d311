//! Workflow controller built on `kube::runtime::Controller`.
//!
//! The store's watch stream feeds a reflector. The runtime reconciles each
//! workflow at most once at a time and reruns failed reconciles after the
//! delay `error_policy` picks, backing off exponentially per workflow.

use futures::{FutureExt, StreamExt};
use kube::runtime::controller::{self, Action};
use kube::runtime::{reflector, WatchStreamExt};
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

use crate::api::{Workflow, WorkflowRef};
use crate::config::ControllerConfig;
use crate::error::{DriverError, Result};
use crate::reconciler::WorkflowReconciler;
use crate::telemetry::{create_reconcile_span, generate_correlation_id};

/// `base * 2^(failures - 1)`, capped at `max`
pub fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .unwrap_or(max)
        .min(max)
}

/// Shared state handed to every reconcile the runtime schedules
pub struct Context {
    reconciler: Arc<WorkflowReconciler>,
    config: ControllerConfig,
    failures: Mutex<HashMap<WorkflowRef, u32>>,
}

impl Context {
    pub fn new(reconciler: Arc<WorkflowReconciler>, config: ControllerConfig) -> Self {
        Self {
            reconciler,
            config,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn failures(&self) -> MutexGuard<'_, HashMap<WorkflowRef, u32>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub async fn reconcile(workflow: Arc<Workflow>, ctx: Arc<Context>) -> Result<Action> {
    let key = workflow.key();
    let span = create_reconcile_span(&key.name, &generate_correlation_id());
    let action = ctx.reconciler.reconcile(&key).instrument(span).await?;
    if let Some(failures) = ctx.failures().remove(&key) {
        info!(workflow = %key.name, failures, "Workflow reconciled after earlier failures");
    }
    Ok(action)
}

/// Requeue a failed workflow with exponential backoff and optional jitter
pub fn error_policy(workflow: Arc<Workflow>, error: &DriverError, ctx: Arc<Context>) -> Action {
    let key = workflow.key();
    let failures = {
        let mut failures = ctx.failures();
        let count = failures.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    };

    let mut delay = backoff_delay(ctx.config.base_delay(), ctx.config.max_delay(), failures);
    if ctx.config.jitter && !delay.is_zero() {
        let millis = delay.as_millis() as u64;
        delay = Duration::from_millis(rand::rng().random_range(millis / 2..=millis));
    }

    warn!(
        workflow = %key.name,
        namespace = key.namespace.as_deref().unwrap_or_default(),
        error = %error,
        retryable = error.is_retryable(),
        failures,
        retry_in_ms = delay.as_millis() as u64,
        "Reconcile failed, requeueing"
    );
    Action::requeue(delay)
}

pub struct Controller {
    context: Arc<Context>,
}

impl Controller {
    pub fn new(reconciler: Arc<WorkflowReconciler>, config: ControllerConfig) -> Self {
        Self {
            context: Arc::new(Context::new(reconciler, config)),
        }
    }

    /// Run until `shutdown` resolves or the store's watch stream ends.
    /// Reconciles already running when shutdown fires are allowed to finish.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) {
        let store = Arc::clone(self.context.reconciler.store());
        let (reader, writer) = reflector::store();
        let trigger = reflector(writer, store.watch()).applied_objects();

        let workers = u16::try_from(self.context.config.workers).unwrap_or(u16::MAX);
        info!(
            workers,
            driver_id = %self.context.reconciler.driver_id(),
            "Workflow controller started"
        );

        controller::Controller::for_stream(trigger, reader)
            .with_config(controller::Config::default().concurrency(workers))
            .graceful_shutdown_on(shutdown.boxed().shared())
            .run(reconcile, error_policy, Arc::clone(&self.context))
            .for_each(|result| async move {
                match result {
                    Ok((object, action)) => {
                        debug!(workflow = %object.name, ?action, "Reconciled")
                    }
                    Err(e) => warn!(error = %e, "Workflow controller error"),
                }
            })
            .await;

        info!("Workflow controller stopped");
    }
}
