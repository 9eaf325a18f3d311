// DWS test driver library - mock driver reconciler for Workflow resources
// This exposes the core components for testing and integration

pub mod api;
pub mod cli;
pub mod config;
pub mod controller;
pub mod dwdparse;
pub mod error;
pub mod observability;
pub mod reconciler;
pub mod shutdown;
pub mod store;
pub mod telemetry;
pub mod updater;

// Re-export key types for easy access
pub use api::{
    DriverStatus, Severity, StatusCode, Workflow, WorkflowRef, WorkflowSpec, WorkflowState,
    WorkflowStatus,
};
pub use config::{ControllerConfig, DriverConfig};
pub use controller::{error_policy, reconcile, Context, Controller};
pub use dwdparse::{build_args_map, DirectiveArgs, DirectiveError};
pub use error::{DriverError, StoreError};
pub use observability::{ReconcileMetrics, ReconcileStats};
pub use reconciler::{apply_directive, Transition, WorkflowReconciler, DEFAULT_DRIVER_ID};
pub use shutdown::ShutdownCoordinator;
pub use store::{ClusterStore, MemoryStore, WorkflowStore};
pub use telemetry::{init_telemetry, shutdown_telemetry};
pub use updater::StatusUpdater;
