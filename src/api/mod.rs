// Typed resource model for the Workflow resource and its driver status entries

pub mod status;
pub mod workflow;

pub use status::{Severity, SeverityError, StatusCode};
pub use workflow::{
    DriverStatus, Workflow, WorkflowRef, WorkflowSpec, WorkflowState, WorkflowStatus,
    DEFAULT_NAMESPACE,
};
