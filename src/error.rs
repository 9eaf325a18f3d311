// Error taxonomy for the driver reconciler

use thiserror::Error;

use crate::api::WorkflowRef;
use crate::dwdparse::DirectiveError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("workflow {0} not found")]
    NotFound(WorkflowRef),
    #[error("workflow {0} already exists")]
    AlreadyExists(WorkflowRef),
    #[error("conflict writing workflow {key}: resource version {resource_version} is stale")]
    Conflict {
        key: WorkflowRef,
        resource_version: String,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not parse directive '{directive}': {source}")]
    Directive {
        directive: String,
        #[source]
        source: DirectiveError,
    },

    #[error("directive index {index} out of range ({len} directives)")]
    DirectiveIndexOutOfRange { index: usize, len: usize },

    #[error("unsupported action '{action}' in directive '{directive}'")]
    UnsupportedAction { action: String, directive: String },
}

impl DriverError {
    /// Errors that may clear without anyone touching the workflow
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::Store(StoreError::Conflict { .. })
                | DriverError::Store(StoreError::Unavailable(_))
        )
    }
}

pub type Result<T, E = DriverError> = std::result::Result<T, E>;
