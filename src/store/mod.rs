// Typed object store for Workflow resources
//
// The reconciler only talks to the store through this trait so it can run
// against the API server, the in-memory store, or a mock.

pub mod cluster;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::runtime::watcher;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::api::{Workflow, WorkflowRef};
use crate::error::StoreError;

pub use cluster::ClusterStore;
pub use memory::MemoryStore;

/// Watch stream in the shape `kube::runtime::watcher` produces
pub type WatchStream = BoxStream<'static, Result<watcher::Event<Workflow>, watcher::Error>>;

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Fetch the latest copy of a workflow
    async fn get(&self, key: &WorkflowRef) -> Result<Workflow, StoreError>;

    async fn list(&self) -> Result<Vec<Workflow>, StoreError>;

    async fn create(&self, workflow: Workflow) -> Result<Workflow, StoreError>;

    /// Replace spec and status. Fails with `Conflict` on a stale resource version.
    async fn update(&self, workflow: Workflow) -> Result<Workflow, StoreError>;

    /// Replace only the status. Fails with `Conflict` on a stale resource version.
    async fn update_status(&self, workflow: Workflow) -> Result<Workflow, StoreError>;

    /// Remove a workflow, or mark it deleting while finalizers remain
    async fn delete(&self, key: &WorkflowRef) -> Result<(), StoreError>;

    /// Initial listing followed by changes, for the controller's reflector
    fn watch(&self) -> WatchStream;
}
