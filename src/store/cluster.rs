// WorkflowStore backed by the Kubernetes API server

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::debug;

use super::{WatchStream, WorkflowStore};
use crate::api::{Workflow, WorkflowRef, DEFAULT_NAMESPACE};
use crate::error::StoreError;

#[derive(Clone)]
pub struct ClusterStore {
    client: Client,
}

impl ClusterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the local kubeconfig or in-cluster service account
    pub async fn try_default() -> Result<Self, StoreError> {
        let client = Client::try_default()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::new(client))
    }

    fn api(&self, namespace: Option<&str>) -> Api<Workflow> {
        Api::namespaced(self.client.clone(), namespace.unwrap_or(DEFAULT_NAMESPACE))
    }
}

/// Map an API server error onto the store's error taxonomy
fn store_error(key: &WorkflowRef, resource_version: Option<String>, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound(key.clone()),
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            StoreError::AlreadyExists(key.clone())
        }
        kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict {
            key: key.clone(),
            resource_version: resource_version.unwrap_or_default(),
        },
        other => StoreError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl WorkflowStore for ClusterStore {
    async fn get(&self, key: &WorkflowRef) -> Result<Workflow, StoreError> {
        self.api(key.namespace.as_deref())
            .get(&key.name)
            .await
            .map_err(|e| store_error(key, None, e))
    }

    async fn list(&self) -> Result<Vec<Workflow>, StoreError> {
        let workflows = Api::<Workflow>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(workflows.items)
    }

    async fn create(&self, workflow: Workflow) -> Result<Workflow, StoreError> {
        let key = workflow.key();
        self.api(workflow.metadata.namespace.as_deref())
            .create(&PostParams::default(), &workflow)
            .await
            .map_err(|e| store_error(&key, None, e))
    }

    async fn update(&self, workflow: Workflow) -> Result<Workflow, StoreError> {
        let key = workflow.key();
        self.api(workflow.metadata.namespace.as_deref())
            .replace(&workflow.name_any(), &PostParams::default(), &workflow)
            .await
            .map_err(|e| store_error(&key, workflow.resource_version(), e))
    }

    async fn update_status(&self, workflow: Workflow) -> Result<Workflow, StoreError> {
        let key = workflow.key();
        // Carrying the resource version makes the API server reject stale writes
        let patch = json!({
            "metadata": { "resourceVersion": workflow.resource_version() },
            "status": workflow.status,
        });
        let updated = self
            .api(workflow.metadata.namespace.as_deref())
            .patch_status(&workflow.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| store_error(&key, workflow.resource_version(), e))?;
        debug!(workflow = %key, "workflow status patched");
        Ok(updated)
    }

    async fn delete(&self, key: &WorkflowRef) -> Result<(), StoreError> {
        self.api(key.namespace.as_deref())
            .delete(&key.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| store_error(key, None, e))
    }

    fn watch(&self) -> WatchStream {
        watcher(
            Api::<Workflow>::all(self.client.clone()),
            watcher::Config::default(),
        )
        .boxed()
    }
}
