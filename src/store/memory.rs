// In-memory WorkflowStore with watch notifications

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::runtime::watcher::Event;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::{WatchStream, WorkflowStore};
use crate::api::{Workflow, WorkflowRef, DEFAULT_NAMESPACE};
use crate::error::StoreError;

const WATCH_CAPACITY: usize = 256;

type Objects = Arc<RwLock<BTreeMap<(String, String), Workflow>>>;

fn slot(key: &WorkflowRef) -> (String, String) {
    (
        key.namespace
            .clone()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        key.name.clone(),
    )
}

fn resource_version(workflow: &Workflow) -> String {
    workflow.metadata.resource_version.clone().unwrap_or_default()
}

fn bump(workflow: &mut Workflow) {
    let next = workflow
        .metadata
        .resource_version
        .as_deref()
        .and_then(|rv| rv.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    workflow.metadata.resource_version = Some(next.to_string());
}

#[derive(Debug)]
pub struct MemoryStore {
    objects: Objects,
    events: broadcast::Sender<Event<Workflow>>,
    status_writes: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            events,
            status_writes: AtomicU64::new(0),
        }
    }

    /// Number of successful `update_status` calls
    pub fn status_writes(&self) -> u64 {
        self.status_writes.load(Ordering::Relaxed)
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<(String, String), Workflow>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<(String, String), Workflow>> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: Event<Workflow>) {
        // No receivers is fine; nobody is watching yet
        let _ = self.events.send(event);
    }

    fn check_version(stored: &Workflow, incoming: &Workflow) -> Result<(), StoreError> {
        if stored.metadata.resource_version != incoming.metadata.resource_version {
            return Err(StoreError::Conflict {
                key: incoming.key(),
                resource_version: resource_version(incoming),
            });
        }
        Ok(())
    }
}

/// Init, one InitApply per stored object, InitDone
fn relist(objects: &Objects) -> Vec<Event<Workflow>> {
    let objects = objects.read().unwrap_or_else(PoisonError::into_inner);
    let mut events = Vec::with_capacity(objects.len() + 2);
    events.push(Event::Init);
    events.extend(objects.values().cloned().map(Event::InitApply));
    events.push(Event::InitDone);
    events
}

struct WatchState {
    events: broadcast::Receiver<Event<Workflow>>,
    objects: Objects,
    relist: bool,
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn get(&self, key: &WorkflowRef) -> Result<Workflow, StoreError> {
        self.read()
            .get(&slot(key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn list(&self) -> Result<Vec<Workflow>, StoreError> {
        Ok(self.read().values().cloned().collect())
    }

    async fn create(&self, mut workflow: Workflow) -> Result<Workflow, StoreError> {
        if workflow.metadata.namespace.is_none() {
            workflow.metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
        }
        let key = workflow.key();
        {
            let mut objects = self.write();
            if objects.contains_key(&slot(&key)) {
                return Err(StoreError::AlreadyExists(key));
            }

            workflow.metadata.resource_version = Some("1".to_string());
            workflow.metadata.creation_timestamp = Some(Time(Utc::now()));
            workflow.metadata.deletion_timestamp = None;
            objects.insert(slot(&key), workflow.clone());
        }

        debug!(workflow = %key, "workflow created");
        self.notify(Event::Apply(workflow.clone()));
        Ok(workflow)
    }

    async fn update(&self, workflow: Workflow) -> Result<Workflow, StoreError> {
        let key = workflow.key();
        let (updated, event) = {
            let mut objects = self.write();
            let stored = objects
                .get_mut(&slot(&key))
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;
            Self::check_version(stored, &workflow)?;

            stored.spec = workflow.spec;
            stored.status = workflow.status;
            stored.metadata.finalizers = workflow.metadata.finalizers;
            bump(stored);

            // Dropping the last finalizer of a deleting object completes the delete
            let finished = stored.is_deleting()
                && stored.metadata.finalizers.as_ref().map_or(true, Vec::is_empty);
            if finished {
                let removed = objects
                    .remove(&slot(&key))
                    .ok_or_else(|| StoreError::NotFound(key.clone()))?;
                (removed.clone(), Event::Delete(removed))
            } else {
                (stored.clone(), Event::Apply(stored.clone()))
            }
        };

        self.notify(event);
        Ok(updated)
    }

    async fn update_status(&self, workflow: Workflow) -> Result<Workflow, StoreError> {
        let key = workflow.key();
        let updated = {
            let mut objects = self.write();
            let stored = objects
                .get_mut(&slot(&key))
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;
            Self::check_version(stored, &workflow)?;

            stored.status = workflow.status;
            bump(stored);
            stored.clone()
        };

        self.status_writes.fetch_add(1, Ordering::Relaxed);
        debug!(
            workflow = %key,
            resource_version = %resource_version(&updated),
            "workflow status updated"
        );
        self.notify(Event::Apply(updated.clone()));
        Ok(updated)
    }

    async fn delete(&self, key: &WorkflowRef) -> Result<(), StoreError> {
        let event = {
            let mut objects = self.write();
            let stored = objects
                .get_mut(&slot(key))
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;

            let has_finalizers = stored
                .metadata
                .finalizers
                .as_ref()
                .is_some_and(|f| !f.is_empty());
            if has_finalizers {
                if stored.is_deleting() {
                    return Ok(());
                }
                stored.metadata.deletion_timestamp = Some(Time(Utc::now()));
                bump(stored);
                Event::Apply(stored.clone())
            } else {
                let removed = objects
                    .remove(&slot(key))
                    .ok_or_else(|| StoreError::NotFound(key.clone()))?;
                debug!(workflow = %key, "workflow deleted");
                Event::Delete(removed)
            }
        };

        self.notify(event);
        Ok(())
    }

    fn watch(&self) -> WatchStream {
        let state = WatchState {
            events: self.events.subscribe(),
            objects: Arc::clone(&self.objects),
            relist: true,
        };

        stream::unfold(state, |mut state| async move {
            let batch = if state.relist {
                state.relist = false;
                relist(&state.objects)
            } else {
                match state.events.recv().await {
                    Ok(event) => vec![event],
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Workflow watch lagged, relisting");
                        relist(&state.objects)
                    }
                    Err(RecvError::Closed) => return None,
                }
            };
            Some((batch, state))
        })
        .flat_map(|batch| stream::iter(batch.into_iter().map(Ok)))
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{WorkflowSpec, WorkflowState, WorkflowStatus};

    fn workflow(name: &str) -> Workflow {
        Workflow::namespaced(
            "default",
            name,
            WorkflowSpec {
                desired_state: WorkflowState::Proposal,
                dw_directives: vec!["#DW Proposal action=complete".to_string()],
                ..Default::default()
            },
        )
    }

    fn key(name: &str) -> WorkflowRef {
        WorkflowRef::new(name).within("default")
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        let created = store.create(workflow("wf-a")).await.unwrap();
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));
        assert!(created.metadata.creation_timestamp.is_some());

        let fetched = store.get(&created.key()).await.unwrap();
        assert_eq!(fetched, created);

        let err = store.create(workflow("wf-a")).await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyExists(created.key()));
    }

    #[tokio::test]
    async fn test_create_defaults_namespace() {
        let store = MemoryStore::new();
        let created = store
            .create(Workflow::new("bare", WorkflowSpec::default()))
            .await
            .unwrap();
        assert_eq!(created.metadata.namespace.as_deref(), Some("default"));
        assert!(store.get(&key("bare")).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryStore::new();
        let err = store.get(&key("nope")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = MemoryStore::new();
        let created = store.create(workflow("wf-b")).await.unwrap();

        let mut first = created.clone();
        first.status = Some(WorkflowStatus {
            ready: true,
            ..Default::default()
        });
        let updated = store.update_status(first).await.unwrap();
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("2"));
        assert_eq!(store.status_writes(), 1);

        let mut stale = created;
        stale.status = Some(WorkflowStatus {
            message: "late".to_string(),
            ..Default::default()
        });
        let err = store.update_status(stale).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict {
                key: key("wf-b"),
                resource_version: "1".to_string(),
            }
        );
        assert_eq!(store.status_writes(), 1);
    }

    #[tokio::test]
    async fn test_update_status_leaves_spec_alone() {
        let store = MemoryStore::new();
        let created = store.create(workflow("wf-c")).await.unwrap();

        let mut changed = created.clone();
        changed.spec.dw_directives.clear();
        changed.status = Some(WorkflowStatus {
            message: "hello".to_string(),
            ..Default::default()
        });
        let updated = store.update_status(changed).await.unwrap();

        assert_eq!(updated.spec, created.spec);
        assert_eq!(updated.status.unwrap().message, "hello");
    }

    #[tokio::test]
    async fn test_delete_without_finalizers_removes() {
        let store = MemoryStore::new();
        let created = store.create(workflow("wf-d")).await.unwrap();
        store.delete(&created.key()).await.unwrap();
        assert!(store.get(&created.key()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_with_finalizers_marks_deleting() {
        let store = MemoryStore::new();
        let mut wf = workflow("wf-e");
        wf.metadata.finalizers = Some(vec!["dws/finalizer".to_string()]);
        let created = store.create(wf).await.unwrap();

        store.delete(&created.key()).await.unwrap();
        let deleting = store.get(&created.key()).await.unwrap();
        assert!(deleting.is_deleting());

        // Clearing the finalizer finishes the delete
        let mut cleared = deleting;
        cleared.metadata.finalizers = None;
        store.update(cleared).await.unwrap();
        assert!(store.get(&created.key()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_watch_lists_then_follows_changes() {
        let store = MemoryStore::new();
        let existing = store.create(workflow("wf-f")).await.unwrap();
        let mut events = store.watch();

        assert!(matches!(events.next().await, Some(Ok(Event::Init))));
        match events.next().await {
            Some(Ok(Event::InitApply(wf))) => assert_eq!(wf.key(), existing.key()),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(events.next().await, Some(Ok(Event::InitDone))));

        let mut changed = existing.clone();
        changed.status = Some(WorkflowStatus {
            ready: true,
            ..Default::default()
        });
        store.update_status(changed).await.unwrap();
        store.delete(&existing.key()).await.unwrap();

        match events.next().await {
            Some(Ok(Event::Apply(wf))) => assert!(wf.is_ready()),
            other => panic!("unexpected event {other:?}"),
        }
        match events.next().await {
            Some(Ok(Event::Delete(wf))) => assert_eq!(wf.key(), existing.key()),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
