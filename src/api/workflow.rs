// Workflow custom resource: desired spec and observed status

use chrono::{DateTime, Utc};
use kube::runtime::reflector::ObjectRef;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::status::StatusCode;

/// Namespace assumed for workflows that do not name one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Store and controller key for a workflow
pub type WorkflowRef = ObjectRef<Workflow>;

/// Lifecycle stages a workflow moves through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum WorkflowState {
    #[default]
    Proposal,
    Setup,
    DataIn,
    PreRun,
    PostRun,
    DataOut,
    Teardown,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Proposal => "Proposal",
            WorkflowState::Setup => "Setup",
            WorkflowState::DataIn => "DataIn",
            WorkflowState::PreRun => "PreRun",
            WorkflowState::PostRun => "PostRun",
            WorkflowState::DataOut => "DataOut",
            WorkflowState::Teardown => "Teardown",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Proposal" => Ok(WorkflowState::Proposal),
            "Setup" => Ok(WorkflowState::Setup),
            "DataIn" => Ok(WorkflowState::DataIn),
            "PreRun" => Ok(WorkflowState::PreRun),
            "PostRun" => Ok(WorkflowState::PostRun),
            "DataOut" => Ok(WorkflowState::DataOut),
            "Teardown" => Ok(WorkflowState::Teardown),
            other => Err(format!("unknown workflow state '{other}'")),
        }
    }
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dws.cray.hpe.com",
    version = "v1alpha2",
    kind = "Workflow",
    namespaced,
    status = "WorkflowStatus",
    shortname = "wfs",
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    pub desired_state: WorkflowState,
    #[serde(default, rename = "wlmID")]
    pub wlm_id: String,
    #[serde(default, rename = "jobID")]
    pub job_id: String,
    #[serde(default, rename = "userID")]
    pub user_id: u32,
    #[serde(default, rename = "groupID")]
    pub group_id: u32,
    /// One `#DW` directive per logical stage/step
    #[serde(default, rename = "dwDirectives")]
    pub dw_directives: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    #[serde(default)]
    pub state: WorkflowState,
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default)]
    pub drivers: Vec<DriverStatus>,
}

/// One entry per (driver, watched state) pair registered against a workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DriverStatus {
    #[serde(rename = "driverID")]
    pub driver_id: String,
    #[serde(default, rename = "taskID", skip_serializing_if = "String::is_empty")]
    pub task_id: String,
    /// Index into `spec.dw_directives` this entry consults
    #[serde(rename = "dwdIndex")]
    pub dwd_index: usize,
    #[serde(rename = "watchState")]
    pub watch_state: WorkflowState,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub status: StatusCode,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, rename = "completeTime", skip_serializing_if = "Option::is_none")]
    pub complete_time: Option<DateTime<Utc>>,
}

impl DriverStatus {
    /// A fresh, pending entry as the owning system registers it
    pub fn new(driver_id: impl Into<String>, dwd_index: usize, watch_state: WorkflowState) -> Self {
        Self {
            driver_id: driver_id.into(),
            dwd_index,
            watch_state,
            ..Default::default()
        }
    }

    /// Completed or errored entries are inert
    pub fn is_settled(&self) -> bool {
        self.completed || self.status == StatusCode::Error
    }
}

impl Workflow {
    pub fn namespaced(namespace: &str, name: &str, spec: WorkflowSpec) -> Self {
        let mut workflow = Workflow::new(name, spec);
        workflow.metadata.namespace = Some(namespace.to_string());
        workflow
    }

    pub fn key(&self) -> WorkflowRef {
        WorkflowRef::new(&self.name_any()).within(
            self.metadata
                .namespace
                .as_deref()
                .unwrap_or(DEFAULT_NAMESPACE),
        )
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|status| status.ready)
    }

    /// State the owning system last reported; Proposal until it reports one
    pub fn observed_state(&self) -> WorkflowState {
        self.status
            .as_ref()
            .map(|status| status.state)
            .unwrap_or_default()
    }

    /// The owning system has moved the workflow into the state it wants
    pub fn has_settled(&self) -> bool {
        self.observed_state() == self.spec.desired_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_driver_status_wire_names() {
        let entry = DriverStatus::new("tester", 2, WorkflowState::DataIn);
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value["driverID"], "tester");
        assert_eq!(value["dwdIndex"], 2);
        assert_eq!(value["watchState"], "DataIn");
        assert_eq!(value["status"], "Pending");
        assert_eq!(value["completed"], false);
        assert!(value.get("completeTime").is_none());
    }

    #[test]
    fn test_workflow_deserializes_with_defaults() {
        let json = r##"{
            "apiVersion": "dws.cray.hpe.com/v1alpha2",
            "kind": "Workflow",
            "metadata": { "name": "wf-1" },
            "spec": {
                "desiredState": "Proposal",
                "dwDirectives": ["#DW Proposal action=complete"]
            }
        }"##;
        let wf: Workflow = serde_json::from_str(json).unwrap();

        assert_eq!(wf.key(), WorkflowRef::new("wf-1").within(DEFAULT_NAMESPACE));
        assert_eq!(wf.spec.dw_directives.len(), 1);
        assert!(wf.status.is_none());
        assert_eq!(wf.observed_state(), WorkflowState::Proposal);
        assert!(!wf.is_ready());
        assert!(!wf.is_deleting());
        assert!(wf.has_settled());
    }

    #[test]
    fn test_serializes_with_type_meta() {
        let wf = Workflow::namespaced("jobs", "wf", WorkflowSpec::default());
        let value = serde_json::to_value(&wf).unwrap();

        assert_eq!(value["apiVersion"], "dws.cray.hpe.com/v1alpha2");
        assert_eq!(value["kind"], "Workflow");
        assert_eq!(value["metadata"]["namespace"], "jobs");
        assert_eq!(value["spec"]["desiredState"], "Proposal");
    }

    #[test]
    fn test_crd_names() {
        let crd = Workflow::crd();
        assert_eq!(crd.spec.group, "dws.cray.hpe.com");
        assert_eq!(crd.spec.names.kind, "Workflow");
        assert_eq!(crd.spec.names.plural, "workflows");
    }

    #[test]
    fn test_settled_entries() {
        let mut entry = DriverStatus::new("tester", 0, WorkflowState::Proposal);
        assert!(!entry.is_settled());

        entry.status = StatusCode::TransientCondition;
        assert!(!entry.is_settled());

        entry.status = StatusCode::Error;
        assert!(entry.is_settled());

        let mut done = DriverStatus::new("tester", 0, WorkflowState::Proposal);
        done.completed = true;
        assert!(done.is_settled());
    }

    #[test]
    fn test_workflow_state_parse() {
        assert_eq!("PreRun".parse::<WorkflowState>().unwrap(), WorkflowState::PreRun);
        assert!("prerun".parse::<WorkflowState>().is_err());
    }
}
