//! Control-plane traits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ControlPlaneError;
use crate::types::ExecSession;

/// Response of a task description request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDescription {
    /// Per-task failures reported by the API
    pub failures: Vec<TaskFailureInfo>,
    /// Tasks that were found
    pub tasks: Vec<TaskInfo>,
}

/// A failure entry of a task description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFailureInfo {
    pub arn: Option<String>,
    pub reason: Option<String>,
}

/// A described task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInfo {
    pub containers: Vec<ContainerInfo>,
}

/// A container of a described task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: Option<String>,
    pub runtime_id: Option<String>,
}

impl ContainerInfo {
    /// Container with a name and runtime id
    pub fn new(name: impl Into<String>, runtime_id: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            runtime_id: Some(runtime_id.into()),
        }
    }
}

/// Parameters of a remote command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteCommandRequest {
    pub cluster: String,
    pub task: String,
    /// Required by the API when the task runs more than one container
    pub container: Option<String>,
    pub command: String,
    pub interactive: bool,
}

/// The cloud control-plane API consumed by the orchestrator
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Describe a single task of a cluster
    async fn describe_tasks(
        &self,
        cluster: &str,
        task: &str,
    ) -> Result<TaskDescription, ControlPlaneError>;

    /// Run a one-shot command inside a task's container
    async fn execute_command(
        &self,
        request: ExecuteCommandRequest,
    ) -> Result<ExecSession, ControlPlaneError>;

    /// Terminate a remote session
    async fn terminate_session(&self, session_id: &str) -> Result<(), ControlPlaneError>;
}
