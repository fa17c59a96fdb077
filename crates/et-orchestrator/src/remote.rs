//! One-shot commands inside the task's container

use std::sync::Arc;

use et_core::traits::{ControlPlane, ExecuteCommandRequest};
use et_core::TunnelError;

use crate::tracker::ResourceTracker;

/// Runs commands in the resolved task through the control plane
pub struct RemoteCommandRunner {
    control_plane: Arc<dyn ControlPlane>,
    cluster_id: String,
    task_id: String,
    container_name: Option<String>,
    tracker: Arc<ResourceTracker>,
}

impl RemoteCommandRunner {
    /// Create a runner bound to one task (and container, when given)
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        cluster_id: impl Into<String>,
        task_id: impl Into<String>,
        container_name: Option<String>,
        tracker: Arc<ResourceTracker>,
    ) -> Self {
        Self {
            control_plane,
            cluster_id: cluster_id.into(),
            task_id: task_id.into(),
            container_name,
            tracker,
        }
    }

    /// Start `command` in the container.
    ///
    /// Does not wait for the command to do anything; the returned session is
    /// tracked for termination even when it carries no id.
    pub async fn run_remote(&self, command: &str) -> Result<(), TunnelError> {
        let request = ExecuteCommandRequest {
            cluster: self.cluster_id.clone(),
            task: self.task_id.clone(),
            container: self.container_name.clone(),
            command: command.to_string(),
            interactive: true,
        };

        let session = self.control_plane.execute_command(request).await?;
        tracing::debug!("Started exec command {:?}: {:?}", command, session);
        self.tracker.track_session(session);
        Ok(())
    }
}
