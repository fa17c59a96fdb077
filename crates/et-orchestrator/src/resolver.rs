//! Task to session-target resolution

use et_core::traits::{ContainerInfo, ControlPlane, TaskDescription};
use et_core::{SessionTarget, TunnelError};

/// Resolve a task (and optionally one of its containers) into the target
/// string session-manager sessions attach to.
///
/// Fails with [`TunnelError::TaskFailure`] when the control plane reports a
/// failure for the task and with [`TunnelError::Resolution`] when no single
/// container with a runtime id can be picked.
pub async fn resolve_target(
    control_plane: &dyn ControlPlane,
    cluster_id: &str,
    task_id: &str,
    container_name: Option<&str>,
) -> Result<SessionTarget, TunnelError> {
    let description = control_plane.describe_tasks(cluster_id, task_id).await?;
    let runtime_id = select_runtime_id(&description, task_id, container_name)?;

    let target = SessionTarget::new(cluster_id, task_id, runtime_id);
    tracing::debug!("Resolved task {} to target {}", task_id, target);
    Ok(target)
}

fn select_runtime_id<'a>(
    description: &'a TaskDescription,
    task_id: &str,
    container_name: Option<&str>,
) -> Result<&'a str, TunnelError> {
    if let Some(reason) = description
        .failures
        .iter()
        .find_map(|failure| failure.reason.as_deref())
    {
        return Err(TunnelError::TaskFailure {
            task: task_id.to_string(),
            reason: reason.to_string(),
        });
    }

    let task = description
        .tasks
        .first()
        .ok_or_else(|| TunnelError::Resolution(format!("task {} not found", task_id)))?;

    let container = match container_name {
        Some(name) => {
            let matches: Vec<&ContainerInfo> = task
                .containers
                .iter()
                .filter(|c| c.name.as_deref() == Some(name))
                .collect();
            match matches.as_slice() {
                [single] => *single,
                [] => {
                    return Err(TunnelError::Resolution(format!(
                        "no container named {:?} in task {}",
                        name, task_id
                    )))
                }
                _ => {
                    return Err(TunnelError::Resolution(format!(
                        "{} containers named {:?} in task {}",
                        matches.len(),
                        name,
                        task_id
                    )))
                }
            }
        }
        None => task.containers.first().ok_or_else(|| {
            TunnelError::Resolution(format!("task {} has no containers", task_id))
        })?,
    };

    container
        .runtime_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            TunnelError::Resolution(format!(
                "container {} of task {} has no runtime id",
                container.name.as_deref().unwrap_or("<unnamed>"),
                task_id
            ))
        })
}
