//! Session-manager port-forwarding sessions
//!
//! Starts `<aws> ssm start-session` with the port-forwarding document and
//! waits for the plugin to print [`READY_MARKER`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use et_core::traits::{ProcessSpawner, ProcessSpec, SpawnedProcess};
use et_core::{SessionTarget, TunnelError};

use crate::tracker::ResourceTracker;

/// Printed by the session-manager plugin once the local listener is up
pub const READY_MARKER: &str = "Waiting for connections";

/// Session document that forwards a local port to a port of the target
pub const PORT_FORWARDING_DOCUMENT: &str = "AWS-StartPortForwardingSession";

/// Arguments for a port-forwarding session
pub fn start_session_args(target: &SessionTarget, local_port: u16, remote_port: u16) -> Vec<String> {
    // The document schema wants both ports as one-element string lists
    let parameters = serde_json::json!({
        "portNumber": [remote_port.to_string()],
        "localPortNumber": [local_port.to_string()],
    });

    vec![
        "ssm".to_string(),
        "start-session".to_string(),
        "--target".to_string(),
        target.as_str().to_string(),
        "--document-name".to_string(),
        PORT_FORWARDING_DOCUMENT.to_string(),
        "--parameters".to_string(),
        parameters.to_string(),
    ]
}

/// Starts session processes and hands them to the tracker
pub struct SessionDriver {
    executable: PathBuf,
    target: SessionTarget,
    env: Vec<(String, String)>,
    handshake_timeout: Duration,
    spawner: Arc<dyn ProcessSpawner>,
    tracker: Arc<ResourceTracker>,
}

impl SessionDriver {
    /// Create a driver for one session target
    pub fn new(
        executable: PathBuf,
        target: SessionTarget,
        env: Vec<(String, String)>,
        handshake_timeout: Duration,
        spawner: Arc<dyn ProcessSpawner>,
        tracker: Arc<ResourceTracker>,
    ) -> Self {
        Self {
            executable,
            target,
            env,
            handshake_timeout,
            spawner,
            tracker,
        }
    }

    /// Forward `local_port` to `remote_port` of the target.
    ///
    /// Returns once the session reports it is ready. The process is tracked
    /// whether or not the handshake succeeds.
    pub async fn start_local_forward(
        &self,
        local_port: u16,
        remote_port: u16,
    ) -> Result<u16, TunnelError> {
        let spec = ProcessSpec {
            program: self.executable.clone(),
            args: start_session_args(&self.target, local_port, remote_port),
            env: self.env.clone(),
        };
        tracing::debug!("Start session cmd: {}", spec.command_line());

        let mut process = self.spawner.spawn(&spec).map_err(TunnelError::Spawn)?;
        let handshake = wait_for_marker(process.as_mut(), READY_MARKER, self.handshake_timeout).await;
        let pid = process.pid();
        self.tracker.track_process(process);

        let output = handshake?;
        tracing::debug!("Session started successfully (PID: {:?})", pid);
        tracing::trace!("Handshake output: {}", output);
        tracing::debug!(
            "Forwarding {} to {}:{}",
            local_port,
            self.target,
            remote_port
        );

        Ok(local_port)
    }
}

/// Read lines until one contains `marker`, returning everything read.
///
/// Fails with [`TunnelError::HandshakeTimeout`] when `timeout` elapses first
/// and with [`TunnelError::SessionExited`] when the output ends first.
pub async fn wait_for_marker(
    process: &mut dyn SpawnedProcess,
    marker: &str,
    timeout: Duration,
) -> Result<String, TunnelError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut output = String::new();

    loop {
        let line = match tokio::time::timeout_at(deadline, process.read_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => return Err(TunnelError::SessionExited { output }),
            Ok(Err(e)) => {
                tracing::debug!("Reading session output failed: {}", e);
                return Err(TunnelError::SessionExited { output });
            }
            Err(_) => return Err(TunnelError::HandshakeTimeout { timeout, output }),
        };

        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&line);

        if line.contains(marker) {
            return Ok(output);
        }
    }
}
