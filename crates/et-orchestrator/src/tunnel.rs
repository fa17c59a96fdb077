//! Tunnel composition
//!
//! [`EcsTunnel`] is bound to one container of one ECS task and opens three
//! kinds of tunnel into it:
//!
//! - **direct**: a local port forwarded to a port of the container
//! - **relayed**: a relay started in the container forwards a proxy port to a
//!   host only the container can reach; the local port is forwarded to the
//!   proxy port
//! - **http proxy**: an HTTP proxy started in the container; the local port
//!   is forwarded to it
//!
//! # Remote listener readiness
//!
//! For relayed and proxy tunnels the remote command is requested before the
//! local session starts, but its listener is never polled. The session
//! handshake only proves the local side is up; a relay that starts slowly
//! shows up as refused connections on first use.

use std::path::PathBuf;
use std::sync::Arc;

use et_core::config::{RelayConfig, TunnelConfig};
use et_core::traits::{ControlPlane, ProcessSpawner};
use et_core::{ConfigError, SessionTarget, TunnelDescriptor, TunnelError, TunnelKind};

use crate::port::PortAllocator;
use crate::pty::PtySpawner;
use crate::remote::RemoteCommandRunner;
use crate::resolver::resolve_target;
use crate::session::SessionDriver;
use crate::tracker::{CloseReport, ResourceTracker};

/// Which task to tunnel into, and how
#[derive(Debug, Clone)]
pub struct TunnelOptions {
    pub cluster_id: String,
    pub task_id: String,
    /// Required when the task runs more than one container
    pub container_name: Option<String>,
    pub config: TunnelConfig,
}

impl TunnelOptions {
    /// Options for a task with default configuration
    pub fn new(cluster_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            task_id: task_id.into(),
            container_name: None,
            config: TunnelConfig::default(),
        }
    }

    /// Target a named container of the task
    pub fn with_container(mut self, container_name: impl Into<String>) -> Self {
        self.container_name = Some(container_name.into());
        self
    }

    /// Use the given configuration
    pub fn with_config(mut self, config: TunnelConfig) -> Self {
        self.config = config;
        self
    }
}

/// Opens tunnels into one ECS task container and owns everything they need
pub struct EcsTunnel {
    cluster_id: String,
    task_id: String,
    target: SessionTarget,
    control_plane: Arc<dyn ControlPlane>,
    ports: PortAllocator,
    relay: RelayConfig,
    runner: RemoteCommandRunner,
    driver: SessionDriver,
    tracker: Arc<ResourceTracker>,
}

impl EcsTunnel {
    /// Resolve the task and prepare to open tunnels on a PTY
    pub async fn connect(
        options: TunnelOptions,
        control_plane: Arc<dyn ControlPlane>,
    ) -> Result<Self, TunnelError> {
        Self::connect_with_spawner(options, control_plane, Arc::new(PtySpawner::new())).await
    }

    /// Resolve the task and prepare to open tunnels with `spawner`.
    ///
    /// Fails when the session executable is not on the `PATH`, when the
    /// task reports a failure or when no single container can be picked.
    pub async fn connect_with_spawner(
        options: TunnelOptions,
        control_plane: Arc<dyn ControlPlane>,
        spawner: Arc<dyn ProcessSpawner>,
    ) -> Result<Self, TunnelError> {
        let TunnelOptions {
            cluster_id,
            task_id,
            container_name,
            config,
        } = options;

        config.validate()?;
        let executable = resolve_executable(&config.aws_exec)?;
        tracing::debug!("Using session executable {:?}", executable);

        let target = resolve_target(
            control_plane.as_ref(),
            &cluster_id,
            &task_id,
            container_name.as_deref(),
        )
        .await?;

        let tracker = Arc::new(ResourceTracker::new());
        let runner = RemoteCommandRunner::new(
            Arc::clone(&control_plane),
            cluster_id.clone(),
            task_id.clone(),
            container_name,
            Arc::clone(&tracker),
        );
        let driver = SessionDriver::new(
            executable,
            target.clone(),
            config.session_env(),
            config.handshake_timeout,
            spawner,
            Arc::clone(&tracker),
        );

        Ok(Self {
            cluster_id,
            task_id,
            target,
            control_plane,
            ports: PortAllocator::from_config(&config.ports),
            relay: config.relay,
            runner,
            driver,
            tracker,
        })
    }

    /// Session target every tunnel attaches to
    pub fn target(&self) -> &SessionTarget {
        &self.target
    }

    /// Cluster the task runs in
    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// Task the tunnels lead into
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Forward a local port to `remote_port` of the container.
    ///
    /// Without `local_port` a free port is picked. Returns the local port.
    pub async fn local_port_tunnel(
        &self,
        remote_port: u16,
        local_port: Option<u16>,
    ) -> Result<u16, TunnelError> {
        let local_port = self.forward(remote_port, local_port).await?;
        tracing::info!("Forwarding {} to {}:{}", local_port, self.task_id, remote_port);

        self.tracker.record_tunnel(TunnelDescriptor {
            local_port,
            remote_port,
            remote_host: None,
            kind: TunnelKind::Direct,
        });
        Ok(local_port)
    }

    /// Forward a local port to `remote_host:remote_port` as seen from the
    /// container, through a relay started in the container.
    pub async fn remote_port_tunnel(
        &self,
        remote_port: u16,
        remote_host: &str,
        local_port: Option<u16>,
    ) -> Result<u16, TunnelError> {
        // Lives in the container, so a local probe would say nothing about it
        let proxy_port = self.ports.allocate(None, false)?;

        let command = self.relay.remote_host(proxy_port, remote_host, remote_port);
        self.runner.run_remote(&command).await?;

        let local_port = self.forward(proxy_port, local_port).await?;
        tracing::info!(
            "Forwarding {} to {}:{} via {}:{}",
            local_port,
            remote_host,
            remote_port,
            self.task_id,
            proxy_port
        );

        self.tracker.record_tunnel(TunnelDescriptor {
            local_port,
            remote_port,
            remote_host: Some(remote_host.to_string()),
            kind: TunnelKind::Relayed,
        });
        Ok(local_port)
    }

    /// Make a local port an HTTP(S) proxy whose traffic leaves from the
    /// container. Both ports are picked at random when not given.
    pub async fn http_proxy_port_tunnel(
        &self,
        remote_port: Option<u16>,
        local_port: Option<u16>,
    ) -> Result<u16, TunnelError> {
        let remote_port = self.ports.allocate(remote_port, false)?;
        let local_port = self.ports.allocate(local_port, false)?;

        let command = self.relay.http_proxy(remote_port);
        self.runner.run_remote(&command).await?;

        let local_port = self.forward(remote_port, Some(local_port)).await?;
        tracing::info!(
            "HTTP proxy on {} via {}:{}",
            local_port,
            self.task_id,
            remote_port
        );

        self.tracker.record_tunnel(TunnelDescriptor {
            local_port,
            remote_port,
            remote_host: None,
            kind: TunnelKind::HttpProxy,
        });
        Ok(local_port)
    }

    /// Tunnels opened so far, ordered by local port
    pub fn tunnels(&self) -> Vec<TunnelDescriptor> {
        self.tracker.tunnels()
    }

    /// Number of session processes spawned and not yet closed
    pub fn tracked_processes(&self) -> usize {
        self.tracker.process_count()
    }

    /// Number of remote sessions started and not yet closed
    pub fn tracked_sessions(&self) -> usize {
        self.tracker.session_count()
    }

    /// Number of session processes still running
    pub fn live_processes(&self) -> usize {
        self.tracker.live_processes()
    }

    /// Terminate every remote session, then kill every session process.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) -> Result<CloseReport, TunnelError> {
        tracing::debug!("Closing tunnels into {}", self.target);
        self.tracker.close(self.control_plane.as_ref()).await
    }

    async fn forward(&self, remote_port: u16, local_port: Option<u16>) -> Result<u16, TunnelError> {
        let local_port = self.ports.allocate(local_port, true)?;
        self.driver.start_local_forward(local_port, remote_port).await
    }
}

impl Drop for EcsTunnel {
    fn drop(&mut self) {
        self.tracker.close_best_effort(&self.control_plane);
    }
}

fn resolve_executable(name: &str) -> Result<PathBuf, ConfigError> {
    which::which(name).map_err(|_| ConfigError::ExecutableNotFound(name.to_string()))
}
