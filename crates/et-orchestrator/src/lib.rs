//! et-orchestrator: Tunnel session orchestration for ECS tasks
//!
//! Resolves an ECS task into a session-manager target, drives
//! `aws ssm start-session` port-forwarding sessions through their readiness
//! handshake, bootstraps relays inside the container for multi-hop tunnels
//! and tracks every process and remote session it creates so they can be
//! torn down on shutdown.

pub mod control_plane;
pub mod port;
pub mod pty;
pub mod remote;
pub mod resolver;
pub mod session;
pub mod tracker;
pub mod tunnel;

pub use control_plane::AwsControlPlane;
pub use port::PortAllocator;
pub use pty::PtySpawner;
pub use tracker::{CloseReport, ResourceTracker};
pub use tunnel::{EcsTunnel, TunnelOptions};
