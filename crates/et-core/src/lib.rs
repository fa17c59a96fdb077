//! et-core: Core abstractions and configuration for ecs-tunnel
//!
//! This crate provides the shared domain types, the error taxonomy, the
//! configuration structures and the traits through which the orchestrator
//! talks to its external collaborators (the control-plane API and the
//! session-establishment process).

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{ConfigError, ControlPlaneError, TunnelError};
pub use types::{
    ExecSession, ForwardSpec, ForwardSpecError, SessionTarget, TunnelDescriptor, TunnelKind,
};
