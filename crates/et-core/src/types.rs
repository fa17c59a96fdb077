//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of the container a session-manager session attaches to.
///
/// Combines cluster, task and container runtime id in the format the
/// session-manager expects for ECS targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionTarget(String);

impl SessionTarget {
    /// Build the target for a container of a task
    pub fn new(cluster_id: &str, task_id: &str, runtime_id: &str) -> Self {
        Self(format!("ecs:{}_{}_{}", cluster_id, task_id, runtime_id))
    }

    /// Get the raw target string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a tunnel reaches its remote end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TunnelKind {
    /// Local port forwarded straight to a port of the container
    Direct,
    /// Forwarded through a relay listening inside the container
    Relayed,
    /// Local port is an HTTP proxy egressing from the container
    HttpProxy,
}

impl fmt::Display for TunnelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelKind::Direct => write!(f, "direct"),
            TunnelKind::Relayed => write!(f, "relayed"),
            TunnelKind::HttpProxy => write!(f, "http-proxy"),
        }
    }
}

/// An established tunnel owned by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelDescriptor {
    /// Port listening on this machine
    pub local_port: u16,
    /// Port the tunnel ends at (on the container or on `remote_host`)
    pub remote_port: u16,
    /// Host reached through the relay, if any
    pub remote_host: Option<String>,
    /// Forwarding mode
    pub kind: TunnelKind,
}

impl TunnelDescriptor {
    /// Human-readable remote end (`host:port` or `port`)
    pub fn remote_endpoint(&self) -> String {
        match &self.remote_host {
            Some(host) => format!("{}:{}", host, self.remote_port),
            None => self.remote_port.to_string(),
        }
    }
}

/// Remote session handle returned by the control plane after an
/// execute-command request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecSession {
    /// Session identifier, absent if execution did not start
    pub session_id: Option<String>,
}

impl ExecSession {
    /// Create a handle for a started session
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
        }
    }

    /// Session id if present and non-empty
    pub fn id(&self) -> Option<&str> {
        self.session_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Error parsing a `LOCAL_PORT[:REMOTE_ADDR]:REMOTE_PORT` forward spec
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid port forward syntax: {0}")]
pub struct ForwardSpecError(pub String);

/// A requested local forward: `LOCAL_PORT[:REMOTE_ADDR]:REMOTE_PORT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSpec {
    pub local_port: u16,
    pub remote_host: Option<String>,
    pub remote_port: u16,
}

impl FromStr for ForwardSpec {
    type Err = ForwardSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ForwardSpecError(s.to_string());
        let parts: Vec<&str> = s.split(':').collect();

        let (local, host, remote) = match parts.as_slice() {
            [local, remote] => (*local, None, *remote),
            [local, host, remote] => (*local, Some(*host), *remote),
            _ => return Err(invalid()),
        };

        if let Some(host) = host {
            let valid_host = !host.is_empty()
                && host
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.');
            if !valid_host {
                return Err(invalid());
            }
        }

        Ok(Self {
            local_port: parse_port(local).ok_or_else(invalid)?,
            remote_host: host.map(str::to_string),
            remote_port: parse_port(remote).ok_or_else(invalid)?,
        })
    }
}

fn parse_port(s: &str) -> Option<u16> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_target_format() {
        let target = SessionTarget::new("prod", "abc123", "abc123-456");
        assert_eq!(target.as_str(), "ecs:prod_abc123_abc123-456");
        assert_eq!(target, SessionTarget::new("prod", "abc123", "abc123-456"));
    }

    #[test]
    fn test_exec_session_empty_id() {
        assert_eq!(ExecSession::default().id(), None);
        assert_eq!(
            ExecSession {
                session_id: Some(String::new())
            }
            .id(),
            None
        );
        assert_eq!(ExecSession::new("ecs-execute-command-1").id(), Some("ecs-execute-command-1"));
    }

    #[test]
    fn test_forward_spec_direct() {
        let spec: ForwardSpec = "8080:80".parse().unwrap();
        assert_eq!(
            spec,
            ForwardSpec {
                local_port: 8080,
                remote_host: None,
                remote_port: 80
            }
        );
    }

    #[test]
    fn test_forward_spec_with_host() {
        let spec: ForwardSpec = "5432:db.internal-1.example:5432".parse().unwrap();
        assert_eq!(spec.remote_host.as_deref(), Some("db.internal-1.example"));
        assert_eq!(spec.local_port, 5432);
        assert_eq!(spec.remote_port, 5432);
    }

    #[test]
    fn test_forward_spec_rejects_garbage() {
        for bad in ["", "8080", "a:80", "8080:", "1:host:2:3", "80:ho st:80", "99999:80"] {
            assert!(bad.parse::<ForwardSpec>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_descriptor_remote_endpoint() {
        let relayed = TunnelDescriptor {
            local_port: 9000,
            remote_port: 80,
            remote_host: Some("10.0.0.5".to_string()),
            kind: TunnelKind::Relayed,
        };
        assert_eq!(relayed.remote_endpoint(), "10.0.0.5:80");
        assert_eq!(format!("{}", TunnelKind::HttpProxy), "http-proxy");
    }
}
