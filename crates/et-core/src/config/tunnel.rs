//! Tunnel orchestrator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration;
use crate::error::ConfigError;

/// Default relay started inside the container for `LOCAL:HOST:PORT` forwards
pub const DEFAULT_REMOTE_HOST_COMMAND: &str =
    "nc -lk -p {proxy_port} -e nc {remote_host} {remote_port}";

/// Default HTTP proxy listener started inside the container
pub const DEFAULT_HTTP_PROXY_COMMAND: &str = "ncat -l {remote_port} --proxy-type http";

/// Configuration for the tunnel orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Executable used to start session-manager sessions
    pub aws_exec: String,

    /// AWS region (passed to the API client and to the session process)
    pub region: Option<String>,

    /// AWS profile name
    pub profile: Option<String>,

    /// Explicit credentials, overriding the ambient ones
    pub credentials: AwsCredentials,

    /// How long to wait for a session to report it is ready
    #[serde(with = "duration")]
    pub handshake_timeout: Duration,

    /// Local port allocation
    pub ports: PortRangeConfig,

    /// Commands run inside the container for multi-hop tunnels
    pub relay: RelayConfig,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            aws_exec: "aws".to_string(),
            region: None,
            profile: None,
            credentials: AwsCredentials::default(),
            handshake_timeout: Duration::from_secs(30),
            ports: PortRangeConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl TunnelConfig {
    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aws_exec.trim().is_empty() {
            return Err(ConfigError::Invalid("aws_exec must not be empty".into()));
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "handshake_timeout must be greater than zero".into(),
            ));
        }
        if self.ports.min == 0 || self.ports.min > self.ports.max {
            return Err(ConfigError::Invalid(format!(
                "invalid port range {}-{}",
                self.ports.min, self.ports.max
            )));
        }
        if self.ports.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "ports.max_attempts must be at least 1".into(),
            ));
        }
        require_placeholders(
            "relay.remote_host_command",
            &self.relay.remote_host_command,
            &["{proxy_port}", "{remote_host}", "{remote_port}"],
        )?;
        require_placeholders(
            "relay.http_proxy_command",
            &self.relay.http_proxy_command,
            &["{remote_port}"],
        )?;
        Ok(())
    }

    /// Environment overrides for spawned session processes.
    ///
    /// Only configured values are returned; everything else is inherited.
    pub fn session_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        let mut push = |key: &str, value: &Option<String>| {
            if let Some(value) = value {
                env.push((key.to_string(), value.clone()));
            }
        };

        push("AWS_DEFAULT_PROFILE", &self.profile);
        push("AWS_ACCESS_KEY_ID", &self.credentials.access_key_id);
        push("AWS_SECRET_ACCESS_KEY", &self.credentials.secret_access_key);
        push("AWS_SESSION_TOKEN", &self.credentials.session_token);
        push("AWS_DEFAULT_REGION", &self.region);
        env
    }
}

fn require_placeholders(field: &str, template: &str, names: &[&str]) -> Result<(), ConfigError> {
    match names.iter().find(|name| !template.contains(*name)) {
        Some(missing) => Err(ConfigError::Invalid(format!(
            "{} must contain {}",
            field, missing
        ))),
        None => Ok(()),
    }
}

/// Explicit AWS credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsCredentials {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    /// Key pair, when both halves are configured
    pub fn key_pair(&self) -> Option<(&str, &str)> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

/// Range and retry budget for auto-allocated local ports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortRangeConfig {
    /// Lowest port drawn (inclusive)
    pub min: u16,
    /// Highest port drawn (inclusive)
    pub max: u16,
    /// Draws before giving up when every candidate is in use
    pub max_attempts: u32,
}

impl Default for PortRangeConfig {
    fn default() -> Self {
        Self {
            min: 1024,
            max: 49150,
            max_attempts: 64,
        }
    }
}

/// Remote command templates.
///
/// `{proxy_port}`, `{remote_host}` and `{remote_port}` are substituted
/// before the command is sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Listens on `{proxy_port}` and pipes to `{remote_host}:{remote_port}`
    pub remote_host_command: String,
    /// HTTP(S) proxy listening on `{remote_port}`
    pub http_proxy_command: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            remote_host_command: DEFAULT_REMOTE_HOST_COMMAND.to_string(),
            http_proxy_command: DEFAULT_HTTP_PROXY_COMMAND.to_string(),
        }
    }
}

impl RelayConfig {
    /// Relay command for a remote-host forward
    pub fn remote_host(&self, proxy_port: u16, remote_host: &str, remote_port: u16) -> String {
        self.remote_host_command
            .replace("{proxy_port}", &proxy_port.to_string())
            .replace("{remote_host}", remote_host)
            .replace("{remote_port}", &remote_port.to_string())
    }

    /// Listener command for an HTTP proxy forward
    pub fn http_proxy(&self, remote_port: u16) -> String {
        self.http_proxy_command
            .replace("{remote_port}", &remote_port.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TunnelConfig::default();
        config.validate().unwrap();
        assert_eq!(config.ports.min, 1024);
        assert_eq!(config.ports.max, 49150);
        assert_eq!(config.aws_exec, "aws");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TunnelConfig = toml::from_str(
            r#"
            region = "eu-west-1"
            handshake_timeout = "5s"

            [ports]
            min = 20000
            "#,
        )
        .unwrap();

        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.ports.min, 20000);
        assert_eq!(config.ports.max, 49150);
        assert_eq!(config.relay.http_proxy_command, DEFAULT_HTTP_PROXY_COMMAND);
    }

    #[test]
    fn test_validate_rejects_bad_range() {
        let mut config = TunnelConfig::default();
        config.ports.min = 5000;
        config.ports.max = 4000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_template_without_placeholder() {
        let mut config = TunnelConfig::default();
        config.relay.remote_host_command = "socat TCP-LISTEN:{proxy_port} -".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("{remote_host}"));
    }

    #[test]
    fn test_session_env_only_configured_values() {
        let mut config = TunnelConfig::default();
        assert!(config.session_env().is_empty());

        config.region = Some("us-east-1".to_string());
        config.credentials.access_key_id = Some("AKIA".to_string());
        let env = config.session_env();
        assert_eq!(
            env,
            vec![
                ("AWS_ACCESS_KEY_ID".to_string(), "AKIA".to_string()),
                ("AWS_DEFAULT_REGION".to_string(), "us-east-1".to_string()),
            ]
        );
    }

    #[test]
    fn test_relay_templates() {
        let relay = RelayConfig::default();
        assert_eq!(
            relay.remote_host(31337, "10.0.0.5", 80),
            "nc -lk -p 31337 -e nc 10.0.0.5 80"
        );
        assert_eq!(relay.http_proxy(3128), "ncat -l 3128 --proxy-type http");
    }
}
