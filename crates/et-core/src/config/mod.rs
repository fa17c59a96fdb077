//! Configuration management for ecs-tunnel

pub mod serde_utils;
mod tunnel;

pub use tunnel::{
    AwsCredentials, PortRangeConfig, RelayConfig, TunnelConfig, DEFAULT_HTTP_PROXY_COMMAND,
    DEFAULT_REMOTE_HOST_COMMAND,
};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ecs-tunnel")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load and validate a configuration file
pub fn load_config(path: &Path) -> Result<TunnelConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: TunnelConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Load the configuration from an explicit path, or from the default path
/// when present. A missing default file yields the defaults.
pub fn load_or_default(explicit: Option<&Path>) -> Result<TunnelConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    let default_path = default_config_path();
    if default_path.exists() {
        tracing::debug!("Loading config from {:?}", default_path);
        load_config(&default_path)
    } else {
        Ok(TunnelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(matches!(load_config(&path), Err(ConfigError::NotFound(_))));
        assert!(load_or_default(Some(&path)).is_err());
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "aws_exec = \"/opt/aws/bin/aws\"\nprofile = \"staging\"\nhandshake_timeout = 10\n",
        )
        .unwrap();

        let config = load_or_default(Some(&path)).unwrap();
        assert_eq!(config.aws_exec, "/opt/aws/bin/aws");
        assert_eq!(config.profile.as_deref(), Some("staging"));
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ports]\nmax_attempts = 0\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));

        std::fs::write(&path, "ports = 12").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }
}
