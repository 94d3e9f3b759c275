//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Environment variable prefix; nested keys are separated by `__`,
/// e.g. `FLOODGATE__SERVER__GRPC_ADDR`.
pub const ENV_PREFIX: &str = "FLOODGATE";

/// Main configuration for the Floodgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Path to the admission rules file
    #[serde(default)]
    pub rules_path: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format for log lines
    #[serde(default)]
    pub format: LogFormat,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FloodgateConfig {
    /// Load configuration from an optional YAML file, then apply
    /// `FLOODGATE__*` environment overrides.
    pub fn load(path: Option<&str>) -> crate::error::Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::new(path, config::FileFormat::Yaml));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load configuration from a YAML file, without environment overrides.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| crate::error::FloodgateError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FloodgateError;

    #[test]
    fn test_defaults() {
        let config = FloodgateConfig::default();
        assert_eq!(config.server.grpc_addr, "127.0.0.1:8081".parse().unwrap());
        assert!(config.rules_path.is_none());
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
server:
  grpc_addr: 0.0.0.0:9000
rules_path: /etc/floodgate/rules.yaml
logging:
  format: json
"#;
        let config = FloodgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.grpc_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.rules_path.as_deref(), Some("/etc/floodgate/rules.yaml"));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = FloodgateConfig::from_yaml("rules_path: rules.yaml\n").unwrap();
        assert_eq!(config.server.grpc_addr, default_grpc_addr());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = FloodgateConfig::from_yaml("server:\n  grpc_addr: not-an-address\n").unwrap_err();
        assert!(matches!(err, FloodgateError::Config(_)));
    }

    #[test]
    fn test_example_config_file() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/floodgate.example.yaml");
        let config = FloodgateConfig::from_file(path).unwrap();
        assert_eq!(config.rules_path.as_deref(), Some("config/rules.example.yaml"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = FloodgateConfig::load(Some("/nonexistent/floodgate.yaml")).unwrap_err();
        assert!(matches!(err, FloodgateError::Config(_)));
    }

    #[test]
    fn test_load_file_with_env_override() {
        let dir = std::env::temp_dir().join(format!("floodgate-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("floodgate.yaml");
        std::fs::write(&path, "server:\n  grpc_addr: 127.0.0.1:7000\n").unwrap();

        std::env::set_var("FLOODGATE__LOGGING__FORMAT", "json");
        let config = FloodgateConfig::load(path.to_str()).unwrap();
        std::env::remove_var("FLOODGATE__LOGGING__FORMAT");

        assert_eq!(config.server.grpc_addr, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.logging.format, LogFormat::Json);

        std::fs::remove_dir_all(&dir).ok();
    }
}
