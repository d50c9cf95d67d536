//! Polaris SDK configuration file (`polaris.yaml`)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "./polaris.yaml";

const SUPPORTED_PROTOCOLS: [&str; 2] = ["http", "https"];

/// Errors raised while loading the Polaris configuration or building the
/// client context from it
#[derive(Debug, thiserror::Error)]
pub enum PolarisConfigError {
    #[error("failed to read polaris config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid polaris config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("polaris config has no server addresses")]
    NoServerAddress,

    /// The OpenAPI client only speaks HTTP
    #[error("unsupported polaris server protocol '{0}', expected http or https")]
    UnsupportedProtocol(String),

    #[error("failed to init polaris context: {0}")]
    ContextInit(#[from] reqwest::Error),
}

/// Root of `polaris.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolarisConfiguration {
    #[serde(default)]
    pub global: GlobalConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    #[serde(default)]
    pub server_connector: ServerConnectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConnectorConfig {
    /// Polaris server addresses, `host:port` or full URLs
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

impl Default for ServerConnectorConfig {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            protocol: default_protocol(),
        }
    }
}

fn default_protocol() -> String {
    "http".to_string()
}

impl PolarisConfiguration {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolarisConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| PolarisConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate YAML content
    pub fn parse(content: &str) -> Result<Self, PolarisConfigError> {
        let config: PolarisConfiguration = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Require at least one server, all reachable over HTTP(S)
    pub fn validate(&self) -> Result<(), PolarisConfigError> {
        let addresses = self.server_addresses();
        if addresses.is_empty() {
            return Err(PolarisConfigError::NoServerAddress);
        }
        for address in addresses.iter() {
            let protocol = address.split("://").next().unwrap_or_default();
            if !SUPPORTED_PROTOCOLS.contains(&protocol.to_ascii_lowercase().as_str()) {
                return Err(PolarisConfigError::UnsupportedProtocol(protocol.to_string()));
            }
        }
        Ok(())
    }

    /// Base URLs of the configured servers
    pub fn server_addresses(&self) -> Vec<String> {
        let connector = &self.global.server_connector;
        connector
            .addresses
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(|a| {
                if a.contains("://") {
                    a.trim_end_matches('/').to_string()
                } else {
                    format!("{}://{}", connector.protocol, a)
                }
            })
            .collect()
    }
}
