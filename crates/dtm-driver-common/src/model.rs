//! Service instance record and endpoint helpers

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A service instance announced to a registry backend.
///
/// The JSON layout (`id`, `name`, `version`, `metadata`, `endpoints`) is the
/// value stored under each instance key in KV backends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Unique instance ID
    pub id: String,
    /// Logical service name
    pub name: String,
    /// Service version
    #[serde(default)]
    pub version: String,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Endpoints such as `grpc://10.0.0.5:36790`
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl ServiceInstance {
    /// Create an instance with a freshly generated ID.
    pub fn new(name: impl Into<String>, endpoints: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            endpoints,
            ..Default::default()
        }
    }

    /// First endpoint using the given scheme.
    pub fn endpoint(&self, scheme: &str) -> Option<Endpoint> {
        self.endpoints
            .iter()
            .filter_map(|e| Endpoint::parse(e))
            .find(|e| e.scheme == scheme)
    }

    /// All endpoints that parse as `scheme://host:port`.
    pub fn parsed_endpoints(&self) -> Vec<Endpoint> {
        self.endpoints
            .iter()
            .filter_map(|e| Endpoint::parse(e))
            .collect()
    }
}

/// A `scheme://host:port` endpoint split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// Parse `scheme://host:port`. The host may be empty.
    pub fn parse(raw: &str) -> Option<Self> {
        let (scheme, rest) = raw.split_once("://")?;
        if scheme.is_empty() {
            return None;
        }
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let (host, port) = authority.rsplit_once(':')?;
        let port = port.parse().ok()?;
        Some(Self::new(scheme, host, port))
    }

    /// `host:port` form used for dialing.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}
