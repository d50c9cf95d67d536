// Consul agent API wire models used by the registry client

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Service registration request
/// PUT /v1/agent/service/register
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,

    #[serde(rename = "Address", default)]
    pub address: String,

    #[serde(rename = "Port", default)]
    pub port: u16,

    #[serde(rename = "Meta", default)]
    pub meta: HashMap<String, String>,

    /// Addresses keyed by endpoint scheme
    #[serde(rename = "TaggedAddresses", default)]
    pub tagged_addresses: HashMap<String, ServiceAddress>,

    #[serde(rename = "Checks", default)]
    pub checks: Vec<AgentServiceCheck>,
}

/// Address/port pair used in tagged addresses
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ServiceAddress {
    #[serde(rename = "Address")]
    pub address: String,

    #[serde(rename = "Port")]
    pub port: u16,
}

/// Health check definition for service registration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentServiceCheck {
    #[serde(rename = "CheckID", skip_serializing_if = "Option::is_none")]
    pub check_id: Option<String>,

    /// TTL-based check duration (e.g., "20s")
    #[serde(rename = "TTL", skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,

    /// TCP address for TCP checks
    #[serde(rename = "TCP", skip_serializing_if = "Option::is_none")]
    pub tcp: Option<String>,

    #[serde(rename = "Interval", skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    #[serde(
        rename = "DeregisterCriticalServiceAfter",
        skip_serializing_if = "Option::is_none"
    )]
    pub deregister_critical_service_after: Option<String>,
}

/// Health check status update
/// PUT /v1/agent/check/update/:check_id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckStatusUpdate {
    #[serde(rename = "Status")]
    pub status: String,

    #[serde(rename = "Output")]
    pub output: String,
}

impl CheckStatusUpdate {
    pub fn passing() -> Self {
        Self {
            status: "passing".to_string(),
            output: "pass".to_string(),
        }
    }
}

/// Service entry of a health query
/// GET /v1/health/service/:service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    #[serde(rename = "Service")]
    pub service: AgentService,
}

/// Agent service representation (response format)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentService {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Service")]
    pub service: String,

    #[serde(rename = "Tags", default)]
    pub tags: Option<Vec<String>>,

    #[serde(rename = "Address", default)]
    pub address: String,

    #[serde(rename = "Port", default)]
    pub port: u16,

    #[serde(rename = "Meta", default)]
    pub meta: Option<HashMap<String, String>>,

    #[serde(rename = "TaggedAddresses", default)]
    pub tagged_addresses: Option<HashMap<String, ServiceAddress>>,
}

impl AgentService {
    /// Version carried in a `version=<v>` tag
    pub fn version(&self) -> String {
        self.tags
            .iter()
            .flatten()
            .find_map(|t| t.strip_prefix("version="))
            .unwrap_or_default()
            .to_string()
    }

    /// Endpoints rebuilt from tagged addresses, sorted for stable output
    pub fn endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self
            .tagged_addresses
            .iter()
            .flatten()
            .filter(|(scheme, _)| !scheme.starts_with("lan") && !scheme.starts_with("wan"))
            .map(|(scheme, addr)| format!("{}://{}:{}", scheme, addr.address, addr.port))
            .collect();
        endpoints.sort();
        endpoints
    }
}
