// Polaris HTTP OpenAPI wire models

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Success code returned by the Polaris server
pub const EXECUTE_SUCCESS: u32 = 200000;

/// Discover request type for instances
pub const DISCOVER_INSTANCE: u32 = 1;

/// Health check type for heartbeats
pub const HEALTH_CHECK_HEARTBEAT: u32 = 1;

/// Instance body for register, deregister and heartbeat
/// POST /v1/RegisterInstance, POST /v1/DeregisterInstance, PUT /v1/Heartbeat
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Instance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_health_check: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Instance {
    /// Identity fields only, as used by heartbeat and deregister
    pub fn key(service: &str, namespace: &str, host: &str, port: u16) -> Self {
        Self {
            service: service.to_string(),
            namespace: namespace.to_string(),
            host: host.to_string(),
            port,
            ..Default::default()
        }
    }

    /// Live means healthy and not isolated; missing flags count as live
    pub fn is_live(&self) -> bool {
        self.healthy.unwrap_or(true) && !self.isolate.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct HealthCheck {
    #[serde(rename = "type")]
    pub check_type: u32,
    pub heartbeat: HeartbeatCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct HeartbeatCheck {
    pub ttl: u32,
}

/// Service reference inside a discover request
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceRef {
    pub name: String,
    pub namespace: String,
}

/// POST /v1/Discover
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverRequest {
    #[serde(rename = "type")]
    pub request_type: u32,
    pub service: ServiceRef,
}

/// Common response envelope
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Response {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub info: String,
    #[serde(default)]
    pub instance: Option<Instance>,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.code == EXECUTE_SUCCESS
    }
}
