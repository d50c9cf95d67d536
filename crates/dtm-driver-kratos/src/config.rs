//! Driver configuration
//!
//! Everything the driver reads from its environment goes through
//! `DriverConfig`, so deployments and tests can pin the values.

use std::path::PathBuf;
use std::time::Duration;

use dtm_driver_common::POD_IP_ENV;
use dtm_driver_registry::polaris::DEFAULT_CONFIG_PATH;
use dtm_driver_registry::{PolarisConfigError, PolarisRegistryPolicy};

/// Namespace Polaris instances are registered under
pub const POLARIS_NAMESPACE: &str = "go";

/// Handler for unrecoverable Polaris configuration errors. It never returns.
pub type FatalHandler = fn(&PolarisConfigError) -> !;

/// Default fatal handler: log and terminate the process
pub fn exit_process(err: &PolarisConfigError) -> ! {
    tracing::error!("Fatal polaris configuration error: {}", err);
    std::process::exit(1)
}

/// Source of the pod IP advertised in registrations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodIp {
    /// Read the named environment variable on every registration
    Env(String),
    Fixed(String),
}

impl PodIp {
    /// Current value; an unset variable yields an empty string
    pub fn resolve(&self) -> String {
        match self {
            PodIp::Env(var) => std::env::var(var).unwrap_or_default(),
            PodIp::Fixed(ip) => ip.clone(),
        }
    }
}

impl Default for PodIp {
    fn default() -> Self {
        PodIp::Env(POD_IP_ENV.to_string())
    }
}

/// Fixed registration policy for the Polaris backend
pub fn polaris_policy() -> PolarisRegistryPolicy {
    PolarisRegistryPolicy {
        namespace: POLARIS_NAMESPACE.to_string(),
        timeout: Duration::from_secs(1),
        healthy: true,
        isolate: false,
        retry_count: 3,
        weight: 100,
        priority: 0,
        ttl: 3,
        heartbeat: true,
    }
}

#[derive(Clone)]
pub struct DriverConfig {
    pub pod_ip: PodIp,
    pub polaris_config_path: PathBuf,
    pub polaris_policy: PolarisRegistryPolicy,
    pub fatal_handler: FatalHandler,
}

impl std::fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverConfig")
            .field("pod_ip", &self.pod_ip)
            .field("polaris_config_path", &self.polaris_config_path)
            .field("polaris_policy", &self.polaris_policy)
            .finish_non_exhaustive()
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            pod_ip: PodIp::default(),
            polaris_config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            polaris_policy: polaris_policy(),
            fatal_handler: exit_process,
        }
    }
}

impl DriverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pod_ip(mut self, pod_ip: PodIp) -> Self {
        self.pod_ip = pod_ip;
        self
    }

    pub fn with_polaris_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.polaris_config_path = path.into();
        self
    }

    pub fn with_polaris_policy(mut self, policy: PolarisRegistryPolicy) -> Self {
        self.polaris_policy = policy;
        self
    }

    pub fn with_fatal_handler(mut self, handler: FatalHandler) -> Self {
        self.fatal_handler = handler;
        self
    }
}
