//! Construction of registry backends
//!
//! The driver never builds clients directly; it asks a `RegistryFactory`.
//! `DefaultRegistryFactory` builds the real etcd, Consul and Polaris clients.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dtm_driver_registry::{
    ConsulRegistry, EtcdRegistry, PolarisConfigError, PolarisRegistry, PolarisRegistryPolicy,
    RegistryError, ServiceRegistry,
};

#[async_trait]
pub trait RegistryFactory: Send + Sync {
    /// etcd registry over every endpoint of the host list
    async fn etcd(&self, endpoints: Vec<String>)
    -> Result<Arc<dyn ServiceRegistry>, RegistryError>;

    /// Consul registry over a single agent address
    fn consul(&self, address: &str) -> Result<Arc<dyn ServiceRegistry>, RegistryError>;

    /// Polaris registry from a configuration file. Errors here are fatal to
    /// the caller.
    fn polaris(
        &self,
        config_path: &Path,
        policy: PolarisRegistryPolicy,
    ) -> Result<Arc<dyn ServiceRegistry>, PolarisConfigError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRegistryFactory;

#[async_trait]
impl RegistryFactory for DefaultRegistryFactory {
    async fn etcd(
        &self,
        endpoints: Vec<String>,
    ) -> Result<Arc<dyn ServiceRegistry>, RegistryError> {
        Ok(Arc::new(EtcdRegistry::connect(&endpoints).await?))
    }

    fn consul(&self, address: &str) -> Result<Arc<dyn ServiceRegistry>, RegistryError> {
        Ok(Arc::new(ConsulRegistry::from_address(address)?))
    }

    fn polaris(
        &self,
        config_path: &Path,
        policy: PolarisRegistryPolicy,
    ) -> Result<Arc<dyn ServiceRegistry>, PolarisConfigError> {
        Ok(Arc::new(PolarisRegistry::from_file(config_path, policy)?))
    }
}
