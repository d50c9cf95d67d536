//! `discovery:///<service>` resolver backed by a service registry

use std::sync::Arc;

use async_trait::async_trait;
use dtm_driver_common::ADVERTISED_SCHEME;
use tracing::debug;
use url::Url;

use super::{ResolverBuilder, target_path};
use crate::error::Result;
use crate::registry::ServiceRegistry;

/// Resolves a service name to the gRPC endpoints of its live instances
pub struct DiscoveryResolver {
    registry: Arc<dyn ServiceRegistry>,
    insecure: bool,
}

impl DiscoveryResolver {
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self {
            registry,
            insecure: false,
        }
    }

    /// Dial without TLS
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Backend this resolver queries
    pub fn registry(&self) -> &Arc<dyn ServiceRegistry> {
        &self.registry
    }
}

#[async_trait]
impl ResolverBuilder for DiscoveryResolver {
    fn scheme(&self) -> &str {
        "discovery"
    }

    async fn resolve(&self, target: &Url) -> Result<Vec<String>> {
        let name = target_path(target);
        let instances = self.registry.get_service(name).await?;
        let addresses: Vec<String> = instances
            .iter()
            .filter_map(|ins| ins.endpoint(ADVERTISED_SCHEME))
            .map(|ep| ep.address())
            .collect();
        debug!(
            "Resolved {} via {}: {} of {} instances",
            name,
            self.registry.kind(),
            addresses.len(),
            instances.len()
        );
        Ok(addresses)
    }

    fn insecure(&self) -> bool {
        self.insecure
    }
}
