//! The registry driver handed to the transaction coordination host

use std::sync::Arc;

use async_trait::async_trait;
use dtm_driver_common::{ServiceInstance, TransactionDriver, advertised_endpoint};
use dtm_driver_registry::{DiscoveryResolver, ResolverRegistry, ServiceRegistry};
use tracing::debug;

use crate::DRIVER_NAME;
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::factory::{DefaultRegistryFactory, RegistryFactory};
use crate::method;
use crate::target::{Scheme, Target};

/// Registers the current process in etcd, Consul or Polaris and installs
/// the matching `discovery` resolver.
pub struct KratosDriver {
    config: DriverConfig,
    resolvers: Arc<ResolverRegistry>,
    factory: Arc<dyn RegistryFactory>,
}

impl KratosDriver {
    /// Driver over the process-wide resolver registry and real backends
    pub fn new() -> Self {
        Self::with_parts(
            DriverConfig::default(),
            ResolverRegistry::global(),
            Arc::new(DefaultRegistryFactory),
        )
    }

    /// Driver with a custom configuration over the process-wide resolvers
    pub fn with_config(config: DriverConfig) -> Self {
        Self::with_parts(
            config,
            ResolverRegistry::global(),
            Arc::new(DefaultRegistryFactory),
        )
    }

    /// Driver with every collaborator injected; tests pass an isolated
    /// resolver registry and a fake factory
    pub fn with_parts(
        config: DriverConfig,
        resolvers: Arc<ResolverRegistry>,
        factory: Arc<dyn RegistryFactory>,
    ) -> Self {
        Self {
            config,
            resolvers,
            factory,
        }
    }

    /// Configuration the driver was built with
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Registry that receives the `discovery` resolver on each registration
    pub fn resolvers(&self) -> &Arc<ResolverRegistry> {
        &self.resolvers
    }

    /// Endpoint advertised for this process, read at every call
    pub fn advertised_endpoint(&self) -> String {
        advertised_endpoint(&self.config.pod_ip.resolve())
    }

    /// Register the current process under `target`.
    ///
    /// `_endpoint` is ignored: the advertised endpoint always comes from the
    /// pod IP. An empty target is a no-op.
    pub async fn register_service(
        &self,
        target: &str,
        _endpoint: &str,
    ) -> Result<(), DriverError> {
        if target.is_empty() {
            return Ok(());
        }

        let raw = target;
        let target = Target::parse(raw)?;
        if let Scheme::Unknown(scheme) = &target.scheme {
            return Err(DriverError::UnknownScheme(scheme.clone()));
        }
        if target.service_name.is_empty() {
            return Err(DriverError::Parse {
                input: raw.to_string(),
                reason: "empty service name".to_string(),
            });
        }

        let registry = self.build_registry(&target).await?;
        let instance = ServiceInstance::new(
            target.service_name.as_str(),
            vec![self.advertised_endpoint()],
        );

        let resolver = DiscoveryResolver::new(registry.clone()).with_insecure(true);
        self.resolvers.register(Arc::new(resolver));

        debug!(
            "Registering service: scheme={}, name={}, endpoints={:?}",
            target.scheme, instance.name, instance.endpoints
        );
        registry
            .register(&instance)
            .await
            .map_err(DriverError::Registration)
    }

    async fn build_registry(
        &self,
        target: &Target,
    ) -> Result<Arc<dyn ServiceRegistry>, DriverError> {
        match &target.scheme {
            Scheme::Discovery | Scheme::Etcd => self
                .factory
                .etcd(target.hosts())
                .await
                .map_err(DriverError::ConnectionSetup),
            Scheme::Consul => self
                .factory
                .consul(target.first_host())
                .map_err(DriverError::ConnectionSetup),
            Scheme::Polaris => {
                match self.factory.polaris(
                    &self.config.polaris_config_path,
                    self.config.polaris_policy.clone(),
                ) {
                    Ok(registry) => Ok(registry),
                    Err(e) => (self.config.fatal_handler)(&e),
                }
            }
            Scheme::Unknown(scheme) => Err(DriverError::UnknownScheme(scheme.clone())),
        }
    }
}

impl Default for KratosDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionDriver for KratosDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    /// Resolvers are installed by `register_service`
    fn register_addr_resolver(&self) {}

    async fn register_service(&self, target: &str, endpoint: &str) -> anyhow::Result<()> {
        KratosDriver::register_service(self, target, endpoint).await?;
        Ok(())
    }

    fn parse_server_method(&self, uri: &str) -> anyhow::Result<(String, String)> {
        Ok(method::parse_server_method(uri)?)
    }
}
