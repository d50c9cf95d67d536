//! Scheme-keyed address resolvers
//!
//! A `ResolverRegistry` maps target schemes (`discovery`, `direct`, ...) to
//! builders that turn a target URI into dialable addresses. The registry is
//! append-only: registering a scheme twice keeps both bindings and lookups
//! return the most recent one.

pub mod direct;
pub mod discovery;

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use parking_lot::RwLock;
use tonic::transport::{Channel, Endpoint as ChannelEndpoint};
use tracing::debug;
use url::Url;

use crate::error::{RegistryError, Result};

pub use self::direct::DirectResolver;
pub use self::discovery::DiscoveryResolver;

/// Builds addresses for targets of one scheme
#[async_trait]
pub trait ResolverBuilder: Send + Sync {
    /// Scheme this builder is bound to
    fn scheme(&self) -> &str;

    /// Resolve a target into `host:port` addresses
    async fn resolve(&self, target: &Url) -> Result<Vec<String>>;

    /// Dial resolved addresses without TLS
    fn insecure(&self) -> bool {
        true
    }
}

/// Append-only registry of resolver builders
pub struct ResolverRegistry {
    bindings: RwLock<Vec<Arc<dyn ResolverBuilder>>>,
}

static GLOBAL: LazyLock<Arc<ResolverRegistry>> =
    LazyLock::new(|| Arc::new(ResolverRegistry::with_defaults()));

impl ResolverRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(Vec::new()),
        }
    }

    /// A registry with the `direct` resolver installed
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(DirectResolver));
        registry
    }

    /// Process-wide registry shared with RPC client code
    pub fn global() -> Arc<ResolverRegistry> {
        GLOBAL.clone()
    }

    /// Add a binding; earlier bindings for the same scheme stay in place
    pub fn register(&self, builder: Arc<dyn ResolverBuilder>) {
        debug!("Registering address resolver: scheme={}", builder.scheme());
        self.bindings.write().push(builder);
    }

    /// Most recently registered builder for a scheme
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn ResolverBuilder>> {
        self.bindings
            .read()
            .iter()
            .rev()
            .find(|b| b.scheme() == scheme)
            .cloned()
    }

    /// All bindings in registration order
    pub fn bindings(&self) -> Vec<Arc<dyn ResolverBuilder>> {
        self.bindings.read().clone()
    }

    /// Schemes of all bindings in registration order, duplicates included
    pub fn schemes(&self) -> Vec<String> {
        self.bindings
            .read()
            .iter()
            .map(|b| b.scheme().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    /// Resolve a target such as `discovery:///pay.order` into addresses
    pub async fn resolve(&self, target: &str) -> Result<Vec<String>> {
        let (builder, url) = self.builder_for(target)?;
        builder.resolve(&url).await
    }

    /// Resolve a target and open a load-balanced channel over its addresses
    pub async fn connect(&self, target: &str) -> Result<Channel> {
        let (builder, url) = self.builder_for(target)?;
        let addresses = builder.resolve(&url).await?;
        if addresses.is_empty() {
            return Err(RegistryError::Resolver(format!(
                "no address available for '{}'",
                target
            )));
        }

        let scheme = if builder.insecure() { "http" } else { "https" };
        let endpoints = addresses
            .iter()
            .map(|addr| {
                ChannelEndpoint::from_shared(format!("{}://{}", scheme, addr))
                    .map_err(|_| RegistryError::InvalidEndpoint(addr.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Connecting {} via {:?}", target, addresses);
        Ok(Channel::balance_list(endpoints.into_iter()))
    }

    fn builder_for(&self, target: &str) -> Result<(Arc<dyn ResolverBuilder>, Url)> {
        let url = Url::parse(target)
            .map_err(|e| RegistryError::Resolver(format!("invalid target '{}': {}", target, e)))?;
        let builder = self.get(url.scheme()).ok_or_else(|| {
            RegistryError::Resolver(format!("no resolver for scheme '{}'", url.scheme()))
        })?;
        Ok((builder, url))
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Target path without its leading slash
pub(crate) fn target_path(target: &Url) -> &str {
    let path = target.path();
    path.strip_prefix('/').unwrap_or(path)
}
