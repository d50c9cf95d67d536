//! Backend-neutral registry trait

use async_trait::async_trait;
use dtm_driver_common::ServiceInstance;

use crate::error::Result;

/// A service registry backend.
///
/// Implementations own any heartbeat or lease keep-alive they need to keep a
/// registration alive; callers only see the synchronous outcome of the
/// initial registration.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Backend name used in logs
    fn kind(&self) -> &'static str;

    /// Announce an instance
    async fn register(&self, instance: &ServiceInstance) -> Result<()>;

    /// Withdraw an instance and stop its heartbeat
    async fn deregister(&self, instance: &ServiceInstance) -> Result<()>;

    /// Live instances of a service
    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>>;
}
