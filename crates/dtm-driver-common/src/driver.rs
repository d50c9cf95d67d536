//! Driver SPI consumed by the transaction coordination host
//!
//! A driver teaches the host how to register its endpoint in a service
//! registry and how to split call targets into server and method parts.
//! Drivers are registered once at startup and selected by name.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::info;

/// Capability interface implemented by every registry driver
#[async_trait]
pub trait TransactionDriver: Send + Sync {
    /// Unique driver name
    fn name(&self) -> &str;

    /// Install global address resolvers before any registration happens
    fn register_addr_resolver(&self);

    /// Register the current process under `target`
    async fn register_service(&self, target: &str, endpoint: &str) -> anyhow::Result<()>;

    /// Split a call target into `(server, method)`
    fn parse_server_method(&self, uri: &str) -> anyhow::Result<(String, String)>;
}

/// Errors raised when selecting a driver
#[derive(Debug, thiserror::Error)]
pub enum DriverLookupError {
    #[error("no dtm driver: {0}")]
    UnknownDriver(String),
}

/// Registry of available drivers, with one optionally selected as current
pub struct DriverRegistry {
    drivers: DashMap<String, Arc<dyn TransactionDriver>>,
    current: RwLock<Option<Arc<dyn TransactionDriver>>>,
}

static GLOBAL: LazyLock<DriverRegistry> = LazyLock::new(DriverRegistry::new);

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: DashMap::new(),
            current: RwLock::new(None),
        }
    }

    /// Process-wide registry used by drivers installed at startup
    pub fn global() -> &'static DriverRegistry {
        &GLOBAL
    }

    /// Register a driver; a later driver with the same name replaces the earlier one
    pub fn register(&self, driver: Arc<dyn TransactionDriver>) {
        let name = driver.name().to_string();
        self.drivers.insert(name.clone(), driver);
        info!("dtm driver '{}' registered", name);
    }

    /// Select the driver to use.
    ///
    /// An empty name keeps the current selection. Selecting a driver runs its
    /// resolver hook.
    pub fn use_driver(&self, name: &str) -> Result<(), DriverLookupError> {
        if name.is_empty() {
            return Ok(());
        }
        let driver = self
            .get(name)
            .ok_or_else(|| DriverLookupError::UnknownDriver(name.to_string()))?;
        driver.register_addr_resolver();
        *self.current.write() = Some(driver);
        info!("dtm driver '{}' in use", name);
        Ok(())
    }

    /// Get a driver by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn TransactionDriver>> {
        self.drivers.get(name).map(|d| d.value().clone())
    }

    /// The currently selected driver
    pub fn current(&self) -> Option<Arc<dyn TransactionDriver>> {
        self.current.read().clone()
    }

    /// Names of all registered drivers, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
