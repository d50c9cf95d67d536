//! dtm driver for etcd, Consul and Polaris registries
//!
//! This crate provides:
//! - `KratosDriver`: registers the current process under a target such as
//!   `etcd://h1:2379,h2:2379/pay.order` and installs the `discovery`
//!   resolver bound to that registry
//! - Method URI parsing (`server/method` and full URIs)
//! - `install()` to register the driver with the host once at startup

pub mod config;
pub mod driver;
pub mod error;
pub mod factory;
pub mod method;
pub mod target;
mod uri;

use std::sync::{Arc, Once};

use dtm_driver_common::DriverRegistry;

pub use config::{DriverConfig, FatalHandler, PodIp};
pub use driver::KratosDriver;
pub use error::DriverError;
pub use factory::{DefaultRegistryFactory, RegistryFactory};
pub use method::parse_server_method;
pub use target::{Scheme, Target};

/// Name the host uses to select this driver
pub const DRIVER_NAME: &str = "dtm-driver-kratos2";

static INSTALL: Once = Once::new();

/// Register the driver in the process-wide driver registry.
///
/// Only the first call has an effect.
pub fn install() {
    INSTALL.call_once(|| {
        DriverRegistry::global().register(Arc::new(KratosDriver::new()));
    });
}
