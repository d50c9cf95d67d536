//! dtm driver registry - service registry clients and address resolvers
//!
//! This crate provides:
//! - `ServiceRegistry`: register/deregister/discover over a backend
//! - etcd, Consul and Polaris implementations
//! - `ResolverRegistry` with the `discovery` and `direct` resolvers used to
//!   turn scheme-qualified targets into gRPC channels

pub mod consul;
pub mod error;
pub mod etcd;
pub mod polaris;
pub mod registry;
pub mod resolver;

pub use consul::{ConsulClientConfig, ConsulRegistry};
pub use error::{RegistryError, Result};
pub use etcd::{EtcdRegistry, EtcdRegistryOptions};
pub use polaris::{PolarisConfigError, PolarisConfiguration, PolarisRegistry, PolarisRegistryPolicy};
pub use registry::ServiceRegistry;
pub use resolver::{DirectResolver, DiscoveryResolver, ResolverBuilder, ResolverRegistry};
