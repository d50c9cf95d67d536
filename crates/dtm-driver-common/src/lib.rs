//! dtm driver common - shared SPI, constants and models
//!
//! This crate provides the pieces shared by every registry driver:
//! - The `TransactionDriver` capability trait consumed by the host framework
//! - The host-side `DriverRegistry` used to select the active driver
//! - The `ServiceInstance` record handed to registry backends
//! - Endpoint helpers and common constants

pub mod driver;
pub mod model;

pub use driver::{DriverLookupError, DriverRegistry, TransactionDriver};
pub use model::{Endpoint, ServiceInstance};

/// Port advertised for the current process, not configurable
pub const ADVERTISED_PORT: u16 = 36790;

/// Scheme of the advertised endpoint
pub const ADVERTISED_SCHEME: &str = "grpc";

/// Environment variable holding the pod IP
pub const POD_IP_ENV: &str = "POD_IP";

/// Build the endpoint advertised for the given pod IP.
///
/// An empty IP is kept as-is and yields `grpc://:36790`.
pub fn advertised_endpoint(pod_ip: &str) -> String {
    format!("{}://{}:{}", ADVERTISED_SCHEME, pod_ip, ADVERTISED_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advertised_endpoint() {
        assert_eq!(advertised_endpoint("10.0.0.5"), "grpc://10.0.0.5:36790");
        assert_eq!(advertised_endpoint(""), "grpc://:36790");
    }
}
