//! Registration target parsing
//!
//! A target looks like `<scheme>://<host>[,<host>...]/<service-name>` where
//! the scheme selects the registry backend.

use std::fmt;

use crate::error::DriverError;
use crate::uri;

/// Registry backend selected by the target scheme
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Default scheme, backed by etcd
    Discovery,
    Etcd,
    Consul,
    Polaris,
    Unknown(String),
}

impl Scheme {
    pub const DISCOVERY: &'static str = "discovery";
    pub const ETCD: &'static str = "etcd";
    pub const CONSUL: &'static str = "consul";
    pub const POLARIS: &'static str = "polaris";

    pub fn as_str(&self) -> &str {
        match self {
            Scheme::Discovery => Self::DISCOVERY,
            Scheme::Etcd => Self::ETCD,
            Scheme::Consul => Self::CONSUL,
            Scheme::Polaris => Self::POLARIS,
            Scheme::Unknown(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Scheme::Unknown(_))
    }
}

impl From<&str> for Scheme {
    fn from(s: &str) -> Self {
        match s {
            Self::DISCOVERY => Scheme::Discovery,
            Self::ETCD => Scheme::Etcd,
            Self::CONSUL => Scheme::Consul,
            Self::POLARIS => Scheme::Polaris,
            other => Scheme::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed registration target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: Scheme,
    /// Raw host part, possibly a comma-joined list
    pub host: String,
    /// Service name, the path without its leading slash
    pub service_name: String,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self, DriverError> {
        let uri = uri::parse(raw)?;
        let path: &str = &uri.path;
        let service_name = path.strip_prefix('/').unwrap_or(path);
        Ok(Self {
            scheme: Scheme::from(uri.scheme.as_str()),
            host: uri.host().to_string(),
            service_name: service_name.to_string(),
        })
    }

    /// Every host of the list, in order; empty entries are kept
    pub fn hosts(&self) -> Vec<String> {
        self.host.split(',').map(str::to_string).collect()
    }

    /// First host of the list
    pub fn first_host(&self) -> &str {
        self.host.split(',').next().unwrap_or_default()
    }
}
