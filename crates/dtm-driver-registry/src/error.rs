//! Registry client error types

/// Errors raised by registry backends and resolvers
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("polaris error: code={code}, info={info}")]
    Polaris { code: u32, info: String },

    #[error("lease {0} expired")]
    LeaseExpired(i64),

    #[error("resolver error: {0}")]
    Resolver(String),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
