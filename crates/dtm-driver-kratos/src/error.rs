//! Driver error types

use dtm_driver_registry::RegistryError;

/// Errors returned by the driver to the host
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Malformed target or method URI
    #[error("parse {input:?}: {reason}")]
    Parse { input: String, reason: String },

    /// Registry client could not be built
    #[error(transparent)]
    ConnectionSetup(RegistryError),

    #[error("unknown scheme: {0}")]
    UnknownScheme(String),

    /// Registry rejected or failed the registration
    #[error(transparent)]
    Registration(RegistryError),

    #[error("bad url: '{0}'. no '/' found")]
    BadMethodUri(String),
}

impl DriverError {
    pub(crate) fn parse(input: &str, reason: impl Into<String>) -> Self {
        DriverError::Parse {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
