use thiserror::Error;

/// Top-level error type for the Lighthouse intake system.
///
/// Subsystem crates define their own error types and implement
/// `From<LighthouseError>` so that the `?` operator works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LighthouseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Understanding service error: {0}")]
    Understanding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for LighthouseError {
    fn from(err: toml::de::Error) -> Self {
        LighthouseError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for LighthouseError {
    fn from(err: toml::ser::Error) -> Self {
        LighthouseError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for LighthouseError {
    fn from(err: serde_json::Error) -> Self {
        LighthouseError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Lighthouse operations.
pub type Result<T> = std::result::Result<T, LighthouseError>;
