use thiserror::Error;

/// Crate-wide error type.
///
/// Library code never swallows these: every variant propagates to the caller
/// (CLI, embedding application) which decides how to present it.
#[derive(Error, Debug)]
pub enum EegError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("unknown pipeline step: {0}")]
    UnknownStep(String),

    #[error("unknown feature extractor: {0}")]
    UnknownExtractor(String),

    #[error("unknown model type: {0}")]
    UnknownModelType(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("storage integrity violation: {0}")]
    StorageIntegrity(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("payload encode error: {0}")]
    PayloadEncode(#[from] rmp_serde::encode::Error),

    #[error("payload decode error: {0}")]
    PayloadDecode(#[from] rmp_serde::decode::Error),

    #[error("computation failed: {0}")]
    Computation(String),
}

pub type Result<T> = std::result::Result<T, EegError>;
