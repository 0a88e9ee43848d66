use thiserror::Error;

/// A3S manifest tooling error types
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Image reference could not be parsed
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Registry reports the reference as unknown
    #[error("Manifest not found: {reference}")]
    ManifestNotFound { reference: String },

    /// Endpoint or protocol does not support the requested content
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Hard transport failure (connection refused, reset, TLS failure)
    #[error("Transport error: {url} - {message}")]
    TransportError { url: String, message: String },

    /// Timeout error
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// Registry refused our credentials
    #[error("Unauthorized: {registry} - {message}")]
    Unauthorized { registry: String, message: String },

    /// Malformed digest string
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Content hashed to a different digest than expected
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Registry accepted a push but did not confirm the expected digest
    #[error("Push verification failed: {0}")]
    PushVerificationFailed(String),

    /// Every candidate endpoint was exhausted
    #[error("No reachable endpoint: {0}")]
    NoReachableEndpoint(String),

    /// No local transaction exists for the reference
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// A local transaction already exists for the reference
    #[error("Transaction already exists: {0} (use --amend to modify it)")]
    TransactionExists(String),

    /// Member sourced from a different registry host than the target
    #[error("Origin mismatch: member registry {member} differs from target registry {target}")]
    OriginMismatch { member: String, target: String },

    /// A member cannot be placed in a manifest list
    #[error("Invalid list member: {0}")]
    InvalidMember(String),

    /// Annotation was rejected
    #[error("Invalid annotation: {0}")]
    InvalidAnnotation(String),

    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    RegistryError { registry: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl ManifestError {
    /// Whether this error only says the endpoint does not support the request.
    ///
    /// Endpoint negotiation keeps these as the reported error only while no
    /// stronger error has been seen.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ManifestError::UnsupportedMediaType(_))
    }
}

impl From<serde_json::Error> for ManifestError {
    fn from(err: serde_json::Error) -> Self {
        ManifestError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ManifestError {
    fn from(err: serde_yaml::Error) -> Self {
        ManifestError::SerializationError(err.to_string())
    }
}

/// Result type alias for manifest operations
pub type Result<T> = std::result::Result<T, ManifestError>;
