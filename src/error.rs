use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error types for secret lifecycle operations
#[derive(Error, Debug)]
pub enum SecretsError {
    /// Configuration rejected before any I/O was attempted
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A category name that is not part of the catalog
    #[error("Unknown secret category: {0}")]
    UnknownCategory(String),

    /// A secret name that is not part of the catalog
    #[error("Unknown secret name: {0}")]
    UnknownSecret(String),

    /// Error during random material generation
    #[error("Random generation error: {0}")]
    RandomGenerationError(String),

    /// The store document could not be parsed
    #[error("Malformed secret store: {0}")]
    StoreFormatError(String),

    /// A requested entry is not present in the store
    #[error("Secret '{0}' not found in store")]
    SecretNotFound(String),

    /// Another mutating operation holds the store lock
    #[error("Secret store is busy: {0}")]
    StoreBusy(String),

    /// Ciphertext and metadata disagree about the encrypted state
    #[error("Inconsistent encrypted state: {0}")]
    InconsistentState(String),

    /// Error during encryption
    #[error("Encryption error: {0}")]
    EncryptionError(String),

    /// Error during decryption or authentication
    #[error("Decryption error: {0}")]
    DecryptionError(String),

    /// Error deriving the working cipher key
    #[error("Key derivation error: {0}")]
    KeyDerivationError(String),

    /// Error during serialization/deserialization of metadata
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Filesystem failure with the offending path attached
    #[error("Filesystem error at {path}: {cause}")]
    PathError { path: PathBuf, cause: String },

    /// Error creating, reading or pruning backup archives
    #[error("Backup error: {0}")]
    BackupError(String),

    /// Error restoring from a backup archive
    #[error("Restore error: {0}")]
    RestoreError(String),

    /// Final validation reported unresolved problems
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// One or more categories failed during a batch rotation
    #[error("Rotation completed with failures: {0}")]
    PartialRotationError(String),

    /// The operator declined a destructive operation
    #[error("Operation cancelled by operator")]
    Cancelled,

    /// IO Error
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl SecretsError {
    /// Attach a path to a raw I/O failure so the operator knows what to fix.
    pub fn at_path(path: impl Into<PathBuf>, err: io::Error) -> Self {
        SecretsError::PathError {
            path: path.into(),
            cause: err.to_string(),
        }
    }
}

/// Result type alias for secret lifecycle operations
pub type SecretsResult<T> = Result<T, SecretsError>;
