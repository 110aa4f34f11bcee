/*!
 * Secret Lifecycle Management
 *
 * This crate manages the credential material of a deployment: it
 * generates secrets per category from a fixed catalog, encrypts the
 * store at rest with AES-256-GCM under a PBKDF2-derived key, rotates
 * material past its per-category maximum age, validates completeness
 * and format, and snapshots everything into restorable archives.
 *
 * The store is a single `NAME=value` document with 0600 permissions in
 * a 0700 directory. All mutating operations serialise through an
 * exclusive advisory lock; readers rely on atomic-rename writes and
 * never block.
 */

/// Secret category catalog and random material generation
pub mod catalog;

/// Durable secret store and advisory locking
pub mod store;

/// AES-GCM wrapping of the store with a metadata sidecar
pub mod encryption;

/// Rotation policy engine and append-only history
pub mod rotation;

/// Read-only completeness/freshness/format validation
pub mod validator;

/// Backup, restore and retention cleanup
pub mod backup;

/// CLI-level orchestration of the other components
pub mod coordinator;

/// Environment-provided configuration
pub mod config;

/// Common error types
pub mod error;

/// Randomness and encoding helpers
pub mod utils;

// Re-export main types for convenience
pub use backup::{BackupManager, BackupTargets};
pub use catalog::{SecretCategory, SecretEncoding, SecretSpec};
pub use config::Config;
pub use coordinator::{Coordinator, ProvisionOptions, ProvisionReport, StatusReport};
pub use encryption::{EncryptedState, EncryptionEngine, EncryptionMetadata};
pub use error::{SecretsError, SecretsResult};
pub use rotation::{CategoryStatus, RotationEngine, RotationSummary, SecretStatus};
pub use store::{SecretStore, StoreLock};
