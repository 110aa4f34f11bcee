/*!
 * Encryption engine for the secret store
 *
 * Wraps and unwraps the store document with AES-256-GCM under a key
 * derived from the master key file via PBKDF2-HMAC-SHA256. Non-secret
 * parameters (salt, IV, iteration count) live in a JSON metadata sidecar
 * that is always replaced together with the ciphertext.
 */

mod engine;

pub use engine::{
    EncryptedState, EncryptionEngine, EncryptionMetadata, ALGORITHM, IV_LEN, MASTER_KEY_LEN,
    SALT_LEN,
};

#[cfg(test)]
mod tests;
