use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use chrono::{DateTime, Utc};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::config::Config;
use crate::error::{SecretsError, SecretsResult};
use crate::store::{ensure_private_dir, open_private, restrict_file, SecretStore};
use crate::utils;

/// The only cipher this engine writes
pub const ALGORITHM: &str = "AES-256-GCM";

/// Salt length in bytes for key derivation
pub const SALT_LEN: usize = 16;

/// IV (nonce) length in bytes for AES-GCM
pub const IV_LEN: usize = 12;

/// Master key length in bytes
pub const MASTER_KEY_LEN: usize = 32;

/// Non-secret encryption parameters persisted beside the ciphertext
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    /// Cipher identifier, currently always `AES-256-GCM`
    pub algorithm: String,
    /// Hex-encoded KDF salt, fresh per encryption
    pub salt: String,
    /// Hex-encoded AEAD nonce, fresh per encryption
    pub iv: String,
    /// PBKDF2 iteration count used for this ciphertext
    pub iterations: u32,
    /// When this ciphertext was produced
    pub created: DateTime<Utc>,
    /// Path of the master key file this ciphertext was derived from
    pub key_file: PathBuf,
}

/// On-disk state of the encrypted pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptedState {
    /// Neither ciphertext nor metadata present
    Absent,
    /// Both present
    Present,
    /// One present without the other; all operations fail closed
    Inconsistent,
}

/// Wraps and unwraps the secret store as an atomic ciphertext/metadata pair
#[derive(Debug, Clone)]
pub struct EncryptionEngine {
    ciphertext_path: PathBuf,
    metadata_path: PathBuf,
    key_path: PathBuf,
    iterations: u32,
}

impl EncryptionEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            ciphertext_path: config.ciphertext_path(),
            metadata_path: config.metadata_path(),
            key_path: config.master_key_path(),
            iterations: config.kdf_iterations,
        }
    }

    /// Classify the on-disk ciphertext/metadata pair
    pub fn state(&self) -> EncryptedState {
        match (self.ciphertext_path.exists(), self.metadata_path.exists()) {
            (false, false) => EncryptedState::Absent,
            (true, true) => EncryptedState::Present,
            _ => EncryptedState::Inconsistent,
        }
    }

    /// Encrypt the store document and replace the ciphertext/metadata pair
    ///
    /// Salt and IV are freshly generated on every call and never reused.
    /// Both files are staged as temps first, then renamed, so an interrupted
    /// encryption leaves either the old pair or the new pair.
    pub fn encrypt_store(&self, store: &SecretStore) -> SecretsResult<EncryptionMetadata> {
        if self.state() == EncryptedState::Inconsistent {
            // Replacing both files as a pair resolves the inconsistency
            warn!("encrypted pair was inconsistent; re-encrypting replaces both files");
        }

        let master_key = self.load_or_create_master_key()?;
        let salt = utils::random_bytes(SALT_LEN)?;
        let iv = utils::random_bytes(IV_LEN)?;
        let working_key = derive_working_key(&master_key, &salt, self.iterations);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&working_key[..]));
        let mut plaintext = store.to_document().into_bytes();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_ref())
            .map_err(|e| SecretsError::EncryptionError(e.to_string()))?;
        plaintext.zeroize();

        let metadata = EncryptionMetadata {
            algorithm: ALGORITHM.to_string(),
            salt: hex::encode(&salt),
            iv: hex::encode(&iv),
            iterations: self.iterations,
            created: Utc::now(),
            key_file: self.key_path.clone(),
        };
        let metadata_json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| SecretsError::SerializationError(e.to_string()))?;

        // Stage both files, then rename ciphertext first and metadata second.
        let ct_tmp = self.ciphertext_path.with_extension("enc.tmp");
        let meta_tmp = self.metadata_path.with_extension("json.tmp");
        write_private(&ct_tmp, &ciphertext)?;
        write_private(&meta_tmp, metadata_json.as_bytes())?;
        fs::rename(&ct_tmp, &self.ciphertext_path)
            .map_err(|e| SecretsError::at_path(&self.ciphertext_path, e))?;
        fs::rename(&meta_tmp, &self.metadata_path)
            .map_err(|e| SecretsError::at_path(&self.metadata_path, e))?;

        info!(
            ciphertext = %self.ciphertext_path.display(),
            iterations = self.iterations,
            "store encrypted"
        );
        Ok(metadata)
    }

    /// Decrypt the ciphertext back into an in-memory store
    ///
    /// Fails closed if the pair is inconsistent, the metadata is malformed,
    /// the key file is missing, or authentication fails. Never writes to the
    /// live plaintext store; callers persist the returned store explicitly.
    pub fn decrypt_to_store(&self, plaintext_path: &Path) -> SecretsResult<SecretStore> {
        match self.state() {
            EncryptedState::Absent => {
                return Err(SecretsError::InconsistentState(format!(
                    "no encrypted store at {}",
                    self.ciphertext_path.display()
                )))
            }
            EncryptedState::Inconsistent => {
                return Err(SecretsError::InconsistentState(format!(
                    "ciphertext and metadata are out of step ({} / {})",
                    self.ciphertext_path.display(),
                    self.metadata_path.display()
                )))
            }
            EncryptedState::Present => {}
        }

        let metadata = self.load_metadata()?;
        if metadata.algorithm != ALGORITHM {
            return Err(SecretsError::DecryptionError(format!(
                "unsupported algorithm '{}'",
                metadata.algorithm
            )));
        }

        let salt = hex::decode(&metadata.salt)
            .map_err(|e| SecretsError::DecryptionError(format!("bad salt in metadata: {}", e)))?;
        let iv = hex::decode(&metadata.iv)
            .map_err(|e| SecretsError::DecryptionError(format!("bad IV in metadata: {}", e)))?;
        if iv.len() != IV_LEN {
            return Err(SecretsError::DecryptionError(format!(
                "IV must be {} bytes, got {}",
                IV_LEN,
                iv.len()
            )));
        }

        let master_key = self.read_master_key(&metadata.key_file)?;
        let working_key = derive_working_key(&master_key, &salt, metadata.iterations);

        let ciphertext = fs::read(&self.ciphertext_path)
            .map_err(|e| SecretsError::at_path(&self.ciphertext_path, e))?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&working_key[..]));
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
                .map_err(|_| {
                    SecretsError::DecryptionError(
                        "authentication failed; wrong key or tampered ciphertext".to_string(),
                    )
                })?,
        );

        debug!(path = %self.ciphertext_path.display(), "store decrypted");
        SecretStore::from_bytes(plaintext_path, &plaintext)
    }

    /// Read the metadata sidecar
    pub fn load_metadata(&self) -> SecretsResult<EncryptionMetadata> {
        let raw = fs::read_to_string(&self.metadata_path)
            .map_err(|e| SecretsError::at_path(&self.metadata_path, e))?;
        serde_json::from_str(&raw).map_err(|e| {
            SecretsError::SerializationError(format!(
                "malformed metadata {}: {}",
                self.metadata_path.display(),
                e
            ))
        })
    }

    /// Load the master key, generating a fresh one if the file is absent
    fn load_or_create_master_key(&self) -> SecretsResult<Zeroizing<Vec<u8>>> {
        if self.key_path.exists() {
            return self.read_master_key(&self.key_path);
        }

        let key = Zeroizing::new(utils::random_bytes(MASTER_KEY_LEN)?);
        write_private(&self.key_path, &key)?;
        info!(path = %self.key_path.display(), "master key generated");
        Ok(key)
    }

    fn read_master_key(&self, path: &Path) -> SecretsResult<Zeroizing<Vec<u8>>> {
        let key = Zeroizing::new(
            fs::read(path).map_err(|e| SecretsError::at_path(path, e))?,
        );
        if key.len() != MASTER_KEY_LEN {
            return Err(SecretsError::KeyDerivationError(format!(
                "master key at {} must be {} bytes, got {}",
                path.display(),
                MASTER_KEY_LEN,
                key.len()
            )));
        }
        Ok(key)
    }
}

/// PBKDF2-HMAC-SHA256 over the master key and a fresh salt
fn derive_working_key(master_key: &[u8], salt: &[u8], iterations: u32) -> Zeroizing<[u8; 32]> {
    let mut out = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(master_key, salt, iterations, &mut out[..]);
    out
}

fn write_private(path: &Path, bytes: &[u8]) -> SecretsResult<()> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }
    let mut file = open_private(path)?;
    file.write_all(bytes)
        .map_err(|e| SecretsError::at_path(path, e))?;
    file.sync_all()
        .map_err(|e| SecretsError::at_path(path, e))?;
    restrict_file(path)?;
    Ok(())
}
