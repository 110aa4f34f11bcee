use super::*;
use crate::config::Config;
use crate::store::SecretStore;
use tempfile::tempdir;

fn test_config(dir: &std::path::Path) -> Config {
    Config {
        secrets_dir: dir.to_path_buf(),
        backup_dir: dir.join("backups"),
        // Keep tests fast; production default is 100k
        kdf_iterations: crate::config::MIN_KDF_ITERATIONS,
        ..Config::default()
    }
}

fn sample_store(config: &Config) -> SecretStore {
    let mut store = SecretStore::empty(config.store_path());
    store.upsert("JWT_SECRET_KEY", "abc123");
    store.upsert("SESSION_ENCRYPTION_KEY", "deadbeef");
    store
}

#[test]
fn test_encrypt_decrypt_round_trip() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = EncryptionEngine::new(&config);
    let store = sample_store(&config);

    let metadata = engine.encrypt_store(&store).unwrap();
    assert_eq!(metadata.algorithm, ALGORITHM);
    assert_eq!(engine.state(), EncryptedState::Present);

    let decrypted = engine.decrypt_to_store(&config.store_path()).unwrap();
    assert_eq!(decrypted.all(), store.all());
}

#[test]
fn test_salt_and_iv_fresh_per_encryption() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = EncryptionEngine::new(&config);
    let store = sample_store(&config);

    let first = engine.encrypt_store(&store).unwrap();
    let second = engine.encrypt_store(&store).unwrap();

    assert_ne!(first.salt, second.salt);
    assert_ne!(first.iv, second.iv);
}

#[test]
fn test_metadata_fields_round_trip() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = EncryptionEngine::new(&config);
    engine.encrypt_store(&sample_store(&config)).unwrap();

    let metadata = engine.load_metadata().unwrap();
    assert_eq!(metadata.iterations, config.kdf_iterations);
    assert_eq!(metadata.key_file, config.master_key_path());
    assert_eq!(hex::decode(&metadata.salt).unwrap().len(), SALT_LEN);
    assert_eq!(hex::decode(&metadata.iv).unwrap().len(), IV_LEN);
}

#[test]
fn test_decrypt_with_wrong_key_fails_and_preserves_plaintext() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = EncryptionEngine::new(&config);

    let store = sample_store(&config);
    store.save().unwrap();
    let before = std::fs::read(config.store_path()).unwrap();

    engine.encrypt_store(&store).unwrap();

    // Replace the master key after encryption
    std::fs::write(config.master_key_path(), [0x42u8; MASTER_KEY_LEN]).unwrap();

    let result = engine.decrypt_to_store(&config.store_path());
    assert!(matches!(
        result,
        Err(crate::error::SecretsError::DecryptionError(_))
    ));

    // Plaintext store untouched, byte for byte
    let after = std::fs::read(config.store_path()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_tampered_ciphertext_fails_authentication() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = EncryptionEngine::new(&config);
    engine.encrypt_store(&sample_store(&config)).unwrap();

    let mut ciphertext = std::fs::read(config.ciphertext_path()).unwrap();
    ciphertext[0] ^= 0x01;
    std::fs::write(config.ciphertext_path(), &ciphertext).unwrap();

    let result = engine.decrypt_to_store(&config.store_path());
    assert!(matches!(
        result,
        Err(crate::error::SecretsError::DecryptionError(_))
    ));
}

#[test]
fn test_missing_metadata_fails_closed() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = EncryptionEngine::new(&config);
    engine.encrypt_store(&sample_store(&config)).unwrap();

    std::fs::remove_file(config.metadata_path()).unwrap();
    assert_eq!(engine.state(), EncryptedState::Inconsistent);

    let result = engine.decrypt_to_store(&config.store_path());
    assert!(matches!(
        result,
        Err(crate::error::SecretsError::InconsistentState(_))
    ));
}

#[test]
fn test_decrypt_without_any_ciphertext() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = EncryptionEngine::new(&config);

    assert_eq!(engine.state(), EncryptedState::Absent);
    assert!(engine.decrypt_to_store(&config.store_path()).is_err());
}

#[test]
fn test_master_key_created_once_with_correct_length() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = EncryptionEngine::new(&config);

    engine.encrypt_store(&sample_store(&config)).unwrap();
    let key_first = std::fs::read(config.master_key_path()).unwrap();
    assert_eq!(key_first.len(), MASTER_KEY_LEN);

    engine.encrypt_store(&sample_store(&config)).unwrap();
    let key_second = std::fs::read(config.master_key_path()).unwrap();
    // Existing key is reused, not regenerated
    assert_eq!(key_first, key_second);
}

#[test]
fn test_malformed_metadata_is_an_error() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = EncryptionEngine::new(&config);
    engine.encrypt_store(&sample_store(&config)).unwrap();

    std::fs::write(config.metadata_path(), "{not json").unwrap();
    assert!(engine.decrypt_to_store(&config.store_path()).is_err());
}

#[cfg(unix)]
#[test]
fn test_key_and_ciphertext_modes() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = EncryptionEngine::new(&config);
    engine.encrypt_store(&sample_store(&config)).unwrap();

    for path in [
        config.master_key_path(),
        config.ciphertext_path(),
        config.metadata_path(),
    ] {
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600, "wrong mode on {}", path.display());
    }
}
