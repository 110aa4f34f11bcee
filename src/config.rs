/*!
 * Environment-provided configuration
 *
 * Every knob is optional with a safe default. Invalid values are rejected
 * up front, before any I/O happens.
 */

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::catalog::SecretCategory;
use crate::error::{SecretsError, SecretsResult};

/// Default PBKDF2 iteration count for the encryption engine
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Lowest iteration count the engine will accept
pub const MIN_KDF_ITERATIONS: u32 = 10_000;

/// Default backup retention in days
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Default cap on the expiring-soon warning window in days
pub const DEFAULT_WARNING_DAYS: u32 = 14;

/// Resolved configuration for all lifecycle components
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the store, metadata, key and rotation log
    pub secrets_dir: PathBuf,
    /// Directory holding backup archives
    pub backup_dir: PathBuf,
    /// PBKDF2 iteration count
    pub kdf_iterations: u32,
    /// Age threshold for backup cleanup
    pub retention_days: u32,
    /// Cap on the expiring-soon window
    pub warning_days: u32,
    /// Per-category rotation interval overrides in days
    pub interval_overrides: HashMap<SecretCategory, u32>,
}

impl Default for Config {
    fn default() -> Self {
        let secrets_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".secret-lifecycle")
            .join("secrets");
        let backup_dir = secrets_dir.join("backups");

        Self {
            secrets_dir,
            backup_dir,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            retention_days: DEFAULT_RETENTION_DAYS,
            warning_days: DEFAULT_WARNING_DAYS,
            interval_overrides: HashMap::new(),
        }
    }
}

impl Config {
    /// Build a configuration from the process environment
    ///
    /// Recognised variables: `SECRETS_DIR`, `SECRETS_BACKUP_DIR`,
    /// `SECRETS_KDF_ITERATIONS`, `SECRETS_BACKUP_RETENTION_DAYS`,
    /// `SECRETS_ROTATION_WARNING_DAYS` and `SECRETS_INTERVAL_<CATEGORY>`.
    pub fn from_env() -> SecretsResult<Self> {
        let mut config = Config::default();

        if let Ok(dir) = env::var("SECRETS_DIR") {
            config.secrets_dir = PathBuf::from(&dir);
            // Backup dir follows the store dir unless overridden separately
            config.backup_dir = config.secrets_dir.join("backups");
        }
        if let Ok(dir) = env::var("SECRETS_BACKUP_DIR") {
            config.backup_dir = PathBuf::from(dir);
        }

        if let Ok(raw) = env::var("SECRETS_KDF_ITERATIONS") {
            let iterations = parse_positive("SECRETS_KDF_ITERATIONS", &raw)?;
            if iterations < MIN_KDF_ITERATIONS {
                return Err(SecretsError::ConfigError(format!(
                    "SECRETS_KDF_ITERATIONS must be at least {}, got {}",
                    MIN_KDF_ITERATIONS, iterations
                )));
            }
            config.kdf_iterations = iterations;
        }

        if let Ok(raw) = env::var("SECRETS_BACKUP_RETENTION_DAYS") {
            config.retention_days = parse_positive("SECRETS_BACKUP_RETENTION_DAYS", &raw)?;
        }

        if let Ok(raw) = env::var("SECRETS_ROTATION_WARNING_DAYS") {
            config.warning_days = parse_positive("SECRETS_ROTATION_WARNING_DAYS", &raw)?;
        }

        for category in SecretCategory::ALL {
            let var = format!("SECRETS_INTERVAL_{}", category.as_str().to_uppercase());
            if let Ok(raw) = env::var(&var) {
                let days = parse_positive(&var, &raw)?;
                config.interval_overrides.insert(category, days);
            }
        }

        Ok(config)
    }

    /// Effective rotation interval for a category, override-aware
    pub fn interval_days(&self, category: SecretCategory) -> u32 {
        self.interval_overrides
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_interval_days())
    }

    /// Path of the plaintext store document
    pub fn store_path(&self) -> PathBuf {
        self.secrets_dir.join("secrets.env")
    }

    /// Path of the encrypted store
    pub fn ciphertext_path(&self) -> PathBuf {
        self.secrets_dir.join("secrets.env.enc")
    }

    /// Path of the encryption metadata sidecar
    pub fn metadata_path(&self) -> PathBuf {
        self.secrets_dir.join("secrets.env.enc.json")
    }

    /// Path of the 32-byte master key file
    pub fn master_key_path(&self) -> PathBuf {
        self.secrets_dir.join("master.key")
    }

    /// Directory holding per-category rotation logs
    pub fn rotation_log_dir(&self) -> PathBuf {
        self.secrets_dir.join("rotation.log")
    }

    /// Path of the advisory lock file guarding mutating operations
    pub fn lock_path(&self) -> PathBuf {
        self.secrets_dir.join(".secrets.lock")
    }
}

fn parse_positive(var: &str, raw: &str) -> SecretsResult<u32> {
    match raw.trim().parse::<u32>() {
        Ok(0) => Err(SecretsError::ConfigError(format!(
            "{} must be greater than zero",
            var
        ))),
        Ok(n) => Ok(n),
        Err(_) => Err(SecretsError::ConfigError(format!(
            "{} is not a valid day/iteration count: '{}'",
            var, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths_hang_off_secrets_dir() {
        let config = Config {
            secrets_dir: PathBuf::from("/tmp/sl-test"),
            ..Config::default()
        };
        assert_eq!(config.store_path(), PathBuf::from("/tmp/sl-test/secrets.env"));
        assert_eq!(
            config.ciphertext_path(),
            PathBuf::from("/tmp/sl-test/secrets.env.enc")
        );
        assert_eq!(
            config.metadata_path(),
            PathBuf::from("/tmp/sl-test/secrets.env.enc.json")
        );
        assert_eq!(
            config.master_key_path(),
            PathBuf::from("/tmp/sl-test/master.key")
        );
    }

    #[test]
    fn test_interval_override() {
        let mut config = Config::default();
        assert_eq!(config.interval_days(SecretCategory::Jwt), 90);
        config.interval_overrides.insert(SecretCategory::Jwt, 30);
        assert_eq!(config.interval_days(SecretCategory::Jwt), 30);
        // Other categories untouched
        assert_eq!(config.interval_days(SecretCategory::Session), 30);
        assert_eq!(config.interval_days(SecretCategory::Tron), 365);
    }

    #[test]
    fn test_parse_positive_rejects_zero_and_garbage() {
        assert!(parse_positive("X", "0").is_err());
        assert!(parse_positive("X", "not-a-number").is_err());
        assert!(parse_positive("X", "-3").is_err());
        assert_eq!(parse_positive("X", "42").unwrap(), 42);
        assert_eq!(parse_positive("X", " 7 ").unwrap(), 7);
    }
}
