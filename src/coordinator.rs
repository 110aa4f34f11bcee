/*!
 * CLI-level orchestration
 *
 * The coordinator is the only component aware of the call order between
 * the generator, store, rotation engine, validator and backup manager.
 * It is also the single place that decides whether a destructive action
 * needs operator confirmation.
 */

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use tracing::{info, warn};

use crate::backup::{BackupManager, BackupTargets};
use crate::catalog::SecretCategory;
use crate::config::Config;
use crate::encryption::{EncryptionEngine, EncryptionMetadata};
use crate::error::{SecretsError, SecretsResult};
use crate::rotation::{CategoryStatus, RotationEngine, RotationSummary, SecretStatus};
use crate::store::{ensure_private_dir, restrict_file, SecretStore, StoreLock};
use crate::validator;

/// Options for a provisioning pass
#[derive(Debug, Clone, Copy, Default)]
pub struct ProvisionOptions {
    /// Rotate everything, not just expired categories
    pub force: bool,
    /// Report what would happen without mutating anything
    pub dry_run: bool,
    /// Snapshot the store after generation
    pub backup: bool,
    /// Restrict the pass to one category
    pub category: Option<SecretCategory>,
}

/// Outcome of a provisioning pass
#[derive(Debug, Clone, Default)]
pub struct ProvisionReport {
    /// Per-category rotation outcomes (empty when nothing was due)
    pub rotation: RotationSummary,
    /// Names still missing or defaulted after the pass
    pub unresolved: Vec<String>,
    /// Format violations found in the final validation
    pub format_violations: Vec<String>,
    /// Archive written when a backup was requested
    pub backup_archive: Option<PathBuf>,
}

impl ProvisionReport {
    /// Whether the final validation came back clean
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty() && self.format_violations.is_empty()
    }
}

/// Read-only summary of the live state
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub store_exists: bool,
    pub entry_count: usize,
    pub encrypted: crate::encryption::EncryptedState,
    pub categories: Vec<CategoryStatus>,
}

/// Sequences the lifecycle components
#[derive(Debug, Clone)]
pub struct Coordinator {
    config: Config,
    rotation: RotationEngine,
    backup: BackupManager,
}

impl Coordinator {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            rotation: RotationEngine::new(config),
            backup: BackupManager::new(config),
        }
    }

    /// Full provisioning sequence
    ///
    /// Check state, generate what is missing or expired, validate, enforce
    /// permissions, optionally back up, then re-validate. The returned
    /// report is clean only if the final validation found nothing wrong.
    pub fn provision(&self, opts: ProvisionOptions) -> SecretsResult<ProvisionReport> {
        let mut report = ProvisionReport::default();

        let statuses = match opts.category {
            Some(category) => vec![self.rotation.classify(category)?],
            None => self.rotation.classify_all()?,
        };
        let due: Vec<SecretCategory> = statuses
            .iter()
            .filter(|s| s.status == SecretStatus::Expired)
            .map(|s| s.category)
            .collect();

        if due.is_empty() && !opts.force {
            info!("all requested categories are provisioned and current");
            self.final_validation(&mut report)?;
            return Ok(report);
        }

        match opts.category {
            Some(category) => {
                let rotated = self.rotation.rotate_category(category, opts.dry_run)?;
                report.rotation.outcomes.push(crate::rotation::RotationOutcome {
                    category,
                    rotated,
                    error: None,
                });
            }
            None => {
                report.rotation = self.rotation.rotate_all(opts.force, opts.dry_run)?;
            }
        }

        if opts.dry_run {
            info!("dry-run: skipping validation, permissions and backup");
            return Ok(report);
        }

        if !opts.force && report.rotation.failed() > 0 {
            warn!(
                failed = report.rotation.failed(),
                "some categories failed; continuing with validation"
            );
        }

        self.enforce_permissions()?;

        if opts.backup {
            match self.backup.backup(&BackupTargets::default()) {
                Ok(archive) => report.backup_archive = Some(archive),
                // A failed snapshot must not undo a successful generation
                Err(e) => warn!(error = %e, "post-generation backup failed"),
            }
        }

        self.final_validation(&mut report)?;
        Ok(report)
    }

    fn final_validation(&self, report: &mut ProvisionReport) -> SecretsResult<()> {
        let store = SecretStore::load_or_empty(self.config.store_path())?;
        report.unresolved = validator::check(&store);
        report.format_violations = validator::validate_format(&store)
            .into_iter()
            .map(|v| v.to_string())
            .collect();
        Ok(())
    }

    /// Re-assert 0700 on the secrets directory and 0600 on every live file
    pub fn enforce_permissions(&self) -> SecretsResult<()> {
        ensure_private_dir(&self.config.secrets_dir)?;
        for path in [
            self.config.store_path(),
            self.config.ciphertext_path(),
            self.config.metadata_path(),
            self.config.master_key_path(),
        ] {
            if path.exists() {
                restrict_file(&path)?;
            }
        }
        Ok(())
    }

    /// Wrap the live store at rest
    ///
    /// The store lock is taken before the document is read, so the
    /// ciphertext never captures a snapshot older than a rotation that
    /// already holds the lock. Returns the entry count and, unless this
    /// was a dry run, the metadata of the new ciphertext.
    pub fn encrypt(&self, dry_run: bool) -> SecretsResult<(usize, Option<EncryptionMetadata>)> {
        if dry_run {
            let store = SecretStore::load(self.config.store_path())?;
            return Ok((store.len(), None));
        }

        let _lock = StoreLock::acquire(&self.config.lock_path())?;
        let store = SecretStore::load(self.config.store_path())?;
        let engine = EncryptionEngine::new(&self.config);
        let metadata = engine.encrypt_store(&store)?;
        Ok((store.len(), Some(metadata)))
    }

    /// Read-only snapshot of the live state
    pub fn status(&self) -> SecretsResult<StatusReport> {
        let store = SecretStore::load_or_empty(self.config.store_path())?;
        let engine = crate::encryption::EncryptionEngine::new(&self.config);
        Ok(StatusReport {
            store_exists: store.exists(),
            entry_count: store.len(),
            encrypted: engine.state(),
            categories: self.rotation.classify_all()?,
        })
    }

    /// Gate a destructive action behind operator confirmation
    ///
    /// `force` bypasses the prompt; anything but an explicit yes cancels.
    pub fn confirm_destructive(&self, action: &str, force: bool) -> SecretsResult<()> {
        if force {
            return Ok(());
        }
        print!("{} — continue? [y/N] ", action);
        io::stdout()
            .flush()
            .map_err(SecretsError::IoError)?;

        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .map_err(SecretsError::IoError)?;
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Ok(()),
            _ => Err(SecretsError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            secrets_dir: dir.join("secrets"),
            backup_dir: dir.join("backups"),
            ..Config::default()
        }
    }

    #[test]
    fn test_provision_from_scratch_is_clean() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let coordinator = Coordinator::new(&config);

        let report = coordinator.provision(ProvisionOptions::default()).unwrap();
        assert!(report.is_clean(), "unresolved: {:?}", report.unresolved);
        assert_eq!(
            report.rotation.outcomes.len(),
            SecretCategory::ALL.len(),
            "every category should have been generated"
        );
        assert!(config.store_path().exists());
    }

    #[test]
    fn test_second_provision_is_a_no_op() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let coordinator = Coordinator::new(&config);

        coordinator.provision(ProvisionOptions::default()).unwrap();
        let before = std::fs::read(config.store_path()).unwrap();

        let report = coordinator.provision(ProvisionOptions::default()).unwrap();
        assert!(report.is_clean());
        assert!(report.rotation.outcomes.is_empty());
        assert_eq!(std::fs::read(config.store_path()).unwrap(), before);
    }

    #[test]
    fn test_forced_provision_regenerates() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let coordinator = Coordinator::new(&config);

        coordinator.provision(ProvisionOptions::default()).unwrap();
        let before = std::fs::read(config.store_path()).unwrap();

        let report = coordinator
            .provision(ProvisionOptions {
                force: true,
                ..Default::default()
            })
            .unwrap();
        assert!(report.is_clean());
        assert_ne!(std::fs::read(config.store_path()).unwrap(), before);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let coordinator = Coordinator::new(&config);

        let report = coordinator
            .provision(ProvisionOptions {
                dry_run: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(report.rotation.outcomes.len(), SecretCategory::ALL.len());
        assert!(!config.store_path().exists());
        assert!(!config.secrets_dir.exists());
    }

    #[test]
    fn test_encrypt_locks_before_reading_the_store() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let coordinator = Coordinator::new(&config);

        // Even with no store document yet, a held lock must surface as
        // busy rather than as a read failure
        let lock = StoreLock::acquire(&config.lock_path()).unwrap();
        assert!(matches!(
            coordinator.encrypt(false),
            Err(SecretsError::StoreBusy(_))
        ));
        drop(lock);

        coordinator.provision(ProvisionOptions::default()).unwrap();
        let (entries, metadata) = coordinator.encrypt(false).unwrap();
        assert_eq!(entries, crate::catalog::all_secret_names().len());
        assert!(metadata.is_some());
        assert!(config.ciphertext_path().exists());
    }

    #[test]
    fn test_encrypt_dry_run_writes_no_ciphertext() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let coordinator = Coordinator::new(&config);
        coordinator.provision(ProvisionOptions::default()).unwrap();

        let (entries, metadata) = coordinator.encrypt(true).unwrap();
        assert_eq!(entries, crate::catalog::all_secret_names().len());
        assert!(metadata.is_none());
        assert!(!config.ciphertext_path().exists());
    }

    #[test]
    fn test_provision_single_category() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let coordinator = Coordinator::new(&config);

        let report = coordinator
            .provision(ProvisionOptions {
                category: Some(SecretCategory::Jwt),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(report.rotation.outcomes.len(), 1);

        // Only the jwt names exist, so everything else is still unresolved
        let store = SecretStore::load(config.store_path()).unwrap();
        assert_eq!(store.len(), 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_provision_with_backup() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let coordinator = Coordinator::new(&config);

        let report = coordinator
            .provision(ProvisionOptions {
                backup: true,
                ..Default::default()
            })
            .unwrap();
        let archive = report.backup_archive.expect("backup should have been taken");
        assert!(archive.exists());
    }

    #[test]
    fn test_status_report() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let coordinator = Coordinator::new(&config);

        let empty = coordinator.status().unwrap();
        assert!(!empty.store_exists);
        assert_eq!(empty.entry_count, 0);

        coordinator.provision(ProvisionOptions::default()).unwrap();
        let provisioned = coordinator.status().unwrap();
        assert!(provisioned.store_exists);
        assert_eq!(
            provisioned.entry_count,
            crate::catalog::all_secret_names().len()
        );
        assert!(provisioned
            .categories
            .iter()
            .all(|c| c.status == SecretStatus::Current));
    }

    #[test]
    fn test_confirm_with_force_skips_prompt() {
        let dir = tempdir().unwrap();
        let coordinator = Coordinator::new(&test_config(dir.path()));
        assert!(coordinator.confirm_destructive("wipe it all", true).is_ok());
    }
}
