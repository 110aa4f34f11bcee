use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{SecretsError, SecretsResult};
use crate::store::{ensure_private_dir, restrict_file, StoreLock};

/// Which files a snapshot should include
#[derive(Debug, Clone, Copy)]
pub struct BackupTargets {
    pub store: bool,
    pub metadata: bool,
    /// The master key is excluded unless explicitly requested; store
    /// backups must not silently carry the key that decrypts them
    pub key: bool,
}

impl Default for BackupTargets {
    fn default() -> Self {
        Self {
            store: true,
            metadata: true,
            key: false,
        }
    }
}

/// Creates, lists, restores and prunes point-in-time store snapshots
#[derive(Debug, Clone)]
pub struct BackupManager {
    config: Config,
}

impl BackupManager {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Member names a snapshot may legally contain
    fn known_members(&self) -> Vec<(String, PathBuf)> {
        let name_of = |p: &Path| -> String {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        vec![
            (name_of(&self.config.store_path()), self.config.store_path()),
            (
                name_of(&self.config.ciphertext_path()),
                self.config.ciphertext_path(),
            ),
            (
                name_of(&self.config.metadata_path()),
                self.config.metadata_path(),
            ),
            (
                name_of(&self.config.master_key_path()),
                self.config.master_key_path(),
            ),
        ]
    }

    /// Snapshot the selected files into a new timestamped archive
    ///
    /// Copies whatever currently exists; holds no lock, so it never blocks
    /// a rotation for longer than the copy itself.
    pub fn backup(&self, targets: &BackupTargets) -> SecretsResult<PathBuf> {
        ensure_private_dir(&self.config.backup_dir)?;

        let mut members: Vec<PathBuf> = Vec::new();
        if targets.store {
            members.push(self.config.store_path());
            // The encrypted form travels with the store when present
            members.push(self.config.ciphertext_path());
        }
        if targets.metadata {
            members.push(self.config.metadata_path());
        }
        if targets.key {
            members.push(self.config.master_key_path());
        }
        members.retain(|p| p.exists());
        if members.is_empty() {
            return Err(SecretsError::BackupError(
                "nothing to back up; no requested files exist".to_string(),
            ));
        }

        let archive_path = self.fresh_archive_path()?;
        let tmp_path = archive_path.with_extension("gz.tmp");
        {
            let file = File::create(&tmp_path).map_err(|e| SecretsError::at_path(&tmp_path, e))?;
            let encoder = GzEncoder::new(file, Compression::default());
            let mut builder = Builder::new(encoder);
            for member in &members {
                // Flat archive: top-level entries are exactly the filenames
                let name = member
                    .file_name()
                    .ok_or_else(|| {
                        SecretsError::BackupError(format!("unnamed path {}", member.display()))
                    })?
                    .to_string_lossy()
                    .into_owned();
                builder
                    .append_path_with_name(member, &name)
                    .map_err(|e| SecretsError::BackupError(format!("adding {}: {}", name, e)))?;
            }
            let encoder = builder
                .into_inner()
                .map_err(|e| SecretsError::BackupError(e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| SecretsError::BackupError(e.to_string()))?;
        }
        fs::rename(&tmp_path, &archive_path)
            .map_err(|e| SecretsError::at_path(&archive_path, e))?;
        restrict_file(&archive_path)?;

        info!(
            archive = %archive_path.display(),
            members = members.len(),
            "backup created"
        );
        Ok(archive_path)
    }

    /// All archives in the backup directory, oldest first
    pub fn list(&self) -> SecretsResult<Vec<PathBuf>> {
        if !self.config.backup_dir.exists() {
            return Ok(Vec::new());
        }
        let mut archives: Vec<PathBuf> = fs::read_dir(&self.config.backup_dir)
            .map_err(|e| SecretsError::at_path(&self.config.backup_dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("secrets-backup-") && n.ends_with(".tar.gz"))
                    .unwrap_or(false)
            })
            .collect();
        archives.sort();
        Ok(archives)
    }

    /// Restore an archive over the live files
    ///
    /// Extracts into a staging directory first and verifies every member
    /// before the first rename, so a truncated or foreign archive never
    /// clobbers live state. Takes the exclusive store lock. Returns the
    /// list of files put in place.
    pub fn restore(&self, archive: &Path) -> SecretsResult<Vec<PathBuf>> {
        let _lock = StoreLock::acquire(&self.config.lock_path())?;

        if !archive.exists() {
            return Err(SecretsError::RestoreError(format!(
                "archive not found: {}",
                archive.display()
            )));
        }

        let staging = self
            .config
            .secrets_dir
            .join(format!(".restore-staging-{}", std::process::id()));
        ensure_private_dir(&staging)?;

        let result = self.restore_into(archive, &staging);
        // Staging is scratch space; best effort removal either way
        if let Err(e) = fs::remove_dir_all(&staging) {
            warn!(path = %staging.display(), error = %e, "could not remove staging dir");
        }
        result
    }

    fn restore_into(&self, archive: &Path, staging: &Path) -> SecretsResult<Vec<PathBuf>> {
        let known = self.known_members();

        let file = File::open(archive).map_err(|e| SecretsError::at_path(archive, e))?;
        let mut tar = Archive::new(GzDecoder::new(file));

        let mut staged: Vec<(String, PathBuf)> = Vec::new();
        for entry in tar
            .entries()
            .map_err(|e| SecretsError::RestoreError(e.to_string()))?
        {
            let mut entry = entry.map_err(|e| SecretsError::RestoreError(e.to_string()))?;
            let raw_path = entry
                .path()
                .map_err(|e| SecretsError::RestoreError(e.to_string()))?
                .into_owned();

            // Flat archives only: any directory component is rejected
            let name = match raw_path.file_name().and_then(|n| n.to_str()) {
                Some(n) if raw_path.components().count() == 1 => n.to_string(),
                _ => {
                    return Err(SecretsError::RestoreError(format!(
                        "unexpected nested member '{}'",
                        raw_path.display()
                    )))
                }
            };
            let Some((_, live_path)) = known.iter().find(|(n, _)| *n == name) else {
                return Err(SecretsError::RestoreError(format!(
                    "unknown member '{}' in archive",
                    name
                )));
            };

            let staged_path = staging.join(&name);
            entry
                .unpack(&staged_path)
                .map_err(|e| SecretsError::RestoreError(format!("extracting {}: {}", name, e)))?;
            staged.push((name, live_path.clone()));
        }

        if staged.is_empty() {
            return Err(SecretsError::RestoreError("archive is empty".to_string()));
        }

        // Verify extraction before the first rename touches live files
        for (name, _) in &staged {
            let staged_path = staging.join(name);
            let meta = fs::metadata(&staged_path)
                .map_err(|e| SecretsError::at_path(&staged_path, e))?;
            if meta.len() == 0 {
                return Err(SecretsError::RestoreError(format!(
                    "member '{}' extracted empty",
                    name
                )));
            }
        }

        let mut applied = Vec::new();
        for (name, live_path) in staged {
            let staged_path = staging.join(&name);
            fs::rename(&staged_path, &live_path)
                .map_err(|e| SecretsError::at_path(&live_path, e))?;
            restrict_file(&live_path)?;
            debug!(file = %live_path.display(), "restored");
            applied.push(live_path);
        }

        info!(archive = %archive.display(), files = applied.len(), "restore complete");
        Ok(applied)
    }

    /// Delete archives older than the retention threshold
    ///
    /// Returns the archives that were (or would be, under dry-run) removed.
    pub fn cleanup(&self, dry_run: bool) -> SecretsResult<Vec<PathBuf>> {
        let threshold =
            Duration::from_secs(u64::from(self.config.retention_days) * 86_400);
        let now = SystemTime::now();

        let mut removed = Vec::new();
        for archive in self.list()? {
            let meta = fs::metadata(&archive).map_err(|e| SecretsError::at_path(&archive, e))?;
            let modified = meta.modified().map_err(|e| SecretsError::at_path(&archive, e))?;
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age > threshold {
                if dry_run {
                    info!(archive = %archive.display(), "dry-run: would remove");
                } else {
                    fs::remove_file(&archive).map_err(|e| SecretsError::at_path(&archive, e))?;
                    debug!(archive = %archive.display(), "expired backup removed");
                }
                removed.push(archive);
            }
        }

        info!(
            removed = removed.len(),
            retention_days = self.config.retention_days,
            "backup cleanup finished"
        );
        Ok(removed)
    }

    fn fresh_archive_path(&self) -> SecretsResult<PathBuf> {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let base = format!("secrets-backup-{}", stamp);
        let candidate = self.config.backup_dir.join(format!("{}.tar.gz", base));
        if !candidate.exists() {
            return Ok(candidate);
        }
        // Same-second snapshots get a numeric suffix
        for n in 1..100 {
            let candidate = self
                .config
                .backup_dir
                .join(format!("{}-{}.tar.gz", base, n));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(SecretsError::BackupError(
            "could not find a free archive name".to_string(),
        ))
    }
}
