use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::catalog::{self, SecretCategory};
use crate::config::Config;
use crate::error::{SecretsError, SecretsResult};
use crate::store::{ensure_private_dir, SecretStore, StoreLock};
use crate::validator;

/// Freshness classification of a secret or category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretStatus {
    /// Well inside the rotation interval
    Current,
    /// Inside the warning window before expiry
    ExpiringSoon,
    /// Past the interval, missing, or left at a placeholder value
    Expired,
}

impl fmt::Display for SecretStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecretStatus::Current => "current",
            SecretStatus::ExpiringSoon => "expiring-soon",
            SecretStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Classification result for one category
#[derive(Debug, Clone)]
pub struct CategoryStatus {
    pub category: SecretCategory,
    pub status: SecretStatus,
    /// Age in days derived from the store document's mtime; `None` when the
    /// store is absent (treated as effectively infinite age)
    pub age_days: Option<i64>,
    /// Effective rotation interval in days
    pub interval_days: u32,
    /// Names absent from the store; each forces Expired on its own
    pub missing: Vec<&'static str>,
    /// Names whose value matches the placeholder denylist
    pub placeholders: Vec<&'static str>,
}

/// Result of attempting to rotate one category
#[derive(Debug, Clone)]
pub struct RotationOutcome {
    pub category: SecretCategory,
    /// Names regenerated (or that would be, under dry-run)
    pub rotated: Vec<&'static str>,
    /// Failure description when the category could not be rotated
    pub error: Option<String>,
}

/// Aggregate of a batch rotation; individual failures never abort the rest
#[derive(Debug, Clone, Default)]
pub struct RotationSummary {
    pub outcomes: Vec<RotationOutcome>,
}

impl RotationSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_some()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Collapse into a result, reporting failed categories if any
    pub fn into_result(self) -> SecretsResult<RotationSummary> {
        if self.is_success() {
            return Ok(self);
        }
        let failed: Vec<String> = self
            .outcomes
            .iter()
            .filter(|o| o.error.is_some())
            .map(|o| o.category.to_string())
            .collect();
        Err(SecretsError::PartialRotationError(failed.join(", ")))
    }
}

/// One line of the per-category append-only rotation log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationLogEntry {
    pub category: SecretCategory,
    pub timestamp: DateTime<Utc>,
    pub action: String,
}

/// Assigns ages and rotation intervals to categories and regenerates
/// expired material
#[derive(Debug, Clone)]
pub struct RotationEngine {
    config: Config,
}

impl RotationEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Days before expiry at which a category becomes ExpiringSoon
    ///
    /// Capped by configuration and scaled down proportionally for short
    /// intervals so a 30-day category is not "expiring" half its life.
    pub fn warning_window_days(&self, interval_days: u32) -> u32 {
        (interval_days / 6).clamp(1, self.config.warning_days)
    }

    /// Classify one category against the live store
    pub fn classify(&self, category: SecretCategory) -> SecretsResult<CategoryStatus> {
        let store = SecretStore::load_or_empty(self.config.store_path())?;
        self.classify_in(&store, category)
    }

    /// Classify every category in catalog order
    pub fn classify_all(&self) -> SecretsResult<Vec<CategoryStatus>> {
        let store = SecretStore::load_or_empty(self.config.store_path())?;
        SecretCategory::ALL
            .iter()
            .map(|&c| self.classify_in(&store, c))
            .collect()
    }

    fn classify_in(
        &self,
        store: &SecretStore,
        category: SecretCategory,
    ) -> SecretsResult<CategoryStatus> {
        let interval_days = self.config.interval_days(category);

        // No store at all: every category needs immediate rotation.
        if !store.exists() {
            return Ok(CategoryStatus {
                category,
                status: SecretStatus::Expired,
                age_days: None,
                interval_days,
                missing: category.secrets().iter().map(|s| s.name).collect(),
                placeholders: Vec::new(),
            });
        }

        let mut missing = Vec::new();
        let mut placeholders = Vec::new();
        for spec in category.secrets() {
            match store.get(spec.name) {
                None => missing.push(spec.name),
                Some(value) if validator::is_placeholder(value) => placeholders.push(spec.name),
                Some(_) => {}
            }
        }

        let age_days = age_in_days(store.last_modified()?);

        // Missing or defaulted names force Expired regardless of mtime;
        // "never generated" and "left at default" are the same condition.
        let status = if !missing.is_empty() || !placeholders.is_empty() {
            SecretStatus::Expired
        } else if age_days >= i64::from(interval_days) {
            SecretStatus::Expired
        } else if age_days >= i64::from(interval_days - self.warning_window_days(interval_days)) {
            SecretStatus::ExpiringSoon
        } else {
            SecretStatus::Current
        };

        Ok(CategoryStatus {
            category,
            status,
            age_days: Some(age_days),
            interval_days,
            missing,
            placeholders,
        })
    }

    /// Rotate every secret in one category
    ///
    /// Regenerates each name, upserts the new values, persists the store
    /// once, and appends a single log entry. Entries belonging to other
    /// categories are left untouched. Takes the exclusive store lock.
    pub fn rotate_category(
        &self,
        category: SecretCategory,
        dry_run: bool,
    ) -> SecretsResult<Vec<&'static str>> {
        // A dry run never touches the filesystem, not even to lock it
        if dry_run {
            return self.rotate_category_locked(category, true);
        }
        let _lock = StoreLock::acquire(&self.config.lock_path())?;
        self.rotate_category_locked(category, false)
    }

    fn rotate_category_locked(
        &self,
        category: SecretCategory,
        dry_run: bool,
    ) -> SecretsResult<Vec<&'static str>> {
        let names: Vec<&'static str> = category.secrets().iter().map(|s| s.name).collect();

        if dry_run {
            info!(category = %category, "dry-run: would rotate {}", names.join(", "));
            return Ok(names);
        }

        let mut store = SecretStore::load_or_empty(self.config.store_path())?;
        for spec in category.secrets() {
            let value = catalog::generate_value(spec)?;
            store.upsert(spec.name, &value);
        }
        store.save()?;

        self.append_log(category, &format!("rotated {}", names.join(",")))?;
        info!(category = %category, count = names.len(), "category rotated");
        Ok(names)
    }

    /// Rotate every expired category, or all categories when forced
    ///
    /// A failure in one category is recorded and the rest are still
    /// attempted; the caller gets a per-category summary.
    pub fn rotate_all(&self, force: bool, dry_run: bool) -> SecretsResult<RotationSummary> {
        let _lock = if dry_run {
            None
        } else {
            Some(StoreLock::acquire(&self.config.lock_path())?)
        };

        let store = SecretStore::load_or_empty(self.config.store_path())?;
        let mut summary = RotationSummary::default();

        for category in SecretCategory::ALL {
            let due = if force {
                true
            } else {
                match self.classify_in(&store, category) {
                    Ok(status) => status.status == SecretStatus::Expired,
                    Err(e) => {
                        warn!(category = %category, error = %e, "classification failed");
                        summary.outcomes.push(RotationOutcome {
                            category,
                            rotated: Vec::new(),
                            error: Some(e.to_string()),
                        });
                        continue;
                    }
                }
            };
            if !due {
                debug!(category = %category, "not due for rotation");
                continue;
            }

            match self.rotate_category_locked(category, dry_run) {
                Ok(rotated) => summary.outcomes.push(RotationOutcome {
                    category,
                    rotated,
                    error: None,
                }),
                Err(e) => {
                    warn!(category = %category, error = %e, "rotation failed");
                    summary.outcomes.push(RotationOutcome {
                        category,
                        rotated: Vec::new(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        info!(
            rotated = summary.succeeded(),
            failed = summary.failed(),
            "batch rotation finished"
        );
        Ok(summary)
    }

    /// Read the append-only rotation history for one category
    pub fn history(&self, category: SecretCategory) -> SecretsResult<Vec<RotationLogEntry>> {
        let path = self
            .config
            .rotation_log_dir()
            .join(format!("{}.log", category.as_str()));
        if !path.exists() {
            return Ok(Vec::new());
        }

        let raw = fs::read_to_string(&path).map_err(|e| SecretsError::at_path(&path, e))?;
        let mut entries = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (stamp, action) = line.split_once(' ').ok_or_else(|| {
                SecretsError::StoreFormatError(format!(
                    "malformed rotation log line in {}",
                    path.display()
                ))
            })?;
            let timestamp = stamp.parse::<DateTime<Utc>>().map_err(|e| {
                SecretsError::StoreFormatError(format!(
                    "bad timestamp in {}: {}",
                    path.display(),
                    e
                ))
            })?;
            entries.push(RotationLogEntry {
                category,
                timestamp,
                action: action.to_string(),
            });
        }
        Ok(entries)
    }

    fn append_log(&self, category: SecretCategory, action: &str) -> SecretsResult<()> {
        let dir = self.config.rotation_log_dir();
        ensure_private_dir(&dir)?;
        let path = dir.join(format!("{}.log", category.as_str()));

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(crate::store::FILE_MODE);
        }
        let mut file = options
            .open(&path)
            .map_err(|e| SecretsError::at_path(&path, e))?;
        writeln!(file, "{} {}", Utc::now().to_rfc3339(), action)
            .map_err(|e| SecretsError::at_path(&path, e))?;
        Ok(())
    }
}

fn age_in_days(modified: SystemTime) -> i64 {
    let modified: DateTime<Utc> = modified.into();
    (Utc::now() - modified).num_days()
}
