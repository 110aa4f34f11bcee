use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::error::{SecretsError, SecretsResult};

/// Mode applied to the store document, key file and metadata sidecar
pub const FILE_MODE: u32 = 0o600;

/// Mode applied to the secrets directory
pub const DIR_MODE: u32 = 0o700;

/// An ordered `name -> value` mapping persisted as one durable document
///
/// The store tracks a single last-modified timestamp for the whole
/// document, not per entry; the rotation engine's age model builds on
/// that simplification.
#[derive(Debug, Clone)]
pub struct SecretStore {
    path: PathBuf,
    entries: Vec<(String, String)>,
}

impl SecretStore {
    /// Create an empty store bound to `path` without touching disk
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Load the store document from disk
    ///
    /// Lines starting with `#` and blank lines are tolerated; everything
    /// else must be `NAME=value`. Duplicate names are a format error.
    pub fn load(path: impl Into<PathBuf>) -> SecretsResult<Self> {
        let path = path.into();
        let contents =
            fs::read_to_string(&path).map_err(|e| SecretsError::at_path(&path, e))?;
        let entries = parse_document(&contents)?;
        Ok(Self { path, entries })
    }

    /// Load the store if the document exists, otherwise return an empty one
    pub fn load_or_empty(path: impl Into<PathBuf>) -> SecretsResult<Self> {
        let path = path.into();
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "store document absent, starting empty");
            Ok(Self::empty(path))
        }
    }

    /// Parse a store document from raw bytes (used after decryption)
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> SecretsResult<Self> {
        let contents = std::str::from_utf8(bytes)
            .map_err(|_| SecretsError::StoreFormatError("document is not UTF-8".to_string()))?;
        Ok(Self {
            path: path.into(),
            entries: parse_document(contents)?,
        })
    }

    /// Whether the store document exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Path of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a single entry
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All entries in stable (first-seen) order
    pub fn all(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the named entry, or append it if absent
    ///
    /// Existing entries keep their position so that rewrites produce
    /// minimal diffs.
    pub fn upsert(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    /// Serialize the document exactly as it would be written to disk
    pub fn to_document(&self) -> String {
        let mut out = String::from("# Managed secrets. Do not edit by hand; use secretctl.\n");
        for (name, value) in &self.entries {
            out.push_str(name);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Persist the document atomically and re-assert permissions
    ///
    /// Writes a temp file next to the target, fsyncs it, then renames over
    /// the live document so a crash never leaves a truncated store.
    pub fn save(&self) -> SecretsResult<()> {
        if let Some(parent) = self.path.parent() {
            ensure_private_dir(parent)?;
        }

        let tmp_path = self.path.with_extension("env.tmp");
        {
            let mut file = open_private(&tmp_path)?;
            file.write_all(self.to_document().as_bytes())
                .map_err(|e| SecretsError::at_path(&tmp_path, e))?;
            file.sync_all()
                .map_err(|e| SecretsError::at_path(&tmp_path, e))?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| SecretsError::at_path(&self.path, e))?;
        restrict_file(&self.path)?;

        debug!(path = %self.path.display(), entries = self.entries.len(), "store saved");
        Ok(())
    }

    /// Last-modified timestamp of the whole document
    pub fn last_modified(&self) -> SecretsResult<SystemTime> {
        let meta = fs::metadata(&self.path).map_err(|e| SecretsError::at_path(&self.path, e))?;
        meta.modified().map_err(|e| SecretsError::at_path(&self.path, e))
    }
}

fn parse_document(contents: &str) -> SecretsResult<Vec<(String, String)>> {
    let mut entries: Vec<(String, String)> = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (name, value) = trimmed.split_once('=').ok_or_else(|| {
            SecretsError::StoreFormatError(format!("line {}: missing '='", lineno + 1))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(SecretsError::StoreFormatError(format!(
                "line {}: empty secret name",
                lineno + 1
            )));
        }
        if entries.iter().any(|(n, _)| n == name) {
            return Err(SecretsError::StoreFormatError(format!(
                "line {}: duplicate secret name '{}'",
                lineno + 1,
                name
            )));
        }
        entries.push((name.to_string(), value.to_string()));
    }
    Ok(entries)
}

/// Create `dir` if needed and assert 0700 on it
pub fn ensure_private_dir(dir: &Path) -> SecretsResult<()> {
    fs::create_dir_all(dir).map_err(|e| SecretsError::at_path(dir, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(DIR_MODE))
            .map_err(|e| SecretsError::at_path(dir, e))?;
    }
    Ok(())
}

/// Assert 0600 on an existing file
pub fn restrict_file(path: &Path) -> SecretsResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(FILE_MODE))
            .map_err(|e| SecretsError::at_path(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Create a file for writing with 0600 set from the start
pub fn open_private(path: &Path) -> SecretsResult<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }
    options.open(path).map_err(|e| SecretsError::at_path(path, e))
}
