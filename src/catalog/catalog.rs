use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SecretsError, SecretsResult};
use crate::utils;

/// Output encoding for a generated secret value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretEncoding {
    /// Standard base64 alphabet with padding
    Base64,
    /// Lowercase hexadecimal
    Hex,
}

/// Generation spec for one named secret
///
/// Encoding and length are fixed per name so that two generations of the
/// same secret always produce structurally compatible output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretSpec {
    /// Unique key of the secret across the whole store
    pub name: &'static str,
    /// Output encoding
    pub encoding: SecretEncoding,
    /// Raw length in bytes before encoding
    pub length: usize,
}

impl SecretSpec {
    const fn b64(name: &'static str, length: usize) -> Self {
        Self {
            name,
            encoding: SecretEncoding::Base64,
            length,
        }
    }

    const fn hex(name: &'static str, length: usize) -> Self {
        Self {
            name,
            encoding: SecretEncoding::Hex,
            length,
        }
    }

    /// Exact character length of a generated value for this spec
    pub fn encoded_len(&self) -> usize {
        match self.encoding {
            SecretEncoding::Hex => self.length * 2,
            SecretEncoding::Base64 => 4 * ((self.length + 2) / 3),
        }
    }

    /// Check that a value has the exact shape this spec generates
    pub fn matches_format(&self, value: &str) -> bool {
        if value.len() != self.encoded_len() {
            return false;
        }
        match self.encoding {
            SecretEncoding::Hex => value
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)),
            SecretEncoding::Base64 => match base64::decode(value) {
                Ok(decoded) => decoded.len() == self.length,
                Err(_) => false,
            },
        }
    }
}

/// The enumerable set of secret categories
///
/// Each category owns one rotation interval and one or more named secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretCategory {
    Jwt,
    Database,
    Tron,
    Hardware,
    Mesh,
    Admin,
    Blockchain,
    Session,
    Rdp,
    Node,
    Monitoring,
    External,
    Backup,
}

impl SecretCategory {
    /// All categories, in catalog order
    pub const ALL: [SecretCategory; 13] = [
        SecretCategory::Jwt,
        SecretCategory::Database,
        SecretCategory::Tron,
        SecretCategory::Hardware,
        SecretCategory::Mesh,
        SecretCategory::Admin,
        SecretCategory::Blockchain,
        SecretCategory::Session,
        SecretCategory::Rdp,
        SecretCategory::Node,
        SecretCategory::Monitoring,
        SecretCategory::External,
        SecretCategory::Backup,
    ];

    /// Canonical lowercase name of the category
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretCategory::Jwt => "jwt",
            SecretCategory::Database => "database",
            SecretCategory::Tron => "tron",
            SecretCategory::Hardware => "hardware",
            SecretCategory::Mesh => "mesh",
            SecretCategory::Admin => "admin",
            SecretCategory::Blockchain => "blockchain",
            SecretCategory::Session => "session",
            SecretCategory::Rdp => "rdp",
            SecretCategory::Node => "node",
            SecretCategory::Monitoring => "monitoring",
            SecretCategory::External => "external",
            SecretCategory::Backup => "backup",
        }
    }

    /// Default maximum age in days before secrets in this category must be
    /// regenerated
    pub fn default_interval_days(&self) -> u32 {
        match self {
            SecretCategory::Session | SecretCategory::Rdp => 30,
            SecretCategory::Jwt
            | SecretCategory::Mesh
            | SecretCategory::Admin
            | SecretCategory::Monitoring
            | SecretCategory::External => 90,
            SecretCategory::Database | SecretCategory::Node | SecretCategory::Backup => 180,
            SecretCategory::Tron | SecretCategory::Hardware | SecretCategory::Blockchain => 365,
        }
    }

    /// The named secrets owned by this category
    pub fn secrets(&self) -> &'static [SecretSpec] {
        const JWT: &[SecretSpec] = &[
            SecretSpec::b64("JWT_SECRET_KEY", 48),
            SecretSpec::b64("JWT_REFRESH_SECRET_KEY", 48),
        ];
        const DATABASE: &[SecretSpec] = &[
            SecretSpec::b64("MONGODB_PASSWORD", 24),
            SecretSpec::b64("REDIS_PASSWORD", 24),
        ];
        const TRON: &[SecretSpec] = &[
            SecretSpec::hex("TRON_PRIVATE_KEY", 32),
            SecretSpec::hex("TRON_PAYOUT_PRIVATE_KEY", 32),
            SecretSpec::b64("TRONGRID_API_KEY", 24),
        ];
        const HARDWARE: &[SecretSpec] = &[SecretSpec::hex("HARDWARE_WALLET_ENCRYPTION_KEY", 32)];
        const MESH: &[SecretSpec] = &[
            SecretSpec::hex("MESH_TLS_PRIVATE_KEY", 32),
            SecretSpec::b64("MESH_BOOTSTRAP_TOKEN", 24),
        ];
        const ADMIN: &[SecretSpec] = &[
            SecretSpec::b64("ADMIN_API_TOKEN", 24),
            SecretSpec::hex("ADMIN_ENCRYPTION_KEY", 32),
        ];
        const BLOCKCHAIN: &[SecretSpec] = &[SecretSpec::hex("COMPLIANCE_SIGNER_KEY", 32)];
        const SESSION: &[SecretSpec] = &[SecretSpec::hex("SESSION_ENCRYPTION_KEY", 32)];
        const RDP: &[SecretSpec] = &[
            SecretSpec::b64("RDP_SESSION_TOKEN", 24),
            SecretSpec::hex("RDP_RECORDING_KEY", 32),
        ];
        const NODE: &[SecretSpec] = &[
            SecretSpec::hex("NODE_PRIVATE_KEY", 32),
            SecretSpec::b64("NODE_POOL_AUTH_TOKEN", 24),
        ];
        const MONITORING: &[SecretSpec] = &[
            SecretSpec::b64("GRAFANA_ADMIN_PASSWORD", 24),
            SecretSpec::b64("MONITORING_API_TOKEN", 24),
        ];
        const EXTERNAL: &[SecretSpec] = &[SecretSpec::b64("TOR_CONTROL_PASSWORD", 24)];
        const BACKUP: &[SecretSpec] = &[SecretSpec::hex("BACKUP_ENCRYPTION_KEY", 32)];
        match self {
            SecretCategory::Jwt => JWT,
            SecretCategory::Database => DATABASE,
            SecretCategory::Tron => TRON,
            SecretCategory::Hardware => HARDWARE,
            SecretCategory::Mesh => MESH,
            SecretCategory::Admin => ADMIN,
            SecretCategory::Blockchain => BLOCKCHAIN,
            SecretCategory::Session => SESSION,
            SecretCategory::Rdp => RDP,
            SecretCategory::Node => NODE,
            SecretCategory::Monitoring => MONITORING,
            SecretCategory::External => EXTERNAL,
            SecretCategory::Backup => BACKUP,
        }
    }
}

impl fmt::Display for SecretCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecretCategory {
    type Err = SecretsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        SecretCategory::ALL
            .iter()
            .find(|c| c.as_str() == lower)
            .copied()
            .ok_or(SecretsError::UnknownCategory(s.to_string()))
    }
}

/// Find the generation spec and owning category of a secret name
pub fn spec_for(name: &str) -> Option<(SecretCategory, &'static SecretSpec)> {
    for category in SecretCategory::ALL {
        if let Some(spec) = category.secrets().iter().find(|s| s.name == name) {
            return Some((category, spec));
        }
    }
    None
}

/// All named secrets in the catalog, in catalog order
pub fn all_secret_names() -> Vec<&'static str> {
    SecretCategory::ALL
        .iter()
        .flat_map(|c| c.secrets().iter().map(|s| s.name))
        .collect()
}

/// Generate a fresh value for a secret spec from the OS CSPRNG
pub fn generate_value(spec: &SecretSpec) -> SecretsResult<String> {
    match spec.encoding {
        SecretEncoding::Base64 => utils::random_base64(spec.length),
        SecretEncoding::Hex => utils::random_hex(spec.length),
    }
}

/// Generate a fresh value for a named secret within a category
///
/// Persistence is the store's responsibility; this function has no side
/// effects beyond returning the value. Fails if the name does not belong
/// to the category, or if the OS random source is unavailable.
pub fn generate(category: SecretCategory, secret_name: &str) -> SecretsResult<String> {
    let spec = category
        .secrets()
        .iter()
        .find(|s| s.name == secret_name)
        .ok_or_else(|| SecretsError::UnknownSecret(secret_name.to_string()))?;
    generate_value(spec)
}
