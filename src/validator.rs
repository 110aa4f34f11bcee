/*!
 * Read-only store validation
 *
 * Completeness (every catalog name present), freshness (no placeholder
 * values) and format (exact encoding/length per generation spec). Never
 * mutates the store; safe to run at any time.
 */

use crate::catalog::{self, SecretCategory};
use crate::store::SecretStore;

/// Known placeholder substrings, matched case-insensitively
///
/// A value containing any of these is treated the same as a missing one.
pub const PLACEHOLDER_PATTERNS: &[&str] =
    &["your-", "change-in-production", "changeme", "placeholder"];

/// Whether a value is a known default/placeholder rather than generated
/// material. Empty values count as placeholders too.
pub fn is_placeholder(value: &str) -> bool {
    if value.trim().is_empty() {
        return true;
    }
    let lower = value.to_ascii_lowercase();
    PLACEHOLDER_PATTERNS.iter().any(|p| lower.contains(p))
}

/// A format problem found for one named secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatViolation {
    pub name: String,
    pub problem: String,
}

impl std::fmt::Display for FormatViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.problem)
    }
}

/// Names that are missing from the store or still hold a placeholder value
pub fn check(store: &SecretStore) -> Vec<String> {
    let mut problems = Vec::new();
    for category in SecretCategory::ALL {
        for spec in category.secrets() {
            match store.get(spec.name) {
                None => problems.push(spec.name.to_string()),
                Some(value) if is_placeholder(value) => problems.push(spec.name.to_string()),
                Some(_) => {}
            }
        }
    }
    problems
}

/// Format violations for every present catalog secret
///
/// Asserts the exact encoded length and alphabet of each value, e.g. a
/// 32-byte hex key must be exactly 64 hex characters.
pub fn validate_format(store: &SecretStore) -> Vec<FormatViolation> {
    let mut violations = Vec::new();
    for (name, value) in store.all() {
        let Some((_, spec)) = catalog::spec_for(name) else {
            // Entries outside the catalog are not ours to police
            continue;
        };
        if is_placeholder(value) {
            violations.push(FormatViolation {
                name: name.clone(),
                problem: "placeholder value".to_string(),
            });
        } else if !spec.matches_format(value) {
            violations.push(FormatViolation {
                name: name.clone(),
                problem: format!(
                    "expected {} characters of {:?}, got {} characters",
                    spec.encoded_len(),
                    spec.encoding,
                    value.len()
                ),
            });
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{generate_value, SecretCategory};

    fn full_store() -> SecretStore {
        let mut store = SecretStore::empty("/tmp/validator-test.env");
        for category in SecretCategory::ALL {
            for spec in category.secrets() {
                store.upsert(spec.name, &generate_value(spec).unwrap());
            }
        }
        store
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(is_placeholder(
            "your-256-bit-jwt-secret-key-here-change-in-production"
        ));
        assert!(is_placeholder("CHANGEME"));
        assert!(is_placeholder("  "));
        assert!(is_placeholder("set-placeholder-later"));
        assert!(!is_placeholder("dGhpcyBpcyByYW5kb20gbWF0ZXJpYWw="));
    }

    #[test]
    fn test_full_store_passes_both_checks() {
        let store = full_store();
        assert!(check(&store).is_empty());
        assert!(validate_format(&store).is_empty());
    }

    #[test]
    fn test_check_reports_missing_and_default_names() {
        let mut store = full_store();
        store.upsert(
            "JWT_SECRET_KEY",
            "your-256-bit-jwt-secret-key-here-change-in-production",
        );

        let problems = check(&store);
        assert_eq!(problems, vec!["JWT_SECRET_KEY".to_string()]);

        let empty = SecretStore::empty("/tmp/validator-empty.env");
        let all_missing = check(&empty);
        assert_eq!(all_missing.len(), crate::catalog::all_secret_names().len());
    }

    #[test]
    fn test_format_violations() {
        let mut store = full_store();
        // Wrong length hex
        store.upsert("SESSION_ENCRYPTION_KEY", "deadbeef");
        // Wrong alphabet for base64 spec
        store.upsert("MONGODB_PASSWORD", &"*".repeat(32));

        let violations = validate_format(&store);
        let names: Vec<&str> = violations.iter().map(|v| v.name.as_str()).collect();
        assert!(names.contains(&"SESSION_ENCRYPTION_KEY"));
        assert!(names.contains(&"MONGODB_PASSWORD"));
    }

    #[test]
    fn test_non_catalog_entries_are_ignored() {
        let mut store = full_store();
        store.upsert("CUSTOM_OPERATOR_NOTE", "anything goes");
        assert!(validate_format(&store).is_empty());
        assert!(check(&store).is_empty());
    }
}
