/*!
 * Rotation policy engine
 *
 * Classifies every secret category as current, expiring soon or expired
 * from the store's document-level age, regenerates expired material, and
 * keeps a per-category append-only rotation log.
 */

mod policy;

pub use policy::{
    CategoryStatus, RotationEngine, RotationLogEntry, RotationOutcome, RotationSummary,
    SecretStatus,
};
