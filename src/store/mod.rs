/*!
 * Durable secret store
 *
 * A single `NAME=value` document with restrictive permissions, written
 * atomically, plus the advisory lock that serialises mutating operations.
 */

mod lock;
mod store;

pub use lock::StoreLock;
pub use store::{
    ensure_private_dir, open_private, restrict_file, SecretStore, DIR_MODE, FILE_MODE,
};
