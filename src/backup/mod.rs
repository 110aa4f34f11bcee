/*!
 * Backup and restore for the secret store and its encryption companions
 *
 * Snapshots are flat, timestamped tar.gz archives. Restores are staged
 * into a scratch directory and verified before anything touches the live
 * files.
 */

mod manager;

pub use manager::{BackupManager, BackupTargets};
