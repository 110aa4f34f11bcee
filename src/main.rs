use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use secret_lifecycle::backup::{BackupManager, BackupTargets};
use secret_lifecycle::catalog::SecretCategory;
use secret_lifecycle::config::Config;
use secret_lifecycle::coordinator::{Coordinator, ProvisionOptions};
use secret_lifecycle::encryption::{EncryptedState, EncryptionEngine};
use secret_lifecycle::error::{SecretsError, SecretsResult};
use secret_lifecycle::rotation::{RotationEngine, SecretStatus};
use secret_lifecycle::store::StoreLock;

/// Manage the lifecycle of deployment secrets: generate, encrypt,
/// rotate, validate, back up and restore.
#[derive(Parser)]
#[command(name = "secretctl", version, about)]
struct Cli {
    /// Report what would happen without mutating anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Skip confirmation prompts before destructive operations
    #[arg(long, global = true)]
    force: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate missing or expired secrets, validate and back up
    Generate {
        /// Restrict to one category
        #[arg(long = "category", value_name = "CATEGORY", conflicts_with = "all")]
        category: Option<String>,
        /// Provision every category (the default when --category is absent)
        #[arg(long)]
        all: bool,
        /// Skip the post-generation backup
        #[arg(long)]
        no_backup: bool,
    },
    /// Encrypt the plaintext store at rest
    Encrypt,
    /// Decrypt the store back to plaintext
    Decrypt,
    /// Rotate secrets past their category's maximum age
    Rotate {
        /// Rotate one category
        #[arg(long = "category", value_name = "CATEGORY")]
        category: Option<String>,
        /// Rotate every expired category (all categories with --force)
        #[arg(long)]
        all: bool,
        /// Print the freshness classification of every category
        #[arg(long)]
        check: bool,
        /// Verify that every category is current
        #[arg(long)]
        verify: bool,
        /// Print the rotation history (optionally for one category)
        #[arg(long)]
        history: bool,
        /// Prune backup archives past the retention threshold
        #[arg(long)]
        cleanup: bool,
    },
    /// Snapshot the store and its encryption metadata
    Backup {
        /// Also include the master key file in the archive
        #[arg(long)]
        include_key: bool,
    },
    /// Restore a snapshot over the live files
    Restore {
        /// Archive to restore
        archive: PathBuf,
    },
    /// Print a read-only summary of the live state
    Status,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(SecretsError::Cancelled) => {
            eprintln!("cancelled");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "operation failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> SecretsResult<()> {
    let config = Config::from_env()?;

    match cli.command {
        Command::Generate {
            category,
            all: _,
            no_backup,
        } => cmd_generate(&config, category, no_backup, cli.force, cli.dry_run),
        Command::Encrypt => cmd_encrypt(&config, cli.dry_run),
        Command::Decrypt => cmd_decrypt(&config, cli.force, cli.dry_run),
        Command::Rotate {
            category,
            all,
            check,
            verify,
            history,
            cleanup,
        } => cmd_rotate(
            &config, category, all, check, verify, history, cleanup, cli.force, cli.dry_run,
        ),
        Command::Backup { include_key } => cmd_backup(&config, include_key, cli.dry_run),
        Command::Restore { archive } => cmd_restore(&config, &archive, cli.force, cli.dry_run),
        Command::Status => cmd_status(&config),
    }
}

fn parse_category(raw: Option<String>) -> SecretsResult<Option<SecretCategory>> {
    raw.map(|s| s.parse()).transpose()
}

fn cmd_generate(
    config: &Config,
    category: Option<String>,
    no_backup: bool,
    force: bool,
    dry_run: bool,
) -> SecretsResult<()> {
    let coordinator = Coordinator::new(config);
    let report = coordinator.provision(ProvisionOptions {
        force,
        dry_run,
        backup: !no_backup && !dry_run,
        category: parse_category(category)?,
    })?;

    for outcome in &report.rotation.outcomes {
        match &outcome.error {
            None => println!(
                "{}: generated {}",
                outcome.category,
                outcome.rotated.join(", ")
            ),
            Some(e) => println!("{}: FAILED ({})", outcome.category, e),
        }
    }
    if let Some(archive) = &report.backup_archive {
        println!("backup written to {}", archive.display());
    }

    if dry_run {
        return Ok(());
    }
    if !report.is_clean() {
        for name in &report.unresolved {
            println!("unresolved: {}", name);
        }
        for violation in &report.format_violations {
            println!("format: {}", violation);
        }
        return Err(SecretsError::ValidationError(format!(
            "{} problem(s) remain after generation",
            report.unresolved.len() + report.format_violations.len()
        )));
    }
    report.rotation.into_result().map(|_| ())
}

fn cmd_encrypt(config: &Config, dry_run: bool) -> SecretsResult<()> {
    let (entries, metadata) = Coordinator::new(config).encrypt(dry_run)?;
    match metadata {
        None => println!(
            "would encrypt {} entries to {}",
            entries,
            config.ciphertext_path().display()
        ),
        Some(metadata) => println!(
            "encrypted {} entries with {} ({} KDF iterations)",
            entries, metadata.algorithm, metadata.iterations
        ),
    }
    Ok(())
}

fn cmd_decrypt(config: &Config, force: bool, dry_run: bool) -> SecretsResult<()> {
    let engine = EncryptionEngine::new(config);
    let store = engine.decrypt_to_store(&config.store_path())?;
    if dry_run {
        println!("would write {} decrypted entries", store.len());
        return Ok(());
    }

    if config.store_path().exists() {
        Coordinator::new(config)
            .confirm_destructive("overwrite the existing plaintext store", force)?;
    }

    let _lock = StoreLock::acquire(&config.lock_path())?;
    store.save()?;
    println!(
        "decrypted {} entries to {}",
        store.len(),
        config.store_path().display()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_rotate(
    config: &Config,
    category: Option<String>,
    all: bool,
    check: bool,
    verify: bool,
    history: bool,
    cleanup: bool,
    force: bool,
    dry_run: bool,
) -> SecretsResult<()> {
    let engine = RotationEngine::new(config);
    let category = parse_category(category)?;

    if check {
        for status in engine.classify_all()? {
            let age = status
                .age_days
                .map(|d| format!("{}d", d))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<12} {:<14} age {:>4} / {}d",
                status.category, status.status, age, status.interval_days
            );
        }
        return Ok(());
    }

    if verify {
        let stale: Vec<String> = engine
            .classify_all()?
            .into_iter()
            .filter(|s| s.status != SecretStatus::Current)
            .map(|s| format!("{} ({})", s.category, s.status))
            .collect();
        if stale.is_empty() {
            println!("all categories current");
            return Ok(());
        }
        return Err(SecretsError::ValidationError(stale.join(", ")));
    }

    if history {
        let categories = match category {
            Some(c) => vec![c],
            None => SecretCategory::ALL.to_vec(),
        };
        for c in categories {
            for entry in engine.history(c)? {
                println!("{} {} {}", entry.timestamp.to_rfc3339(), c, entry.action);
            }
        }
        return Ok(());
    }

    if cleanup {
        let removed = BackupManager::new(config).cleanup(dry_run)?;
        for archive in &removed {
            println!(
                "{}{}",
                if dry_run { "would remove " } else { "removed " },
                archive.display()
            );
        }
        return Ok(());
    }

    if let Some(category) = category {
        let status = engine.classify(category)?;
        if status.status != SecretStatus::Expired && !force {
            println!(
                "{} is {} ({}d of {}d); use --force to rotate anyway",
                category,
                status.status,
                status.age_days.unwrap_or(0),
                status.interval_days
            );
            return Ok(());
        }
        let rotated = engine.rotate_category(category, dry_run)?;
        println!("{}: rotated {}", category, rotated.join(", "));
        return Ok(());
    }

    if all || force {
        let summary = engine.rotate_all(force, dry_run)?;
        for outcome in &summary.outcomes {
            match &outcome.error {
                None => println!("{}: rotated", outcome.category),
                Some(e) => println!("{}: FAILED ({})", outcome.category, e),
            }
        }
        println!("{} rotated, {} failed", summary.succeeded(), summary.failed());
        return summary.into_result().map(|_| ());
    }

    Err(SecretsError::ConfigError(
        "rotate needs one of --category, --all, --check, --verify, --history or --cleanup"
            .to_string(),
    ))
}

fn cmd_backup(config: &Config, include_key: bool, dry_run: bool) -> SecretsResult<()> {
    let manager = BackupManager::new(config);
    if dry_run {
        println!("would snapshot the store and metadata into {}", config.backup_dir.display());
        return Ok(());
    }
    let archive = manager.backup(&BackupTargets {
        key: include_key,
        ..BackupTargets::default()
    })?;
    println!("backup written to {}", archive.display());
    Ok(())
}

fn cmd_restore(
    config: &Config,
    archive: &std::path::Path,
    force: bool,
    dry_run: bool,
) -> SecretsResult<()> {
    if dry_run {
        println!("would restore {}", archive.display());
        return Ok(());
    }

    Coordinator::new(config).confirm_destructive(
        &format!("replace live secrets with {}", archive.display()),
        force,
    )?;

    let applied = BackupManager::new(config).restore(archive)?;
    for path in applied {
        println!("restored {}", path.display());
    }
    Ok(())
}

fn cmd_status(config: &Config) -> SecretsResult<()> {
    let report = Coordinator::new(config).status()?;
    println!(
        "store: {} ({} entries)",
        if report.store_exists { "present" } else { "absent" },
        report.entry_count
    );
    println!(
        "encrypted: {}",
        match report.encrypted {
            EncryptedState::Absent => "no",
            EncryptedState::Present => "yes",
            EncryptedState::Inconsistent => "INCONSISTENT",
        }
    );
    for status in report.categories {
        println!(
            "{:<12} {:<14} ({} names)",
            status.category,
            status.status,
            status.category.secrets().len()
        );
    }
    Ok(())
}
