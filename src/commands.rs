//! Subcommand implementations.
//!
//! Each `run_*` function takes an already constructed storage client so the
//! same code runs against S3, a local directory tree or the in-memory store.
//! [`open_storage`] builds the client a command run uses from [`Config`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bytesize::ByteSize;
use yansi::Paint;

use crate::actions::{
    verify_register, DeleteConfig, DeletionExecutor, DeletionOutcome, Operator, VerifyConfig,
    VerifyReport,
};
use crate::config::{BackendKind, Config};
use crate::error::ExitCode;
use crate::inventory::{IndexStats, ListerConfig, ListingStats, ObjectLister};
use crate::progress::Progress;
use crate::register::{DuplicateRegister, RegisterStats};
use crate::signal::ShutdownHandler;
use crate::storage::{LocalStorage, ObjectStorage};

/// Per-run settings shared by every command.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Hide progress bars and summaries
    pub quiet: bool,
    /// Shutdown flag set by Ctrl+C
    pub shutdown: ShutdownHandler,
}

impl RunContext {
    #[must_use]
    pub fn new(quiet: bool, shutdown: ShutdownHandler) -> Self {
        Self { quiet, shutdown }
    }

    fn progress(&self) -> Arc<Progress> {
        Arc::new(Progress::new(self.quiet))
    }
}

/// Build the storage client for one command run.
///
/// # Errors
///
/// Returns an error if the local backend has no usable root, or the S3
/// client cannot be created.
pub fn open_storage(config: &Config) -> Result<Box<dyn ObjectStorage>> {
    match config.backend {
        BackendKind::Local => {
            let root = config
                .local
                .root
                .as_ref()
                .context("The local backend needs a root directory (--root or local.root)")?;
            if !root.is_dir() {
                bail!("Local storage root is not a directory: {}", root.display());
            }
            let mut storage = LocalStorage::new(root);
            if let Some(page_size) = config.page_size {
                storage = storage.with_page_size(page_size);
            }
            log::debug!("Using local storage at {}", root.display());
            Ok(Box::new(storage))
        }
        BackendKind::S3 => open_s3(config),
    }
}

#[cfg(feature = "s3")]
fn open_s3(config: &Config) -> Result<Box<dyn ObjectStorage>> {
    let storage = crate::storage::S3Storage::connect(&config.s3, config.page_size)
        .context("Failed to create S3 client")?;
    Ok(Box::new(storage))
}

#[cfg(not(feature = "s3"))]
fn open_s3(_config: &Config) -> Result<Box<dyn ObjectStorage>> {
    bail!("s3dedupe was built without the `s3` feature; use --backend local")
}

// ==================== check ====================

/// Result of the inventory pass.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub register: DuplicateRegister,
    pub listing: ListingStats,
    pub index: IndexStats,
    /// Where the register was written; `None` if the pass was interrupted.
    pub register_path: Option<PathBuf>,
}

/// List, index and write the register.
///
/// `buckets` restricts listing to the named buckets, in order; empty means
/// every bucket `ListBuckets` returns.
///
/// # Errors
///
/// Returns an error if buckets cannot be enumerated or the register cannot
/// be written.
pub fn check<S: ObjectStorage + ?Sized>(
    storage: &S,
    config: &Config,
    buckets: &[String],
    ctx: &RunContext,
) -> Result<CheckReport> {
    let mut lister_config = ListerConfig::default()
        .with_list_threads(config.list_threads)
        .with_shutdown_flag(ctx.shutdown.get_flag())
        .with_progress_callback(ctx.progress());
    if !buckets.is_empty() {
        lister_config = lister_config.with_buckets(buckets.to_vec());
    }

    let (index, listing) = ObjectLister::new(storage, lister_config)
        .index()
        .context("Failed to enumerate buckets")?;
    let index_stats = index.stats();
    let register = DuplicateRegister::from_index(index);

    let register_path = if listing.interrupted {
        log::warn!("Listing interrupted, register not written");
        None
    } else {
        register.save(&config.register_path)?;
        Some(config.register_path.clone())
    };

    Ok(CheckReport {
        register,
        listing,
        index: index_stats,
        register_path,
    })
}

fn print_check_summary(report: &CheckReport, stats: &RegisterStats) {
    let listing = &report.listing;
    println!(
        "Listed {} object(s) in {} of {} bucket(s) ({} empty, {} skipped, {} incomplete)",
        listing.objects_listed,
        listing.buckets_listed,
        listing.buckets_total,
        listing.buckets_empty,
        listing.buckets_skipped,
        listing.buckets_incomplete
    );
    if report.index.empty_skipped > 0 {
        println!("Ignored {} empty object(s)", report.index.empty_skipped);
    }
    println!(
        "Found {} duplicate group(s): {} removable object(s), {} reclaimable",
        stats.groups,
        stats.removable,
        ByteSize::b(stats.reclaimable_bytes)
    );
    if let Some(path) = &report.register_path {
        println!("Register written to {}", path.display());
    }
}

/// `s3dedupe check`.
///
/// # Errors
///
/// See [`check`].
pub fn run_check<S: ObjectStorage + ?Sized>(
    storage: &S,
    config: &Config,
    buckets: &[String],
    ctx: &RunContext,
) -> Result<ExitCode> {
    let report = check(storage, config, buckets, ctx)?;
    let stats = report.register.stats();

    if stats.multipart_groups > 0 {
        log::warn!(
            "{} group(s) are matched on multipart ETags; equal ETags only suggest identical content",
            stats.multipart_groups
        );
    }
    if !ctx.quiet {
        print_check_summary(&report, &stats);
    }

    if report.listing.interrupted {
        Ok(ExitCode::Interrupted)
    } else if report.register.is_empty() {
        Ok(ExitCode::NoDuplicates)
    } else {
        Ok(ExitCode::Success)
    }
}

// ==================== delete ====================

/// `s3dedupe delete <register>`.
///
/// The register is loaded and validated before the operator is asked
/// anything.
///
/// # Errors
///
/// - [`crate::register::RegisterError`] if the register cannot be loaded
/// - [`crate::actions::DeleteError`] if a delete fails or the prompt cannot be read
pub fn run_delete<S, O>(
    storage: &S,
    register_path: &Path,
    operator: &mut O,
    ctx: &RunContext,
) -> Result<ExitCode>
where
    S: ObjectStorage + ?Sized,
    O: Operator + ?Sized,
{
    let register = DuplicateRegister::load(register_path)?;
    delete_register(storage, &register, register_path, operator, ctx)
}

/// Delete the removables of an already loaded register.
///
/// `register_path` is only used in messages.
///
/// # Errors
///
/// Returns [`crate::actions::DeleteError`] if a delete fails or the prompt
/// cannot be read.
pub fn delete_register<S, O>(
    storage: &S,
    register: &DuplicateRegister,
    register_path: &Path,
    operator: &mut O,
    ctx: &RunContext,
) -> Result<ExitCode>
where
    S: ObjectStorage + ?Sized,
    O: Operator + ?Sized,
{
    let stats = register.stats();

    if stats.removable == 0 {
        if !ctx.quiet {
            println!("Nothing to delete in {}", register_path.display());
        }
        return Ok(ExitCode::Success);
    }

    if !ctx.quiet {
        println!(
            "{} lists {} group(s); {} object(s) will be deleted, freeing {}",
            register_path.display(),
            stats.groups,
            stats.removable,
            ByteSize::b(stats.reclaimable_bytes)
        );
    }

    let config = DeleteConfig::default()
        .with_shutdown_flag(ctx.shutdown.get_flag())
        .with_progress_callback(ctx.progress());
    let mut executor = DeletionExecutor::new(storage, config);

    match executor.run(register, operator)? {
        DeletionOutcome::Succeeded(report) => {
            if !ctx.quiet {
                println!("{}", report.summary());
            }
            Ok(ExitCode::Success)
        }
        DeletionOutcome::Aborted => {
            if !ctx.quiet {
                println!("No objects deleted");
            }
            Ok(ExitCode::Aborted)
        }
        DeletionOutcome::Interrupted(report) => {
            if !ctx.quiet {
                println!("Interrupted. {}", report.summary());
            }
            Ok(ExitCode::Interrupted)
        }
    }
}

// ==================== verify ====================

fn print_verify_report(report: &VerifyReport) {
    println!("Checked {} group(s)", report.groups_checked);
    for location in &report.keepers_missing {
        println!("{} {}", "MISSING".red().bold(), location);
    }
    for location in &report.keepers_changed {
        println!("{} {}", "CHANGED".yellow().bold(), location);
    }
    println!(
        "{} removable object(s) still present",
        report.removables_remaining.len()
    );
}

/// `s3dedupe verify <register>`.
///
/// # Errors
///
/// Returns an error if the register cannot be loaded or a `HeadObject`
/// call fails for a reason other than "not found".
pub fn run_verify<S: ObjectStorage + ?Sized>(
    storage: &S,
    register_path: &Path,
    ctx: &RunContext,
) -> Result<ExitCode> {
    let register = DuplicateRegister::load(register_path)?;
    let config = VerifyConfig::default()
        .with_shutdown_flag(ctx.shutdown.get_flag())
        .with_progress_callback(ctx.progress());

    let report = verify_register(storage, &register, &config).context("Verification failed")?;
    if !ctx.quiet {
        print_verify_report(&report);
    }

    if report.interrupted {
        Ok(ExitCode::Interrupted)
    } else if report.is_ok() {
        Ok(ExitCode::Success)
    } else {
        log::error!("{} keeper(s) missing", report.keepers_missing.len());
        Ok(ExitCode::VerificationFailed)
    }
}

// ==================== config ====================

/// `s3dedupe config [--init]`.
///
/// Without `--init`, prints the effective configuration as TOML.
///
/// # Errors
///
/// Returns an error if `--init` would overwrite an existing file or the
/// file cannot be written.
pub fn run_config(path: Option<&Path>, init: bool) -> Result<ExitCode> {
    if init {
        let target = match path {
            Some(p) => p.to_path_buf(),
            None => Config::config_path()?,
        };
        if target.exists() {
            bail!("Config file already exists: {}", target.display());
        }
        Config::default().save(&target)?;
        println!("Wrote default configuration to {}", target.display());
        return Ok(ExitCode::Success);
    }

    let config = Config::load(path)?;
    let rendered = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    Ok(ExitCode::Success)
}
