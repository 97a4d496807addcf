//! Command-line interface definitions for s3dedupe.
//!
//! Global options (verbosity, color, config file) come first, followed by a
//! subcommand.
//!
//! # Example
//!
//! ```bash
//! # Find duplicates across every bucket, write s3-duplicates.json
//! s3dedupe check
//!
//! # Only two buckets, listed in parallel
//! s3dedupe check --bucket photos --bucket backup --list-threads 2
//!
//! # Delete every copy after the first, with two confirmations
//! s3dedupe delete s3-duplicates.json
//!
//! # Run against a local directory tree instead of S3
//! s3dedupe check --backend local --root ./buckets
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{BackendKind, Config};

/// Find and remove duplicate objects across S3 buckets.
///
/// `check` lists every object, groups them by ETag and size, and writes a
/// register of duplicate groups. `delete` consumes that register and keeps
/// only the first copy of each group.
#[derive(Debug, Parser)]
#[command(name = "s3dedupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Path to a TOML config file (default: platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List all buckets and write a register of duplicate objects
    Check(CheckArgs),
    /// Delete all but the first copy of every group in a register
    Delete(RegisterArgs),
    /// Check that keepers in a register still exist (read-only)
    Verify(RegisterArgs),
    /// Show or initialise the configuration file
    Config(ConfigArgs),
}

/// Storage selection shared by every command that talks to storage.
#[derive(Debug, Default, Args)]
pub struct StorageArgs {
    /// Storage backend
    #[arg(long, value_enum, value_name = "BACKEND")]
    pub backend: Option<BackendKind>,

    /// Root directory for the local backend (each subdirectory is a bucket)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// AWS region
    #[arg(long, value_name = "REGION")]
    pub region: Option<String>,

    /// Custom endpoint URL for S3-compatible services
    #[arg(long, value_name = "URL")]
    pub endpoint_url: Option<String>,

    /// Use path-style bucket addressing
    #[arg(long)]
    pub force_path_style: bool,
}

impl StorageArgs {
    /// Apply flags on top of the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(root) = &self.root {
            config.local.root = Some(root.clone());
            if self.backend.is_none() {
                config.backend = BackendKind::Local;
            }
        }
        if let Some(region) = &self.region {
            config.s3.region = Some(region.clone());
        }
        if let Some(url) = &self.endpoint_url {
            config.s3.endpoint_url = Some(url.clone());
        }
        if self.force_path_style {
            config.s3.force_path_style = true;
        }
    }
}

/// Arguments for the check subcommand.
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Where to write the register (default: s3-duplicates.json)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Only list this bucket (can be specified multiple times, order kept)
    #[arg(short, long = "bucket", value_name = "NAME")]
    pub buckets: Vec<String>,

    /// Number of buckets listed concurrently (1 = sequential)
    #[arg(long, value_name = "N")]
    pub list_threads: Option<usize>,

    /// Maximum objects per listing page
    #[arg(long, value_name = "N")]
    pub page_size: Option<usize>,

    #[command(flatten)]
    pub storage: StorageArgs,
}

impl CheckArgs {
    /// Apply flags on top of the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        self.storage.apply(config);
        if let Some(output) = &self.output {
            config.register_path = output.clone();
        }
        if let Some(threads) = self.list_threads {
            config.list_threads = threads.max(1);
        }
        if let Some(page_size) = self.page_size {
            config.page_size = Some(page_size);
        }
    }
}

/// Arguments for subcommands that read a register.
#[derive(Debug, Args)]
pub struct RegisterArgs {
    /// Register file produced by `check`
    #[arg(value_name = "REGISTER")]
    pub register: PathBuf,

    #[command(flatten)]
    pub storage: StorageArgs,
}

/// Arguments for the config subcommand.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Write a config file with default values (fails if it exists)
    #[arg(long)]
    pub init: bool,
}
