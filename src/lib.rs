//! s3dedupe - duplicate object finder for S3
//!
//! Finds objects with the same content fingerprint (ETag and size) across
//! every bucket of an account and removes all but one copy.
//!
//! The work is split in two decoupled phases joined by a register file:
//!
//! 1. `check`: [`inventory::ObjectLister`] lists every bucket,
//!    [`inventory::FingerprintIndex`] groups objects by fingerprint and
//!    [`register::DuplicateRegister`] keeps the groups with two or more
//!    locations, written as JSON.
//! 2. `delete`: the register is loaded, the operator confirms twice and
//!    [`actions::DeletionExecutor`] deletes every location after the first
//!    of each group, stopping at the first failure.
//!
//! Storage is reached through the [`storage::ObjectStorage`] trait, with
//! S3, local directory and in-memory implementations.

pub mod actions;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod progress;
pub mod register;
pub mod signal;
pub mod storage;

use anyhow::Result;

use crate::actions::ConsoleOperator;
use crate::cli::{Cli, Commands};
use crate::commands::RunContext;
use crate::config::Config;
use crate::error::ExitCode;

/// Run the application for parsed arguments.
///
/// # Errors
///
/// Returns any error that ends the run; map it with
/// [`error::exit_code_for`].
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    let handler = signal::install_handler()?;
    let ctx = RunContext::new(cli.quiet, handler);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Config(args) => commands::run_config(config_path, args.init),
        Commands::Check(args) => {
            let mut config = Config::load(config_path)?;
            args.apply(&mut config);
            log::debug!("Effective config: {:?}", config);
            let storage = commands::open_storage(&config)?;
            commands::run_check(storage.as_ref(), &config, &args.buckets, &ctx)
        }
        Commands::Delete(args) => {
            let mut config = Config::load(config_path)?;
            args.storage.apply(&mut config);
            // Fail on a bad register before touching storage credentials.
            let register = register::DuplicateRegister::load(&args.register)?;
            let storage = commands::open_storage(&config)?;
            let mut operator = ConsoleOperator::stdio();
            commands::delete_register(
                storage.as_ref(),
                &register,
                &args.register,
                &mut operator,
                &ctx,
            )
        }
        Commands::Verify(args) => {
            let mut config = Config::load(config_path)?;
            args.storage.apply(&mut config);
            let storage = commands::open_storage(&config)?;
            commands::run_verify(storage.as_ref(), &args.register, &ctx)
        }
    }
}
