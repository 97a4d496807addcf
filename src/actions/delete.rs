//! Fail-fast deletion of duplicate objects from a register.
//!
//! # Overview
//!
//! [`DeletionExecutor`] walks a [`DuplicateRegister`] in order. For each
//! group it keeps the first location and deletes every later one, in order.
//! The first failing delete stops the run: the rest of that group and every
//! later group are never attempted. Deletions already made stand.
//!
//! Nothing is deleted until the operator has answered `y` twice (see
//! [`super::confirm`]).
//!
//! ```text
//! Idle -> AwaitingFirstConfirmation -> AwaitingFinalConfirmation -> Deleting
//!                                                                     |
//!                           Succeeded | Aborted | Failed | Interrupted
//! ```
//!
//! # Example
//!
//! ```
//! use s3dedupe::actions::confirm::ScriptedOperator;
//! use s3dedupe::actions::delete::{DeleteConfig, DeletionExecutor, DeletionOutcome};
//! use s3dedupe::inventory::{ContentFingerprint, ObjectLocation};
//! use s3dedupe::register::DuplicateRegister;
//! use s3dedupe::storage::MemoryStorage;
//!
//! let storage = MemoryStorage::new();
//! storage.put_object("a", "dupe", b"X");
//! storage.put_object("a", "dupe1", b"X");
//!
//! let mut register = DuplicateRegister::new();
//! register.insert(
//!     ContentFingerprint::new("x", 1),
//!     vec![ObjectLocation::new("a", "dupe"), ObjectLocation::new("a", "dupe1")],
//! );
//!
//! let mut operator = ScriptedOperator::new(["y", "y"]);
//! let mut executor = DeletionExecutor::new(&storage, DeleteConfig::default());
//! let outcome = executor.run(&register, &mut operator).unwrap();
//!
//! assert!(matches!(outcome, DeletionOutcome::Succeeded(ref r) if r.deleted_count() == 1));
//! assert!(storage.contains("a", "dupe"));
//! assert!(!storage.contains("a", "dupe1"));
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use super::confirm::{ConfirmationGate, GateState, Operator};
use crate::inventory::ObjectLocation;
use crate::register::DuplicateRegister;
use crate::storage::{ObjectStorage, StorageError};

/// Name of the deletion phase reported to progress callbacks.
pub const DELETING_PHASE: &str = "deleting";

/// Error type for the deletion pass.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// A delete request failed. Nothing after it was attempted.
    #[error("failed to delete key \"{}\" from bucket \"{}\" ({deleted} object(s) deleted before the failure): {source}", location.key, location.bucket)]
    ObjectDelete {
        location: ObjectLocation,
        #[source]
        source: StorageError,
        deleted: usize,
    },

    /// Reading the operator's answer failed.
    #[error("failed to read confirmation: {0}")]
    Prompt(#[from] io::Error),
}

impl DeleteError {
    /// The location whose delete failed, if any.
    #[must_use]
    pub fn location(&self) -> Option<&ObjectLocation> {
        match self {
            Self::ObjectDelete { location, .. } => Some(location),
            Self::Prompt(_) => None,
        }
    }
}

/// What a deletion pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Locations deleted, in request order.
    pub deleted: Vec<ObjectLocation>,
    /// Bytes freed, from the fingerprint sizes.
    pub bytes_freed: u64,
    /// Groups whose removables were all deleted.
    pub groups_processed: usize,
    /// Groups with nothing to delete.
    pub groups_skipped: usize,
}

impl DeleteReport {
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    /// Human-readable summary of the pass.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Deleted {} object(s) across {} group(s), freed {}",
            self.deleted_count(),
            self.groups_processed,
            bytesize::ByteSize::b(self.bytes_freed)
        )
    }
}

/// How a deletion pass ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// Every removable location was deleted.
    Succeeded(DeleteReport),
    /// The operator declined; nothing was deleted.
    Aborted,
    /// Shutdown was requested between two deletes.
    Interrupted(DeleteReport),
}

/// States of the deletion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionState {
    Idle,
    AwaitingFirstConfirmation,
    AwaitingFinalConfirmation,
    Deleting,
    Succeeded,
    Aborted,
    Failed,
    Interrupted,
}

impl From<GateState> for DeletionState {
    fn from(state: GateState) -> Self {
        match state {
            GateState::Idle => Self::Idle,
            GateState::AwaitingFirstConfirmation => Self::AwaitingFirstConfirmation,
            GateState::AwaitingFinalConfirmation => Self::AwaitingFinalConfirmation,
            GateState::Confirmed => Self::Deleting,
            GateState::Aborted => Self::Aborted,
        }
    }
}

/// Callback trait for deletion progress reporting.
pub trait DeleteProgressCallback: Send + Sync {
    /// Called once before the first delete with the number of removables.
    fn on_start(&self, _total: usize) {}

    /// Called before each delete request. `index` is 0-based.
    fn on_before_delete(&self, location: &ObjectLocation, index: usize, total: usize);

    /// Called after a successful delete.
    fn on_delete_success(&self, location: &ObjectLocation, size: u64);

    /// Called after the delete that stops the run.
    fn on_delete_failure(&self, location: &ObjectLocation, error: &str);

    /// Called when the pass ends, whatever the outcome.
    fn on_complete(&self, report: &DeleteReport);
}

/// Configuration for a deletion pass.
#[derive(Clone, Default)]
pub struct DeleteConfig {
    /// Checked before every delete request.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn DeleteProgressCallback>>,
}

impl std::fmt::Debug for DeleteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteConfig")
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl DeleteConfig {
    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn DeleteProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }
}

/// Confirms with the operator, then deletes every removable location.
pub struct DeletionExecutor<'a, S: ObjectStorage + ?Sized> {
    storage: &'a S,
    config: DeleteConfig,
    state: DeletionState,
}

impl<'a, S: ObjectStorage + ?Sized> DeletionExecutor<'a, S> {
    #[must_use]
    pub fn new(storage: &'a S, config: DeleteConfig) -> Self {
        Self {
            storage,
            config,
            state: DeletionState::Idle,
        }
    }

    /// Current state; terminal once [`run`](Self::run) returns.
    #[must_use]
    pub fn state(&self) -> DeletionState {
        self.state
    }

    /// Ask for confirmation through `operator`, then delete.
    ///
    /// # Errors
    ///
    /// - [`DeleteError::Prompt`] if reading an answer fails (nothing deleted)
    /// - [`DeleteError::ObjectDelete`] for the first failed delete
    pub fn run<O: Operator + ?Sized>(
        &mut self,
        register: &DuplicateRegister,
        operator: &mut O,
    ) -> Result<DeletionOutcome, DeleteError> {
        let mut gate = ConfirmationGate::new();
        let confirmed = gate.run(operator).inspect_err(|_| {
            self.state = DeletionState::Aborted;
        })?;
        self.state = gate.state().into();

        if !confirmed {
            log::info!("Deletion aborted by operator, no objects deleted");
            return Ok(DeletionOutcome::Aborted);
        }

        self.delete_all(register)
    }

    fn is_shutdown_requested(&self) -> bool {
        self.config
            .shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn delete_all(&mut self, register: &DuplicateRegister) -> Result<DeletionOutcome, DeleteError> {
        self.state = DeletionState::Deleting;
        let callback = self.config.progress_callback.clone();
        let total = register.removable_count();
        let mut report = DeleteReport::default();
        let mut index = 0;

        if let Some(cb) = &callback {
            cb.on_start(total);
        }

        for group in register.groups() {
            if !group.has_removables() {
                report.groups_skipped += 1;
                continue;
            }

            for location in group.removables() {
                if self.is_shutdown_requested() {
                    log::warn!(
                        "Deletion interrupted after {} object(s)",
                        report.deleted_count()
                    );
                    self.state = DeletionState::Interrupted;
                    if let Some(cb) = &callback {
                        cb.on_complete(&report);
                    }
                    return Ok(DeletionOutcome::Interrupted(report));
                }

                log::info!(
                    "Deleting key \"{}\" from bucket \"{}\"",
                    location.key,
                    location.bucket
                );
                if let Some(cb) = &callback {
                    cb.on_before_delete(location, index, total);
                }

                if let Err(source) = self.storage.delete_object(&location.bucket, &location.key) {
                    log::error!("Failed to delete {}: {}", location, source);
                    if let Some(cb) = &callback {
                        cb.on_delete_failure(location, &source.to_string());
                        cb.on_complete(&report);
                    }
                    self.state = DeletionState::Failed;
                    return Err(DeleteError::ObjectDelete {
                        location: location.clone(),
                        source,
                        deleted: report.deleted_count(),
                    });
                }

                report.deleted.push(location.clone());
                report.bytes_freed = report.bytes_freed.saturating_add(group.fingerprint.size);
                if let Some(cb) = &callback {
                    cb.on_delete_success(location, group.fingerprint.size);
                }
                index += 1;
            }
            report.groups_processed += 1;
        }

        self.state = DeletionState::Succeeded;
        if let Some(cb) = &callback {
            cb.on_complete(&report);
        }
        log::info!("{}", report.summary());
        Ok(DeletionOutcome::Succeeded(report))
    }
}
