//! Read-only check of a register against live storage.
//!
//! Every location of every group is probed with `HeadObject`. A keeper that
//! no longer exists means its content may be gone for good; removables that
//! still exist mean a deletion pass has not (fully) run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::inventory::{normalize_digest, ObjectLocation};
use crate::progress::ProgressCallback;
use crate::register::DuplicateRegister;
use crate::storage::{ObjectMetadata, ObjectStorage, StorageError};

/// Name of the verification phase reported to progress callbacks.
pub const VERIFYING_PHASE: &str = "verifying";

/// Findings of a verification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Groups probed.
    pub groups_checked: usize,
    /// Keepers that no longer exist.
    pub keepers_missing: Vec<ObjectLocation>,
    /// Keepers that exist but whose size or digest differs from the register.
    pub keepers_changed: Vec<ObjectLocation>,
    /// Removable locations that still exist.
    pub removables_remaining: Vec<ObjectLocation>,
    /// Whether the pass stopped early on shutdown.
    pub interrupted: bool,
}

impl VerifyReport {
    /// `true` when every keeper is present.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.keepers_missing.is_empty()
    }
}

/// Configuration for a verification pass.
#[derive(Clone, Default)]
pub struct VerifyConfig {
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl VerifyConfig {
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }
}

fn matches_register(metadata: &ObjectMetadata, digest: &str, size: u64) -> bool {
    metadata.size == size
        && metadata
            .digest
            .as_deref()
            .is_none_or(|d| normalize_digest(d) == digest)
}

/// Probe every location in `register`. Never deletes anything.
///
/// # Errors
///
/// Propagates any storage error other than "not found".
pub fn verify_register<S: ObjectStorage + ?Sized>(
    storage: &S,
    register: &DuplicateRegister,
    config: &VerifyConfig,
) -> Result<VerifyReport, StorageError> {
    let mut report = VerifyReport::default();
    let callback = config.progress_callback.as_ref();
    if let Some(cb) = callback {
        cb.on_phase_start(VERIFYING_PHASE, register.len());
    }

    for (ordinal, group) in register.groups().enumerate() {
        if config
            .shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
        {
            log::warn!("Verification interrupted after {} group(s)", report.groups_checked);
            report.interrupted = true;
            break;
        }

        let Some(keeper) = group.keeper() else {
            report.groups_checked += 1;
            continue;
        };
        if let Some(cb) = callback {
            cb.on_progress(ordinal + 1, &keeper.to_string());
        }

        match storage.head_object(&keeper.bucket, &keeper.key)? {
            None => {
                log::warn!("Keeper {} is missing", keeper);
                report.keepers_missing.push(keeper.clone());
            }
            Some(metadata)
                if !matches_register(
                    &metadata,
                    &group.fingerprint.digest,
                    group.fingerprint.size,
                ) =>
            {
                log::warn!("Keeper {} no longer matches {}", keeper, group.fingerprint);
                report.keepers_changed.push(keeper.clone());
            }
            Some(_) => {}
        }

        for location in group.removables() {
            if storage.head_object(&location.bucket, &location.key)?.is_some() {
                log::debug!("Removable {} still exists", location);
                report.removables_remaining.push(location.clone());
            }
        }
        report.groups_checked += 1;
    }

    if let Some(cb) = callback {
        cb.on_phase_end(VERIFYING_PHASE);
    }
    Ok(report)
}
