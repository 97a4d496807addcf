//! Progress reporting using indicatif.
//!
//! [`Progress`] implements [`ProgressCallback`] and draws one bar per phase
//! on stderr. The phases are [`crate::inventory::lister::LISTING_PHASE`],
//! [`crate::actions::DELETING_PHASE`] and [`crate::actions::VERIFYING_PHASE`].
//! Quiet mode draws nothing.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::actions::delete::{DeleteProgressCallback, DeleteReport, DELETING_PHASE};
use crate::inventory::ObjectLocation;

/// Progress callback for the long-running phases.
///
/// Implement this trait to receive progress updates while buckets are
/// listed, duplicates are deleted or a register is verified.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (e.g., "listing", "deleting")
    /// * `total` - Total number of items (buckets, deletions, groups)
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called when work on an item begins.
    ///
    /// # Arguments
    ///
    /// * `current` - Current item number (1-based)
    /// * `item` - Bucket name or `bucket/key` being processed
    fn on_progress(&self, current: usize, item: &str);

    /// Called when a unit of work finishes. During listing this is the
    /// number of objects in the page just fetched.
    fn on_item_completed(&self, _count: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called to update the progress message.
    fn on_message(&self, _message: &str) {}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Progress reporter using indicatif.
pub struct Progress {
    multi: MultiProgress,
    bar: Mutex<Option<ProgressBar>>,
    objects: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Examples
    ///
    /// ```
    /// use s3dedupe::progress::Progress;
    ///
    /// let progress = Progress::new(true);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            bar: Mutex::new(None),
            objects: Mutex::new(None),
            quiet,
        }
    }

    fn phase_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn objects_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} objects listed")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn phase_label(phase: &str) -> &'static str {
        match phase {
            "listing" => "Listing buckets",
            "deleting" => "Deleting duplicates",
            "verifying" => "Verifying register",
            _ => "Working",
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(Self::phase_style());
        pb.set_message(Self::phase_label(phase));
        *lock(&self.bar) = Some(pb);

        if phase == "listing" {
            let spinner = self.multi.add(ProgressBar::new_spinner());
            spinner.set_style(Self::objects_style());
            spinner.enable_steady_tick(Duration::from_millis(100));
            *lock(&self.objects) = Some(spinner);
        }
    }

    fn on_progress(&self, current: usize, item: &str) {
        if self.quiet {
            return;
        }

        if let Some(pb) = lock(&self.bar).as_ref() {
            // Position counts finished items; `current` is the one starting.
            pb.set_position(current.saturating_sub(1) as u64);
            pb.set_message(truncate_item(item, 40));
        }
    }

    fn on_item_completed(&self, count: u64) {
        if self.quiet {
            return;
        }

        if let Some(spinner) = lock(&self.objects).as_ref() {
            spinner.inc(count);
        } else if let Some(pb) = lock(&self.bar).as_ref() {
            pb.inc(count);
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }

        if let Some(spinner) = lock(&self.objects).take() {
            spinner.finish();
        }
        if let Some(pb) = lock(&self.bar).take() {
            if let Some(len) = pb.length() {
                pb.set_position(len);
            }
            pb.finish_with_message(format!("{} complete", Self::phase_label(phase)));
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }

        if let Some(pb) = lock(&self.bar).as_ref() {
            pb.set_message(message.to_string());
        }
    }
}

impl DeleteProgressCallback for Progress {
    fn on_start(&self, total: usize) {
        self.on_phase_start(DELETING_PHASE, total);
    }

    fn on_before_delete(&self, location: &ObjectLocation, index: usize, _total: usize) {
        self.on_progress(index + 1, &location.to_string());
    }

    fn on_delete_success(&self, _location: &ObjectLocation, _size: u64) {}

    fn on_delete_failure(&self, location: &ObjectLocation, _error: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = lock(&self.bar).take() {
            pb.abandon_with_message(format!("Stopped at {location}"));
        }
    }

    fn on_complete(&self, _report: &DeleteReport) {
        self.on_phase_end(DELETING_PHASE);
    }
}

/// Shorten an item for display, keeping its tail.
fn truncate_item(item: &str, max_len: usize) -> String {
    let chars = item.chars().count();
    if chars <= max_len {
        return item.to_string();
    }
    let tail: String = item.chars().skip(chars - max_len + 3).collect();
    format!("...{tail}")
}
