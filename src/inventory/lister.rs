//! Bucket and object enumeration.
//!
//! # Overview
//!
//! [`ObjectLister`] walks every bucket of an account and yields
//! `(bucket, object)` pairs lazily, one listing page at a time. Each bucket's
//! listing is drained through all continuation tokens before the next bucket
//! starts.
//!
//! Per-bucket failures never stop the run:
//! - a bucket that is missing or access-denied is skipped with a warning
//! - an empty bucket is reported and skipped
//! - a listing that fails after some pages keeps what was listed and is
//!   counted as incomplete
//!
//! Only the initial `ListBuckets` call can fail the whole listing.
//!
//! # Example
//!
//! ```
//! use s3dedupe::inventory::{ListerConfig, ObjectLister};
//! use s3dedupe::storage::MemoryStorage;
//!
//! let storage = MemoryStorage::with_page_size(1);
//! storage.put_object("a", "one", b"1");
//! storage.put_object("a", "two", b"2");
//! storage.create_bucket("empty");
//!
//! let lister = ObjectLister::new(&storage, ListerConfig::default());
//! let mut objects = lister.objects().unwrap();
//! let keys: Vec<String> = objects.by_ref().map(|o| o.record.key).collect();
//!
//! assert_eq!(keys, vec!["one", "two"]);
//! assert_eq!(objects.stats().buckets_empty, 1);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use super::index::FingerprintIndex;
use crate::progress::ProgressCallback;
use crate::storage::{ObjectPage, ObjectRecord, ObjectStorage, StorageError};

/// Name of the listing phase reported to progress callbacks.
pub const LISTING_PHASE: &str = "listing";

/// One object together with the bucket it was listed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub bucket: String,
    pub record: ObjectRecord,
}

impl ListedObject {
    #[must_use]
    pub fn new(bucket: impl Into<String>, record: ObjectRecord) -> Self {
        Self {
            bucket: bucket.into(),
            record,
        }
    }
}

/// Counters for a listing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingStats {
    /// Buckets scheduled for listing
    pub buckets_total: usize,
    /// Buckets listed to the end (including empty ones)
    pub buckets_listed: usize,
    /// Buckets that contained no objects
    pub buckets_empty: usize,
    /// Buckets skipped because they were missing or inaccessible
    pub buckets_skipped: usize,
    /// Buckets whose listing failed part way through
    pub buckets_incomplete: usize,
    /// Objects yielded
    pub objects_listed: usize,
    /// Listing pages fetched
    pub pages_fetched: usize,
    /// Whether listing stopped early because shutdown was requested
    pub interrupted: bool,
}

impl ListingStats {
    fn merge(&mut self, other: &ListingStats) {
        self.buckets_listed += other.buckets_listed;
        self.buckets_empty += other.buckets_empty;
        self.buckets_skipped += other.buckets_skipped;
        self.buckets_incomplete += other.buckets_incomplete;
        self.objects_listed += other.objects_listed;
        self.pages_fetched += other.pages_fetched;
        self.interrupted |= other.interrupted;
    }
}

/// Configuration for [`ObjectLister`].
#[derive(Clone, Default)]
pub struct ListerConfig {
    /// Restrict listing to these buckets, in this order. `None` lists every
    /// bucket reported by the service.
    pub buckets: Option<Vec<String>>,
    /// Buckets listed concurrently; 0 or 1 lists sequentially.
    pub list_threads: usize,
    /// Optional shutdown flag, checked between pages.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ListerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListerConfig")
            .field("buckets", &self.buckets)
            .field("list_threads", &self.list_threads)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl ListerConfig {
    /// Only list the given buckets.
    #[must_use]
    pub fn with_buckets(mut self, buckets: Vec<String>) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Set the number of buckets listed concurrently.
    #[must_use]
    pub fn with_list_threads(mut self, threads: usize) -> Self {
        self.list_threads = threads;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }
}

/// Pages of one bucket's listing, following continuation tokens to the end.
pub struct BucketPages<'a, S: ObjectStorage + ?Sized> {
    storage: &'a S,
    bucket: String,
    token: Option<String>,
    fetched: usize,
    done: bool,
}

impl<'a, S: ObjectStorage + ?Sized> BucketPages<'a, S> {
    #[must_use]
    pub fn new(storage: &'a S, bucket: impl Into<String>) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
            token: None,
            fetched: 0,
            done: false,
        }
    }

    /// Pages fetched so far.
    #[must_use]
    pub fn fetched(&self) -> usize {
        self.fetched
    }
}

impl<S: ObjectStorage + ?Sized> Iterator for BucketPages<'_, S> {
    type Item = Result<ObjectPage, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self
            .storage
            .list_objects_page(&self.bucket, self.token.as_deref());

        match result {
            Ok(page) => {
                self.fetched += 1;
                log::debug!(
                    "Listed page {} of bucket \"{}\" ({} objects)",
                    self.fetched,
                    self.bucket,
                    page.objects.len()
                );
                match &page.next_continuation {
                    Some(next) if self.token.as_deref() == Some(next.as_str()) => {
                        self.done = true;
                        return Some(Err(StorageError::Service {
                            operation: "ListObjects",
                            message: format!(
                                "continuation token did not advance for bucket {}",
                                self.bucket
                            ),
                        }));
                    }
                    Some(next) => self.token = Some(next.clone()),
                    None => self.done = true,
                }
                Some(Ok(page))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

struct Cursor<'a, S: ObjectStorage + ?Sized> {
    bucket: String,
    pages: BucketPages<'a, S>,
    objects: usize,
}

/// Lazy `(bucket, object)` sequence produced by [`ObjectLister::objects`].
pub struct Objects<'a, S: ObjectStorage + ?Sized> {
    storage: &'a S,
    buckets: std::vec::IntoIter<String>,
    current: Option<Cursor<'a, S>>,
    buffer: VecDeque<ObjectRecord>,
    stats: ListingStats,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress: Option<Arc<dyn ProgressCallback>>,
    bucket_counter: Arc<AtomicUsize>,
    report_phase: bool,
    finished: bool,
}

impl<'a, S: ObjectStorage + ?Sized> Objects<'a, S> {
    /// Counters accumulated so far. Final once the iterator returns `None`.
    #[must_use]
    pub fn stats(&self) -> ListingStats {
        self.stats
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn start_bucket(&mut self, bucket: String) {
        let ordinal = self.bucket_counter.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(cb) = &self.progress {
            cb.on_progress(ordinal, &bucket);
        }
        log::debug!("Listing bucket \"{}\"", bucket);
        self.current = Some(Cursor {
            pages: BucketPages::new(self.storage, bucket.clone()),
            bucket,
            objects: 0,
        });
    }

    fn finish_bucket(&mut self) {
        if let Some(cursor) = self.current.take() {
            self.stats.buckets_listed += 1;
            if cursor.objects == 0 {
                self.stats.buckets_empty += 1;
                log::info!("\"{}\" is empty", cursor.bucket);
            } else {
                log::debug!(
                    "Bucket \"{}\" listed: {} objects in {} pages",
                    cursor.bucket,
                    cursor.objects,
                    cursor.pages.fetched()
                );
            }
        }
    }

    fn fail_bucket(&mut self, err: &StorageError) {
        let Some(cursor) = self.current.take() else {
            return;
        };
        if cursor.objects == 0 && cursor.pages.fetched() == 0 {
            self.stats.buckets_skipped += 1;
            if err.is_bucket_access_error() {
                log::warn!(
                    "Bucket \"{}\" does not appear to exist or is not accessible: {}",
                    cursor.bucket,
                    err
                );
            } else {
                log::warn!("Skipping bucket \"{}\": {}", cursor.bucket, err);
            }
        } else {
            self.stats.buckets_incomplete += 1;
            log::warn!(
                "Listing of bucket \"{}\" stopped after {} objects: {}",
                cursor.bucket,
                cursor.objects,
                err
            );
        }
    }

    fn end(&mut self) {
        if !self.finished {
            self.finished = true;
            if self.report_phase {
                if let Some(cb) = &self.progress {
                    cb.on_phase_end(LISTING_PHASE);
                }
            }
        }
    }
}

impl<S: ObjectStorage + ?Sized> Iterator for Objects<'_, S> {
    type Item = ListedObject;

    fn next(&mut self) -> Option<ListedObject> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                let bucket = self.current.as_ref().map(|c| c.bucket.clone())?;
                return Some(ListedObject::new(bucket, record));
            }

            if self.finished {
                return None;
            }

            if self.is_shutdown_requested() {
                log::info!("Listing interrupted");
                self.stats.interrupted = true;
                self.current = None;
                self.end();
                return None;
            }

            if self.current.is_none() {
                match self.buckets.next() {
                    Some(bucket) => {
                        self.start_bucket(bucket);
                        continue;
                    }
                    None => {
                        self.end();
                        return None;
                    }
                }
            }
            let Some(cursor) = self.current.as_mut() else {
                continue;
            };

            match cursor.pages.next() {
                Some(Ok(page)) => {
                    let count = page.objects.len();
                    cursor.objects += count;
                    self.stats.pages_fetched += 1;
                    self.stats.objects_listed += count;
                    if let Some(cb) = &self.progress {
                        cb.on_item_completed(count as u64);
                    }
                    self.buffer.extend(page.objects);
                }
                Some(Err(e)) => self.fail_bucket(&e),
                None => self.finish_bucket(),
            }
        }
    }
}

/// Enumerates buckets and their objects through an [`ObjectStorage`] client.
pub struct ObjectLister<'a, S: ObjectStorage + ?Sized> {
    storage: &'a S,
    config: ListerConfig,
}

impl<'a, S: ObjectStorage + ?Sized> ObjectLister<'a, S> {
    #[must_use]
    pub fn new(storage: &'a S, config: ListerConfig) -> Self {
        Self { storage, config }
    }

    /// Buckets this lister will visit, in order.
    ///
    /// # Errors
    ///
    /// Propagates a failed `ListBuckets` call.
    pub fn buckets(&self) -> Result<Vec<String>, StorageError> {
        match &self.config.buckets {
            Some(names) => Ok(names.clone()),
            None => self.storage.list_buckets(),
        }
    }

    fn objects_for(
        &self,
        buckets: Vec<String>,
        counter: Arc<AtomicUsize>,
        report_phase: bool,
    ) -> Objects<'a, S> {
        Objects {
            storage: self.storage,
            stats: ListingStats {
                buckets_total: buckets.len(),
                ..ListingStats::default()
            },
            buckets: buckets.into_iter(),
            current: None,
            buffer: VecDeque::new(),
            shutdown_flag: self.config.shutdown_flag.clone(),
            progress: self.config.progress_callback.clone(),
            bucket_counter: counter,
            report_phase,
            finished: false,
        }
    }

    /// Lazily list every object in every bucket, sequentially.
    ///
    /// # Errors
    ///
    /// Propagates a failed `ListBuckets` call. Per-bucket errors are logged and
    /// skipped during iteration instead.
    pub fn objects(&self) -> Result<Objects<'a, S>, StorageError> {
        let buckets = self.buckets()?;
        log::info!("Found {} bucket(s)", buckets.len());
        if let Some(cb) = &self.config.progress_callback {
            cb.on_phase_start(LISTING_PHASE, buckets.len());
        }
        Ok(self.objects_for(buckets, Arc::new(AtomicUsize::new(0)), true))
    }

    /// List everything and build the fingerprint index.
    ///
    /// With `list_threads > 1` buckets are listed concurrently, one worker per
    /// bucket; the index still sees buckets in enumeration order and objects
    /// in listing order.
    ///
    /// # Errors
    ///
    /// Propagates a failed `ListBuckets` call or thread pool construction.
    pub fn index(&self) -> Result<(FingerprintIndex, ListingStats), StorageError> {
        if self.config.list_threads <= 1 {
            let mut objects = self.objects()?;
            let index = FingerprintIndex::from_listing(objects.by_ref());
            return Ok((index, objects.stats()));
        }

        let buckets = self.buckets()?;
        log::info!(
            "Found {} bucket(s), listing with {} threads",
            buckets.len(),
            self.config.list_threads
        );
        if let Some(cb) = &self.config.progress_callback {
            cb.on_phase_start(LISTING_PHASE, buckets.len());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.list_threads)
            .build()
            .map_err(|e| StorageError::Runtime(e.to_string()))?;

        let counter = Arc::new(AtomicUsize::new(0));
        let total = buckets.len();
        // collect() on an indexed parallel iterator keeps input order.
        let per_bucket: Vec<(Vec<ListedObject>, ListingStats)> = pool.install(|| {
            buckets
                .into_par_iter()
                .map(|bucket| {
                    let mut objects = self.objects_for(vec![bucket], Arc::clone(&counter), false);
                    let listed: Vec<ListedObject> = objects.by_ref().collect();
                    (listed, objects.stats())
                })
                .collect()
        });

        let mut stats = ListingStats {
            buckets_total: total,
            ..ListingStats::default()
        };
        let mut index = FingerprintIndex::new();
        for (listed, bucket_stats) in per_bucket {
            stats.merge(&bucket_stats);
            index.extend(listed);
        }

        if let Some(cb) = &self.config.progress_callback {
            cb.on_phase_end(LISTING_PHASE);
        }
        Ok((index, stats))
    }
}
