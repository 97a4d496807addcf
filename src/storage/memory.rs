//! In-memory storage backend.
//!
//! Buckets keep insertion order; keys within a bucket are listed in
//! lexicographic order, like S3. Besides plain storage it can simulate the
//! conditions the engine has to survive: missing or access-denied buckets,
//! small listing pages and deletes that fail.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;

use super::{ObjectMetadata, ObjectPage, ObjectRecord, ObjectStorage, StorageError};

/// Default page size, matching the S3 `MaxKeys` default.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BucketAccess {
    Open,
    Denied,
    /// Reported by `list_buckets` but gone by the time it is listed.
    Missing,
}

#[derive(Debug, Clone)]
struct StoredObject {
    size: u64,
    digest: String,
}

#[derive(Debug)]
struct Bucket {
    access: BucketAccess,
    objects: BTreeMap<String, StoredObject>,
}

impl Bucket {
    fn new(access: BucketAccess) -> Self {
        Self {
            access,
            objects: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    buckets: IndexMap<String, Bucket>,
    failing_deletes: HashSet<(String, String)>,
    delete_log: Vec<(String, String)>,
    list_calls: usize,
}

/// Thread-safe in-memory object store.
#[derive(Debug)]
pub struct MemoryStorage {
    state: Mutex<State>,
    page_size: usize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create an empty store with the default page size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create an empty store that returns at most `page_size` objects per page.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: page_size.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test thread panicked mid-call; the
        // data itself is still usable.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Create an empty, accessible bucket (no-op if it exists).
    pub fn create_bucket(&self, bucket: &str) {
        self.state()
            .buckets
            .entry(bucket.to_string())
            .or_insert_with(|| Bucket::new(BucketAccess::Open));
    }

    /// Register a bucket that is listed but whose contents are access-denied.
    pub fn add_denied_bucket(&self, bucket: &str) {
        self.state()
            .buckets
            .insert(bucket.to_string(), Bucket::new(BucketAccess::Denied));
    }

    /// Register a bucket that is listed but no longer exists.
    pub fn add_missing_bucket(&self, bucket: &str) {
        self.state()
            .buckets
            .insert(bucket.to_string(), Bucket::new(BucketAccess::Missing));
    }

    /// Store `content` under `bucket/key`, creating the bucket if needed.
    ///
    /// The digest is a quoted BLAKE3 hex string, mimicking the quoted ETags
    /// S3 reports.
    pub fn put_object(&self, bucket: &str, key: &str, content: &[u8]) {
        let digest = format!("\"{}\"", blake3::hash(content).to_hex());
        self.put_object_with_digest(bucket, key, content.len() as u64, &digest);
    }

    /// Store an object with an explicit size and digest.
    ///
    /// Useful for reproducing service-specific digests such as multipart
    /// ETags.
    pub fn put_object_with_digest(&self, bucket: &str, key: &str, size: u64, digest: &str) {
        let mut state = self.state();
        let entry = state
            .buckets
            .entry(bucket.to_string())
            .or_insert_with(|| Bucket::new(BucketAccess::Open));
        entry.objects.insert(
            key.to_string(),
            StoredObject {
                size,
                digest: digest.to_string(),
            },
        );
    }

    /// Make every delete of `bucket/key` fail with a service error.
    pub fn fail_deletes_of(&self, bucket: &str, key: &str) {
        self.state()
            .failing_deletes
            .insert((bucket.to_string(), key.to_string()));
    }

    /// Whether `bucket/key` currently exists.
    #[must_use]
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.state()
            .buckets
            .get(bucket)
            .is_some_and(|b| b.objects.contains_key(key))
    }

    /// Every delete request received, in order, including failed ones.
    #[must_use]
    pub fn delete_log(&self) -> Vec<(String, String)> {
        self.state().delete_log.clone()
    }

    /// Number of `list_objects_page` calls served.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    /// Total number of stored objects across all buckets.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.state().buckets.values().map(|b| b.objects.len()).sum()
    }
}

impl ObjectStorage for MemoryStorage {
    fn list_buckets(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.state().buckets.keys().cloned().collect())
    }

    fn list_objects_page(
        &self,
        bucket: &str,
        continuation: Option<&str>,
    ) -> Result<ObjectPage, StorageError> {
        let mut state = self.state();
        state.list_calls += 1;

        let entry = match state.buckets.get(bucket) {
            Some(b) if b.access == BucketAccess::Open => b,
            Some(b) if b.access == BucketAccess::Denied => {
                return Err(StorageError::AccessDenied(bucket.to_string()))
            }
            _ => return Err(StorageError::BucketNotFound(bucket.to_string())),
        };

        let start = match continuation {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Unbounded,
        };

        let objects: Vec<ObjectRecord> = entry
            .objects
            .range((start, Bound::Unbounded))
            .take(self.page_size)
            .map(|(key, obj)| ObjectRecord::new(key.clone(), obj.size, obj.digest.clone()))
            .collect();

        let next_continuation = match objects.last() {
            Some(last)
                if entry
                    .objects
                    .range::<String, _>((Bound::Excluded(&last.key), Bound::Unbounded))
                    .next()
                    .is_some() =>
            {
                Some(last.key.clone())
            }
            _ => None,
        };

        Ok(ObjectPage {
            objects,
            next_continuation,
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let mut state = self.state();
        state
            .delete_log
            .push((bucket.to_string(), key.to_string()));

        if state
            .failing_deletes
            .contains(&(bucket.to_string(), key.to_string()))
        {
            return Err(StorageError::Service {
                operation: "DeleteObject",
                message: format!("InternalError deleting {bucket}/{key}"),
            });
        }

        match state.buckets.get_mut(bucket) {
            Some(b) if b.access == BucketAccess::Open => {
                // Deleting a missing key succeeds, as it does in S3.
                b.objects.remove(key);
                Ok(())
            }
            Some(b) if b.access == BucketAccess::Denied => {
                Err(StorageError::AccessDenied(bucket.to_string()))
            }
            _ => Err(StorageError::BucketNotFound(bucket.to_string())),
        }
    }

    fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>, StorageError> {
        let state = self.state();
        match state.buckets.get(bucket) {
            Some(b) if b.access == BucketAccess::Denied => {
                Err(StorageError::AccessDenied(bucket.to_string()))
            }
            Some(b) => Ok(b.objects.get(key).map(|obj| ObjectMetadata {
                size: obj.size,
                digest: Some(obj.digest.clone()),
            })),
            None => Ok(None),
        }
    }
}
