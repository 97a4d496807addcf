//! Object storage access.
//!
//! Everything the dedupe engine needs from a storage service goes through the
//! [`ObjectStorage`] trait. Backends:
//!
//! - [`s3::S3Storage`]: Amazon S3 or any S3-compatible endpoint (feature `s3`)
//! - [`local::LocalStorage`]: a directory whose subdirectories are buckets
//! - [`memory::MemoryStorage`]: in-memory buckets for tests and benchmarks
//!
//! A client is constructed once per command and handed to the components by
//! reference; there is no process-wide client.
//!
//! # Example
//!
//! ```
//! use s3dedupe::storage::{MemoryStorage, ObjectStorage};
//!
//! let storage = MemoryStorage::new();
//! storage.put_object("photos", "a.jpg", b"jpeg bytes");
//!
//! let buckets = storage.list_buckets().unwrap();
//! assert_eq!(buckets, vec!["photos".to_string()]);
//! ```

pub mod local;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use local::LocalStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "s3")]
pub use s3::S3Storage;

/// Errors reported by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The bucket does not exist.
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// The credentials in use may not access the bucket.
    #[error("access denied to bucket: {0}")]
    AccessDenied(String),

    /// The object does not exist.
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    /// The service rejected or failed a request.
    #[error("{operation} failed: {message}")]
    Service {
        operation: &'static str,
        message: String,
    },

    /// Local I/O failure (local backend).
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The client could not be constructed or driven.
    #[error("storage client error: {0}")]
    Runtime(String),
}

impl StorageError {
    /// Whether this error means the bucket cannot be listed at all.
    ///
    /// The lister turns these into a warning and skips the bucket.
    #[must_use]
    pub fn is_bucket_access_error(&self) -> bool {
        matches!(self, Self::BucketNotFound(_) | Self::AccessDenied(_))
    }
}

/// One object as reported by a listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    /// Object key within its bucket
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Content digest exactly as the service reports it (often quoted)
    pub digest: String,
}

impl ObjectRecord {
    #[must_use]
    pub fn new(key: impl Into<String>, size: u64, digest: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size,
            digest: digest.into(),
        }
    }
}

/// A single page of a bucket listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    /// Objects on this page, in service order
    pub objects: Vec<ObjectRecord>,
    /// Token for the next page; `None` once the listing is exhausted
    pub next_continuation: Option<String>,
}

/// Metadata returned by a head request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Size in bytes
    pub size: u64,
    /// Content digest as reported by the service
    pub digest: Option<String>,
}

/// The operations the dedupe engine consumes from a storage service.
///
/// Listing is exposed one page at a time so that callers stay in control of
/// pagination; see [`crate::inventory::ObjectLister`] for the draining loop.
pub trait ObjectStorage: Send + Sync {
    /// Names of every bucket visible to the account, in service order.
    fn list_buckets(&self) -> Result<Vec<String>, StorageError>;

    /// Fetch one page of a bucket listing.
    ///
    /// `continuation` is `None` for the first page and the previous page's
    /// `next_continuation` afterwards.
    fn list_objects_page(
        &self,
        bucket: &str,
        continuation: Option<&str>,
    ) -> Result<ObjectPage, StorageError>;

    /// Delete one object.
    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Look up an object without fetching it. `Ok(None)` means not found.
    fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>, StorageError>;
}

impl<T: ObjectStorage + ?Sized> ObjectStorage for Box<T> {
    fn list_buckets(&self) -> Result<Vec<String>, StorageError> {
        (**self).list_buckets()
    }

    fn list_objects_page(
        &self,
        bucket: &str,
        continuation: Option<&str>,
    ) -> Result<ObjectPage, StorageError> {
        (**self).list_objects_page(bucket, continuation)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        (**self).delete_object(bucket, key)
    }

    fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>, StorageError> {
        (**self).head_object(bucket, key)
    }
}
