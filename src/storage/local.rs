//! Local directory backend.
//!
//! Treats every immediate subdirectory of a root directory as a bucket and
//! every regular file below it as an object whose key is the `/`-separated
//! path relative to the bucket directory. Digests are quoted BLAKE3 hex
//! strings computed by streaming the file.
//!
//! ```text
//! root/
//! ├── photos/          bucket "photos"
//! │   ├── a.jpg        key "a.jpg"
//! │   └── 2023/b.jpg   key "2023/b.jpg"
//! └── backups/         bucket "backups"
//! ```
//!
//! A listing walks the bucket once, when its first page is requested. Later
//! pages are served from that sorted snapshot; files removed in between are
//! skipped and files added in between appear in the next listing.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use walkdir::WalkDir;

use super::{ObjectMetadata, ObjectPage, ObjectRecord, ObjectStorage, StorageError};
use crate::storage::memory::DEFAULT_PAGE_SIZE;

/// Storage backend over a local directory tree.
#[derive(Debug)]
pub struct LocalStorage {
    root: PathBuf,
    page_size: usize,
    /// Sorted keys of every bucket with a listing in progress
    snapshots: Mutex<HashMap<String, Arc<Vec<String>>>>,
}

impl LocalStorage {
    /// Create a backend rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Limit the number of objects returned per listing page.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Root directory of this backend.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshots(&self) -> MutexGuard<'_, HashMap<String, Arc<Vec<String>>>> {
        self.snapshots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keys for one page request. A fresh listing walks the bucket and
    /// stores the snapshot; a continued listing reuses it.
    fn listing_keys(
        &self,
        bucket: &str,
        dir: &Path,
        continuation: Option<&str>,
    ) -> Result<Arc<Vec<String>>, StorageError> {
        if continuation.is_some() {
            if let Some(keys) = self.snapshots().get(bucket) {
                return Ok(Arc::clone(keys));
            }
        }
        let keys = Arc::new(self.sorted_keys(bucket, dir)?);
        self.snapshots()
            .insert(bucket.to_string(), Arc::clone(&keys));
        Ok(keys)
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }
        let dir = self.root.join(bucket);
        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(StorageError::BucketNotFound(bucket.to_string())),
            Err(e) => Err(map_bucket_error(bucket, &dir, e)),
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let dir = self.bucket_dir(bucket)?;
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        Ok(dir.join(relative))
    }

    /// All keys of a bucket, sorted lexicographically.
    fn sorted_keys(&self, bucket: &str, dir: &Path) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf);
                match e.into_io_error() {
                    Some(io_err) => map_bucket_error(bucket, &path, io_err),
                    None => StorageError::Io {
                        path,
                        source: io::Error::new(io::ErrorKind::Other, "filesystem loop"),
                    },
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(dir) else {
                continue;
            };
            match relative_key(relative) {
                Some(key) => keys.push(key),
                None => log::warn!("Skipping non UTF-8 path: {}", entry.path().display()),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Quoted BLAKE3 hex digest of a file's content.
fn file_digest(path: &Path) -> Result<String, StorageError> {
    let mut file = File::open(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(format!("\"{}\"", hasher.finalize().to_hex()))
}

fn relative_key(relative: &Path) -> Option<String> {
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    parts.map(|p| p.join("/"))
}

fn map_bucket_error(bucket: &str, path: &Path, err: io::Error) -> StorageError {
    match err.kind() {
        io::ErrorKind::NotFound => StorageError::BucketNotFound(bucket.to_string()),
        io::ErrorKind::PermissionDenied => StorageError::AccessDenied(bucket.to_string()),
        _ => StorageError::Io {
            path: path.to_path_buf(),
            source: err,
        },
    }
}

impl ObjectStorage for LocalStorage {
    fn list_buckets(&self) -> Result<Vec<String>, StorageError> {
        let entries = fs::read_dir(&self.root).map_err(|source| StorageError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut buckets = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::Io {
                path: self.root.clone(),
                source,
            })?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => buckets.push(name),
                Err(name) => log::warn!("Skipping non UTF-8 bucket directory: {:?}", name),
            }
        }
        buckets.sort();
        Ok(buckets)
    }

    fn list_objects_page(
        &self,
        bucket: &str,
        continuation: Option<&str>,
    ) -> Result<ObjectPage, StorageError> {
        let dir = self.bucket_dir(bucket)?;
        let keys = self.listing_keys(bucket, &dir, continuation)?;

        let start = match continuation {
            Some(token) => keys.partition_point(|k| k.as_str() <= token),
            None => 0,
        };
        let end = (start + self.page_size).min(keys.len());

        let mut objects = Vec::with_capacity(end - start);
        for key in &keys[start..end] {
            let path = dir.join(key);
            match fs::metadata(&path) {
                Ok(meta) => {
                    objects.push(ObjectRecord::new(key.clone(), meta.len(), file_digest(&path)?));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    log::debug!("{} was removed during listing", path.display());
                }
                Err(source) => return Err(StorageError::Io { path, source }),
            }
        }

        let next_continuation = if end < keys.len() {
            Some(keys[end - 1].clone())
        } else {
            self.snapshots().remove(bucket);
            None
        };

        Ok(ObjectPage {
            objects,
            next_continuation,
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                Err(StorageError::AccessDenied(bucket.to_string()))
            }
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>, StorageError> {
        let path = match self.object_path(bucket, key) {
            Ok(path) => path,
            Err(StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. }) => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(ObjectMetadata {
                size: meta.len(),
                digest: Some(file_digest(&path)?),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }
}
