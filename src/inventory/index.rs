//! Fingerprint index: every fingerprint mapped to the locations sharing it.
//!
//! Fingerprints keep the order in which they were first seen and each
//! location list keeps arrival order, so the first location of a list is the
//! first copy discovered.

use indexmap::IndexMap;

use super::fingerprint::{ContentFingerprint, ObjectLocation};
use super::ListedObject;

/// Counters collected while indexing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Objects offered to the index
    pub objects_seen: usize,
    /// Objects skipped because they are empty
    pub empty_skipped: usize,
    /// Objects recorded under a fingerprint
    pub indexed: usize,
    /// Bytes across indexed objects
    pub indexed_bytes: u64,
}

/// Mapping from fingerprint to the ordered locations that share it.
#[derive(Debug, Clone, Default)]
pub struct FingerprintIndex {
    entries: IndexMap<ContentFingerprint, Vec<ObjectLocation>>,
    stats: IndexStats,
}

impl FingerprintIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from a listing sequence.
    ///
    /// ```
    /// use s3dedupe::inventory::{FingerprintIndex, ListedObject};
    /// use s3dedupe::storage::ObjectRecord;
    ///
    /// let listing = vec![
    ///     ListedObject::new("a", ObjectRecord::new("x", 3, "\"d1\"")),
    ///     ListedObject::new("b", ObjectRecord::new("y", 3, "d1")),
    ///     ListedObject::new("b", ObjectRecord::new("empty", 0, "\"d0\"")),
    /// ];
    /// let index = FingerprintIndex::from_listing(listing);
    ///
    /// assert_eq!(index.len(), 1);
    /// assert_eq!(index.stats().empty_skipped, 1);
    /// ```
    pub fn from_listing<I>(listing: I) -> Self
    where
        I: IntoIterator<Item = ListedObject>,
    {
        let mut index = Self::new();
        index.extend(listing);
        index
    }

    /// Record one listed object.
    ///
    /// Empty objects are never fingerprinted, whatever their digest.
    pub fn insert(&mut self, object: ListedObject) {
        self.stats.objects_seen += 1;

        if object.record.size == 0 {
            self.stats.empty_skipped += 1;
            log::trace!("Skipping empty object {}/{}", object.bucket, object.record.key);
            return;
        }

        let fingerprint = ContentFingerprint::new(&object.record.digest, object.record.size);
        self.stats.indexed += 1;
        self.stats.indexed_bytes = self.stats.indexed_bytes.saturating_add(object.record.size);

        self.entries
            .entry(fingerprint)
            .or_default()
            .push(ObjectLocation::new(object.bucket, object.record.key));
    }

    /// Locations recorded for `fingerprint`, in arrival order.
    #[must_use]
    pub fn get(&self, fingerprint: &ContentFingerprint) -> Option<&[ObjectLocation]> {
        self.entries.get(fingerprint).map(Vec::as_slice)
    }

    /// Iterate entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&ContentFingerprint, &[ObjectLocation])> {
        self.entries.iter().map(|(fp, locs)| (fp, locs.as_slice()))
    }

    /// Number of distinct fingerprints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        self.stats
    }

    /// Consume the index, yielding entries in first-seen order.
    pub fn into_entries(self) -> impl Iterator<Item = (ContentFingerprint, Vec<ObjectLocation>)> {
        self.entries.into_iter()
    }
}

impl Extend<ListedObject> for FingerprintIndex {
    fn extend<T: IntoIterator<Item = ListedObject>>(&mut self, iter: T) {
        for object in iter {
            self.insert(object);
        }
    }
}
