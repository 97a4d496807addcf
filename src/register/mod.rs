//! The duplicate register: the only artifact shared by `check` and `delete`.
//!
//! # Overview
//!
//! A register maps each duplicated [`ContentFingerprint`] to the ordered
//! locations holding that content. The first location of a group is the
//! keeper; every later location is removable.
//!
//! On disk it is a JSON object (see [`io`]):
//!
//! ```json
//! {
//!   "9a0364b9e99bb480dd25e1f0284c8555,7": [
//!     ["bucket-a", "dupe"],
//!     ["bucket-a", "dupe1"],
//!     ["bucket-b", "dupe"]
//!   ]
//! }
//! ```
//!
//! # Example
//!
//! ```
//! use s3dedupe::inventory::{FingerprintIndex, ListedObject};
//! use s3dedupe::register::DuplicateRegister;
//! use s3dedupe::storage::ObjectRecord;
//!
//! let index = FingerprintIndex::from_listing(vec![
//!     ListedObject::new("a", ObjectRecord::new("x", 3, "\"d1\"")),
//!     ListedObject::new("b", ObjectRecord::new("y", 3, "\"d1\"")),
//!     ListedObject::new("b", ObjectRecord::new("z", 9, "\"d2\"")),
//! ]);
//! let register = DuplicateRegister::from_index(index);
//!
//! assert_eq!(register.len(), 1);
//! let group = register.groups().next().unwrap();
//! assert_eq!(group.keeper().unwrap().key, "x");
//! assert_eq!(group.removables().len(), 1);
//! ```

pub mod io;

use std::fmt;

use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::inventory::{ContentFingerprint, FingerprintIndex, ObjectLocation};

pub use io::RegisterError;

/// One duplicate group borrowed from a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateGroup<'a> {
    /// Shared fingerprint
    pub fingerprint: &'a ContentFingerprint,
    /// All locations, keeper first
    pub locations: &'a [ObjectLocation],
}

impl<'a> DuplicateGroup<'a> {
    /// The copy that is kept. `None` only for an empty group from a
    /// hand-edited register.
    #[must_use]
    pub fn keeper(&self) -> Option<&'a ObjectLocation> {
        self.locations.first()
    }

    /// Every location after the keeper, in register order.
    #[must_use]
    pub fn removables(&self) -> &'a [ObjectLocation] {
        self.locations.get(1..).unwrap_or(&[])
    }

    /// Whether this group has anything to delete.
    #[must_use]
    pub fn has_removables(&self) -> bool {
        self.locations.len() > 1
    }

    /// Bytes freed by deleting every removable copy, saturating at `u64::MAX`.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.fingerprint
            .size
            .saturating_mul(self.removables().len() as u64)
    }
}

/// Summary figures for a register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterStats {
    /// Number of groups
    pub groups: usize,
    /// Locations across all groups
    pub locations: usize,
    /// Locations that would be deleted
    pub removable: usize,
    /// Bytes freed by deleting every removable location
    pub reclaimable_bytes: u64,
    /// Groups whose digest is a multipart ETag
    pub multipart_groups: usize,
}

/// Fingerprints that occur at two or more locations, with their locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DuplicateRegister {
    groups: IndexMap<ContentFingerprint, Vec<ObjectLocation>>,
}

/// Reads the register object, refusing a fingerprint that appears twice.
struct RegisterVisitor;

impl<'de> Visitor<'de> for RegisterVisitor {
    type Value = DuplicateRegister;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object mapping \"<digest>,<size>\" to [bucket, key] pairs")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut groups = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(fingerprint) = map.next_key::<ContentFingerprint>()? {
            match groups.entry(fingerprint) {
                Entry::Occupied(entry) => {
                    return Err(de::Error::custom(format!(
                        "duplicate fingerprint '{}'",
                        entry.key()
                    )));
                }
                Entry::Vacant(entry) => {
                    entry.insert(map.next_value::<Vec<ObjectLocation>>()?);
                }
            }
        }
        Ok(DuplicateRegister { groups })
    }
}

impl<'de> Deserialize<'de> for DuplicateRegister {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RegisterVisitor)
    }
}

impl DuplicateRegister {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the index entries with at least two locations.
    ///
    /// Group order follows the index's first-seen order and location order
    /// inside a group is untouched.
    #[must_use]
    pub fn from_index(index: FingerprintIndex) -> Self {
        let groups: IndexMap<_, _> = index
            .into_entries()
            .filter(|(_, locations)| locations.len() >= 2)
            .collect();
        log::debug!("Register built with {} duplicate group(s)", groups.len());
        Self { groups }
    }

    /// Add or replace a group. Used when assembling a register by hand.
    pub fn insert(&mut self, fingerprint: ContentFingerprint, locations: Vec<ObjectLocation>) {
        self.groups.insert(fingerprint, locations);
    }

    /// Locations stored for `fingerprint`.
    #[must_use]
    pub fn get(&self, fingerprint: &ContentFingerprint) -> Option<&[ObjectLocation]> {
        self.groups.get(fingerprint).map(Vec::as_slice)
    }

    /// Groups in register order.
    pub fn groups(&self) -> impl Iterator<Item = DuplicateGroup<'_>> {
        self.groups.iter().map(|(fingerprint, locations)| DuplicateGroup {
            fingerprint,
            locations,
        })
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of removable locations.
    #[must_use]
    pub fn removable_count(&self) -> usize {
        self.groups().map(|g| g.removables().len()).sum()
    }

    /// Compute summary figures.
    #[must_use]
    pub fn stats(&self) -> RegisterStats {
        self.groups().fold(RegisterStats::default(), |mut stats, group| {
            stats.groups += 1;
            stats.locations += group.locations.len();
            stats.removable += group.removables().len();
            stats.reclaimable_bytes = stats
                .reclaimable_bytes
                .saturating_add(group.reclaimable_bytes());
            if group.fingerprint.is_multipart() {
                stats.multipart_groups += 1;
            }
            stats
        })
    }
}
