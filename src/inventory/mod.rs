//! Inventory pass: list every object and index it by content fingerprint.
//!
//! # Architecture
//!
//! - [`lister`]: bucket enumeration and fully paginated object listing
//! - [`fingerprint`]: [`ContentFingerprint`] and [`ObjectLocation`]
//! - [`index`]: [`FingerprintIndex`], fingerprint → locations in discovery order
//!
//! The duplicate register is built from the index by
//! [`crate::register::DuplicateRegister::from_index`].

pub mod fingerprint;
pub mod index;
pub mod lister;

pub use fingerprint::{normalize_digest, ContentFingerprint, FingerprintParseError, ObjectLocation};
pub use index::{FingerprintIndex, IndexStats};
pub use lister::{BucketPages, ListedObject, ListerConfig, ListingStats, ObjectLister, Objects};
