//! Object locators and carpath formatting.
//!
//! A `carpath` is the block-index table's sort key: the string that names
//! which stored object a block's offsets refer to. Legacy rows use
//! `{region}/{bucket}/{key}`; migrated rows use the canonical prefix below.

use crate::shard::{RootLink, ShardId};

/// Carpath prefix for migrated rows.
///
/// Opaque literal — the leading segment happens to look like a region but
/// must never be parsed as one.
pub const CANONICAL_PATH_PREFIX: &str = "auto/carpark-prod-0";

/// A locator for a stored object. Endpoint and credentials are store-level
/// configuration, not part of the locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub region: String,
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(
        region: impl Into<String>,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// The legacy carpath of this object: `{region}/{bucket}/{key}`.
    pub fn carpath(&self) -> String {
        format!("{}/{}/{}", self.region, self.bucket, self.key)
    }

    /// Key of this object's sorted side index, if one was produced
    /// alongside it.
    pub fn side_index_ref(&self) -> ObjectRef {
        ObjectRef {
            region: self.region.clone(),
            bucket: self.bucket.clone(),
            key: format!("{}.idx", self.key),
        }
    }
}

/// An `ObjectRef` whose content identity is asserted by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardRef {
    pub object: ObjectRef,
    pub shard: ShardId,
}

/// Carpath of a migrated shard: `auto/carpark-prod-0/{shard}/{shard}.car`.
pub fn canonical_carpath(shard: &ShardId) -> String {
    format!("{CANONICAL_PATH_PREFIX}/{shard}/{shard}.car")
}

/// Destination key of the shard body: `{shard}/{shard}.car`.
pub fn shard_key(shard: &ShardId) -> String {
    format!("{shard}/{shard}.car")
}

/// Destination key of the sorted side index: `{shard}/{shard}.car.idx`.
pub fn side_index_key(shard: &ShardId) -> String {
    format!("{shard}/{shard}.car.idx")
}

/// Destination key of the zero-byte root→shard link marker:
/// `{root}/{shard}`.
pub fn link_key(root: &RootLink, shard: &ShardId) -> String {
    format!("{root}/{shard}")
}
