//! Worker request parsing and response shapes.
//!
//! Every worker is invoked with a flat string map (URL query parameters).
//! Parsing validates the source location up front so bad requests never
//! touch the stores: the region must be one of the migration source
//! regions, the bucket must belong to the legacy storage fleet, and the
//! key must name a CAR file.

use crate::error::{MigrateError, Result};
use carhaul_core::{ObjectRef, RootLink, ShardId, ShardRef};
use serde::Serialize;
use std::collections::HashMap;

/// Regions the legacy store lives in.
pub const ALLOWED_REGIONS: [&str; 2] = ["us-east-2", "us-west-2"];

/// Legacy bucket fleet name prefix.
pub const SOURCE_BUCKET_PREFIX: &str = "dotstorage";

fn require<'a>(query: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    query
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| MigrateError::validation(format!("missing query parameter '{name}'")))
}

fn parse_source(query: &HashMap<String, String>) -> Result<ObjectRef> {
    let region = require(query, "region")?;
    if !ALLOWED_REGIONS.contains(&region) {
        return Err(MigrateError::validation(format!(
            "region '{region}' is not a migration source region"
        )));
    }

    let bucket = require(query, "bucket")?;
    if !bucket.starts_with(SOURCE_BUCKET_PREFIX) {
        return Err(MigrateError::validation(format!(
            "bucket '{bucket}' does not start with '{SOURCE_BUCKET_PREFIX}'"
        )));
    }

    let key = require(query, "key")?;
    if !key.ends_with(".car") {
        return Err(MigrateError::validation(format!(
            "key '{key}' does not end with '.car'"
        )));
    }

    Ok(ObjectRef::new(region, bucket, key))
}

fn parse_shard(query: &HashMap<String, String>) -> Result<ShardId> {
    require(query, "shard")?
        .parse()
        .map_err(|e| MigrateError::validation(format!("invalid 'shard': {e}")))
}

/// Hash worker request: just a validated source location.
#[derive(Debug, Clone)]
pub struct HashRequest {
    pub src: ObjectRef,
}

impl HashRequest {
    pub fn from_query(query: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            src: parse_source(query)?,
        })
    }
}

/// Copy worker request: source location, asserted shard cid, DAG root.
#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub src: ShardRef,
    pub root: RootLink,
}

impl CopyRequest {
    pub fn from_query(query: &HashMap<String, String>) -> Result<Self> {
        let object = parse_source(query)?;
        let shard = parse_shard(query)?;
        let root = require(query, "root")?
            .parse()
            .map_err(|e| MigrateError::validation(format!("invalid 'root': {e}")))?;
        Ok(Self {
            src: ShardRef { object, shard },
            root,
        })
    }
}

/// Reindex worker request: source location plus asserted shard cid.
#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub src: ShardRef,
}

impl IndexRequest {
    pub fn from_query(query: &HashMap<String, String>) -> Result<Self> {
        let object = parse_source(query)?;
        let shard = parse_shard(query)?;
        Ok(Self {
            src: ShardRef { object, shard },
        })
    }
}

// ─── Response shapes ────────────────────────────────────────────────────────

/// A cid in dag-json link form: `{"/": "<cid>"}`.
#[derive(Debug, Clone, Serialize)]
pub struct CidLink {
    #[serde(rename = "/")]
    pub cid: String,
}

impl From<&ShardId> for CidLink {
    fn from(shard: &ShardId) -> Self {
        Self {
            cid: shard.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HashResponse {
    pub ok: bool,
    pub cid: CidLink,
}

impl HashResponse {
    pub fn new(shard: &ShardId) -> Self {
        Self {
            ok: true,
            cid: shard.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CopyResponse {
    pub ok: bool,
}

impl CopyResponse {
    pub fn new() -> Self {
        Self { ok: true }
    }
}

impl Default for CopyResponse {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub ok: bool,
    pub updated: u64,
}

impl IndexResponse {
    pub fn new(updated: u64) -> Self {
        Self { ok: true, updated }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    /// Status code plus serializable body for an error.
    pub fn from_error(err: &MigrateError) -> (u16, Self) {
        (
            err.status(),
            Self {
                ok: false,
                error: err.to_string(),
            },
        )
    }
}
