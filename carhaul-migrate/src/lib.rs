//! # carhaul-migrate
//!
//! The three migration workers and their shared plumbing:
//!
//! - [`hash::hash_shard`] — stream a source object, return its CAR cid
//! - [`copy::copy_shard`] — idempotent streaming copy with side-index
//!   production, root→shard link marker, and integrity checking
//! - [`reindex::reindex_shard`] — repoint the block-index table rows for
//!   one shard from the legacy carpath to the canonical one
//!
//! Each worker is a pure function of its request and environment; they
//! share no in-process state, so one process can run many shards
//! concurrently. Requests arrive as flat string maps ([`request`]) and
//! environments come from process env ([`config`]); the HTTP surface and
//! the driver CLI are thin shells over these functions.

pub mod block_source;
pub mod config;
pub mod copy;
pub mod error;
pub mod hash;
pub mod reindex;
pub mod request;

pub use block_source::MultihashSource;
pub use config::{connect_source, DestEnv, Destination, TableEnv};
pub use copy::{copy_shard, CopyOptions, CopyOutcome, DEFAULT_MAX_PUT_SIZE, TARGET_PART_SIZE};
pub use error::{MigrateError, Result};
pub use hash::hash_shard;
pub use reindex::reindex_shard;
pub use request::{
    CopyRequest, CopyResponse, ErrorResponse, HashRequest, HashResponse, IndexRequest,
    IndexResponse, ALLOWED_REGIONS, SOURCE_BUCKET_PREFIX,
};
