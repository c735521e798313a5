//! # carhaul-core
//!
//! Runtime-agnostic core for CAR shard migration.
//!
//! This crate provides:
//! - Shard and root identifiers (`ShardId`, `RootLink`) over CIDv1
//! - Object locators and carpath formatting (`ObjectRef`, `ShardRef`)
//! - An incremental CAR v1 frame decoder (`CarDecoder`)
//! - The sorted multihash→offset side-index codec (`SideIndexWriter`/reader)
//!
//! ## Design Principles
//!
//! 1. **No I/O**: everything here operates on byte slices and chunks;
//!    the AWS adapters and workers live in sibling crates.
//! 2. **Chunk-split agnostic**: the CAR decoder accepts arbitrary chunk
//!    boundaries so callers can feed network reads directly.
//! 3. **Strict identities**: a `ShardId` always carries the CAR multicodec;
//!    constructing one from a foreign codec is an error, not a coercion.

pub mod car;
pub mod error;
pub mod object_ref;
pub mod shard;
pub mod side_index;
pub mod varint;

pub use car::{Block, BlockBody, CarDecoder, CarError};
pub use error::{Error, Result};
pub use object_ref::{
    canonical_carpath, link_key, shard_key, side_index_key, ObjectRef, ShardRef,
    CANONICAL_PATH_PREFIX,
};
pub use shard::{multihash_base58, RootLink, ShardId, CAR_CODEC, SHA2_256};
pub use side_index::{SideIndexError, SideIndexWriter, MULTIHASH_INDEX_SORTED_CODEC};
