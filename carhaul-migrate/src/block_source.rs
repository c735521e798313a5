//! Multihash source for reindexing.
//!
//! Yields every block multihash contained in a shard, preferring the
//! precomputed sorted side index at `{key}.idx` and falling back to
//! parsing the shard itself. Finite, single-consumer, pull-based: the
//! fallback path reads source chunks only as the consumer asks for more.

use crate::error::{MigrateError, Result};
use carhaul_core::{side_index, CarDecoder, ShardRef};
use carhaul_storage_aws::{ObjectBody, ObjectStore, StorageError};
use multihash::Multihash;
use tracing::debug;

enum Inner {
    /// Entries from the fetched side index, in multihash-sorted order.
    SideIndex(std::vec::IntoIter<(Multihash<64>, u64)>),
    /// Streaming CAR parse over the shard body, in file order.
    Car {
        body: ObjectBody,
        decoder: CarDecoder,
        done: bool,
    },
}

/// Lazy sequence of the shard's block multihashes.
pub struct MultihashSource {
    inner: Inner,
}

impl MultihashSource {
    /// Open the best available source for `src`.
    ///
    /// A 404 on the side index selects the shard fallback; any other GET
    /// failure is fatal.
    pub async fn open(store: &ObjectStore, src: &ShardRef) -> Result<Self> {
        let idx = src.object.side_index_ref();
        match store.get(&idx.bucket, &idx.key).await {
            Ok(body) => {
                let bytes = body.collect().await?;
                let entries = side_index::decode(&bytes)
                    .map_err(|e| MigrateError::upstream(format!("bad side index {}: {e}", idx.key)))?;
                debug!(key = %idx.key, entries = entries.len(), "multihash source: side index");
                Ok(Self {
                    inner: Inner::SideIndex(entries.into_iter()),
                })
            }
            Err(StorageError::NotFound(_)) => {
                debug!(key = %src.object.key, "multihash source: shard fallback");
                let body = store.get(&src.object.bucket, &src.object.key).await?;
                Ok(Self {
                    inner: Inner::Car {
                        body,
                        decoder: CarDecoder::new(),
                        done: false,
                    },
                })
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Pull the next multihash; `None` when the shard is exhausted.
    pub async fn next(&mut self) -> Result<Option<Multihash<64>>> {
        match &mut self.inner {
            Inner::SideIndex(entries) => Ok(entries.next().map(|(mh, _)| mh)),
            Inner::Car {
                body,
                decoder,
                done,
            } => {
                if *done {
                    return Ok(None);
                }
                loop {
                    if let Some(block) = decoder.next_block().map_err(|e| {
                        MigrateError::upstream(format!("source is not a valid CAR: {e}"))
                    })? {
                        return Ok(Some(*block.cid.hash()));
                    }
                    match body.next_chunk().await? {
                        Some(chunk) => decoder.extend(&chunk),
                        None => {
                            decoder.finish().map_err(|e| {
                                MigrateError::upstream(format!("source is not a valid CAR: {e}"))
                            })?;
                            *done = true;
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }
}
