//! Shard reindexer: repoint every block-index row for a shard's
//! multihashes from its legacy carpath to the canonical one.
//!
//! Pipeline: multihashes stream out of [`MultihashSource`] into lookup
//! batches of 100; each found row is rewritten in batches of 25 with
//! parallelism 5. Per batch, new rows are written **before** old keys are
//! deleted, so a concurrent reader always finds the block at one of the
//! two locations. Rows keyed to any other carpath are never touched —
//! every table call uses the full `(blockmultihash, carpath)` key.
//!
//! The whole operation is idempotent: re-putting a canonical row is a
//! no-op, deleting an absent legacy key is a no-op, and a multihash whose
//! legacy row is already gone simply drops out at the lookup step.

use crate::block_source::MultihashSource;
use crate::error::{MigrateError, Result};
use crate::request::IndexRequest;
use carhaul_core::{canonical_carpath, multihash_base58};
use carhaul_storage_aws::{BlockIndexKey, BlockIndexRow, BlockIndexTable, ObjectStore};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// BatchGetItem page size.
pub const LOOKUP_BATCH: usize = 100;

/// BatchWriteItem page size.
pub const REWRITE_BATCH: usize = 25;

/// Concurrent rewrite batches.
pub const REWRITE_CONCURRENCY: usize = 5;

/// Extra attempts when the store reports unprocessed items.
pub const UNPROCESSED_RETRIES: usize = 2;

/// Rewrite all rows for the shard at `req.src`. Returns the number of
/// rows rewritten.
pub async fn reindex_shard(
    source: &ObjectStore,
    table: &BlockIndexTable,
    req: &IndexRequest,
) -> Result<u64> {
    let legacy_carpath = req.src.object.carpath();
    let canonical = canonical_carpath(&req.src.shard);

    let mut multihashes = MultihashSource::open(source, &req.src).await?;
    let semaphore = Arc::new(Semaphore::new(REWRITE_CONCURRENCY));
    let mut rewrites = FuturesUnordered::new();

    let mut lookup: Vec<BlockIndexKey> = Vec::with_capacity(LOOKUP_BATCH);
    let mut seen: u64 = 0;
    loop {
        let next = multihashes.next().await?;
        if let Some(mh) = &next {
            seen += 1;
            lookup.push(BlockIndexKey {
                block_multihash: multihash_base58(mh),
                carpath: legacy_carpath.clone(),
            });
            if lookup.len() < LOOKUP_BATCH {
                continue;
            }
        }
        if !lookup.is_empty() {
            let keys = std::mem::take(&mut lookup);
            // Multihashes without a legacy row (already migrated, or never
            // indexed at this carpath) drop out here.
            let rows = table.batch_get(&keys).await?;
            debug!(requested = keys.len(), found = rows.len(), "looked up legacy rows");
            for chunk in rows.chunks(REWRITE_BATCH) {
                let batch = chunk.to_vec();
                let table = table.clone();
                let semaphore = Arc::clone(&semaphore);
                let canonical = canonical.clone();
                rewrites.push(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| MigrateError::upstream("rewrite semaphore closed"))?;
                    rewrite_batch(&table, batch, &canonical).await
                });
            }
        }
        if next.is_none() {
            break;
        }
    }

    let mut updated: u64 = 0;
    while let Some(result) = rewrites.next().await {
        updated += result?;
    }

    info!(
        shard = %req.src.shard,
        multihashes = seen,
        updated,
        "reindexed shard"
    );
    Ok(updated)
}

/// Rewrite one batch of rows: put canonical rows, then delete legacy keys.
async fn rewrite_batch(
    table: &BlockIndexTable,
    rows: Vec<BlockIndexRow>,
    canonical: &str,
) -> Result<u64> {
    let count = rows.len() as u64;

    let new_rows: Vec<BlockIndexRow> = rows
        .iter()
        .map(|row| BlockIndexRow {
            block_multihash: row.block_multihash.clone(),
            carpath: canonical.to_string(),
            offset: row.offset,
            length: row.length,
        })
        .collect();
    retry_unprocessed(new_rows, |batch| async move { table.batch_put(&batch).await }).await?;

    let old_keys: Vec<BlockIndexKey> = rows.iter().map(BlockIndexRow::key).collect();
    retry_unprocessed(old_keys, |batch| async move { table.batch_delete(&batch).await }).await?;

    Ok(count)
}

/// Drive a batch write until the store accepts everything, resending only
/// the unprocessed subset, up to [`UNPROCESSED_RETRIES`] extra attempts.
async fn retry_unprocessed<T, F, Fut>(mut items: Vec<T>, mut call: F) -> Result<()>
where
    F: FnMut(Vec<T>) -> Fut,
    Fut: std::future::Future<Output = carhaul_storage_aws::Result<Vec<T>>>,
{
    for attempt in 0..=UNPROCESSED_RETRIES {
        let unprocessed = call(items).await?;
        if unprocessed.is_empty() {
            return Ok(());
        }
        if attempt == UNPROCESSED_RETRIES {
            return Err(MigrateError::upstream(format!(
                "{} unprocessed items remain after {UNPROCESSED_RETRIES} retries",
                unprocessed.len()
            )));
        }
        tokio::time::sleep(Duration::from_millis(50 << attempt)).await;
        items = unprocessed;
    }
    unreachable!("loop returns on success or final attempt")
}
