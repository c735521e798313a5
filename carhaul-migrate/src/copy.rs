//! Shard copier: idempotent streaming copy with side-index production,
//! link marker, and end-to-end integrity checking.
//!
//! One GET feeds three concerns in lockstep:
//!
//! - the **car sink** writes the bytes to the destination bucket, by
//!   single PUT below [`CopyOptions::max_put_size`] and multipart above it
//! - the **index sink** parses the CAR framing and accumulates the sorted
//!   side index
//! - an incremental SHA-256 verifies the caller-asserted shard cid
//!
//! The tee between producer and car sink is a bounded channel: the
//! producer does not advance past what the sink has accepted, so memory
//! stays capped at the channel depth plus (in the multipart case) one
//! part buffer. The root→shard link marker is a zero-byte PUT joined
//! concurrently with the stream work.

use crate::config::Destination;
use crate::error::{MigrateError, Result};
use crate::request::CopyRequest;
use base64::Engine;
use bytes::Bytes;
use carhaul_core::{link_key, shard_key, side_index_key, CarDecoder, ShardId, SideIndexWriter};
use carhaul_storage_aws::{ObjectStore, UploadedPart};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Single-PUT ceiling: objects at or above this size go multipart.
pub const DEFAULT_MAX_PUT_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Part buffer threshold for multipart uploads.
pub const TARGET_PART_SIZE: usize = 100 * 1024 * 1024;

/// Chunks in flight between the producer and the car sink.
const TEE_CAPACITY: usize = 8;

/// Producer-side marker for "the sink hung up"; the sink's own error is
/// the root cause and wins the join.
const SINK_GONE: &str = "destination sink closed before end of stream";

#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub max_put_size: u64,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            max_put_size: DEFAULT_MAX_PUT_SIZE,
        }
    }
}

/// What a successful copy did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The shard, its side index, and its link marker were written.
    Copied,
    /// The destination already had the shard; nothing was written.
    AlreadyStored,
}

/// Copy one shard from the legacy store to the destination.
pub async fn copy_shard(
    source: &ObjectStore,
    dest: &Destination,
    req: &CopyRequest,
    opts: &CopyOptions,
) -> Result<CopyOutcome> {
    let shard = &req.src.shard;
    let car_key = shard_key(shard);

    // Idempotence: presence at the destination ends the operation. Only a
    // clean 404 licenses the copy; any other HEAD failure is surfaced.
    if dest
        .store
        .head(&dest.carpark_bucket, &car_key)
        .await?
        .is_some()
    {
        info!(%shard, "destination object already stored");
        return Ok(CopyOutcome::AlreadyStored);
    }

    let mut body = source
        .get(&req.src.object.bucket, &req.src.object.key)
        .await?;
    let size = body.content_length;
    if size == 0 {
        return Err(MigrateError::not_found(format!(
            "source object has zero content length: {}",
            req.src.object.key
        )));
    }

    let (tx, rx) = mpsc::channel::<Bytes>(TEE_CAPACITY);
    let (verdict_tx, verdict_rx) = oneshot::channel::<()>();

    // Producer: pull source chunks, hash, parse frames, forward to the car
    // sink. On success it releases the integrity verdict and yields the
    // serialized side index, which is then PUT as part of the same future.
    let index_task = async {
        let mut hasher = Sha256::new();
        let mut decoder = CarDecoder::new();
        let mut index = SideIndexWriter::new();

        loop {
            let chunk = match body.next_chunk().await? {
                Some(chunk) => chunk,
                None => break,
            };
            hasher.update(&chunk);
            decoder.extend(&chunk);
            while let Some(block) = decoder
                .next_block()
                .map_err(|e| MigrateError::upstream(format!("source is not a valid CAR: {e}")))?
            {
                index.add(*block.cid.hash(), block.offset);
            }
            if tx.send(chunk).await.is_err() {
                return Err(MigrateError::upstream(SINK_GONE));
            }
        }
        drop(tx);

        decoder
            .finish()
            .map_err(|e| MigrateError::upstream(format!("source is not a valid CAR: {e}")))?;

        let digest: [u8; 32] = hasher.finalize().into();
        if digest.as_slice() != shard.digest() {
            let streamed = ShardId::from_sha256_digest(&digest);
            return Err(MigrateError::integrity(format!(
                "source bytes hash to {streamed}, expected {shard}"
            )));
        }
        let _ = verdict_tx.send(());
        debug!(%shard, blocks = index.len(), "shard verified, writing side index");

        let index_bytes = index.finish();
        let checksum = base64_sha256(&index_bytes);
        dest.store
            .put(
                &dest.satnav_bucket,
                &side_index_key(shard),
                Bytes::from(index_bytes),
                Some(&checksum),
            )
            .await?;
        Ok(())
    };

    // Car sink: write the forwarded bytes to the destination bucket.
    let checksum = base64_checksum(shard);
    let car_task = async {
        if size < opts.max_put_size {
            debug!(%shard, size, "single-put copy");
            // The checksum header makes the store verify the streamed
            // bytes against the asserted shard cid.
            dest.store
                .put_stream(&dest.carpark_bucket, &car_key, size, Some(&checksum), rx)
                .await?;
            // Verdict is irrelevant here; the server enforced integrity.
            drop(verdict_rx);
            Ok(())
        } else {
            debug!(%shard, size, "multipart copy");
            multipart_sink(&dest.store, &dest.carpark_bucket, &car_key, rx, verdict_rx).await
        }
    };

    // Link marker: zero-byte object naming the root→shard edge.
    let link_task = async {
        dest.store
            .put(
                &dest.dudewhere_bucket,
                &link_key(&req.root, shard),
                Bytes::new(),
                None,
            )
            .await
            .map_err(MigrateError::from)
    };

    let (index_res, car_res, link_res) = tokio::join!(index_task, car_task, link_task);

    // Error priority: integrity first, then the sink when the producer
    // only observed the hang-up, then producer, sink, link.
    match index_res {
        Err(err @ MigrateError::Integrity(_)) => return Err(err),
        Err(MigrateError::Upstream(ref msg)) if msg.as_str() == SINK_GONE => {
            car_res?;
            return Err(MigrateError::upstream(SINK_GONE));
        }
        Err(err) => return Err(err),
        Ok(()) => {}
    }
    car_res?;
    link_res?;

    info!(%shard, root = %req.root, size, "shard copied");
    Ok(CopyOutcome::Copied)
}

/// Multipart car sink: buffer to part size, upload in stream order, and
/// gate completion on the producer's integrity verdict. Any failure aborts
/// the upload so no parts dangle.
async fn multipart_sink(
    store: &ObjectStore,
    bucket: &str,
    key: &str,
    rx: mpsc::Receiver<Bytes>,
    verdict_rx: oneshot::Receiver<()>,
) -> Result<()> {
    let upload_id = store.create_multipart(bucket, key).await?;
    match upload_parts(store, bucket, key, &upload_id, rx, verdict_rx).await {
        Ok(parts) => {
            store
                .complete_multipart(bucket, key, &upload_id, &parts)
                .await?;
            info!(key, parts = parts.len(), "multipart upload completed");
            Ok(())
        }
        Err(err) => {
            if let Err(abort_err) = store.abort_multipart(bucket, key, &upload_id).await {
                warn!(key, %abort_err, "failed to abort multipart upload");
            }
            Err(err)
        }
    }
}

async fn upload_parts(
    store: &ObjectStore,
    bucket: &str,
    key: &str,
    upload_id: &str,
    mut rx: mpsc::Receiver<Bytes>,
    verdict_rx: oneshot::Receiver<()>,
) -> Result<Vec<UploadedPart>> {
    let mut parts: Vec<UploadedPart> = Vec::new();
    let mut rope: Vec<Bytes> = Vec::new();
    let mut rope_len: usize = 0;

    while let Some(chunk) = rx.recv().await {
        rope_len += chunk.len();
        rope.push(chunk);
        if rope_len >= TARGET_PART_SIZE {
            flush_part(store, bucket, key, upload_id, &mut parts, &mut rope, &mut rope_len).await?;
        }
    }
    if rope_len > 0 {
        flush_part(store, bucket, key, upload_id, &mut parts, &mut rope, &mut rope_len).await?;
    }

    // All bytes are uploaded; completion waits for the hasher's verdict.
    verdict_rx.await.map_err(|_| {
        MigrateError::upstream("source stream failed before integrity verification")
    })?;
    Ok(parts)
}

async fn flush_part(
    store: &ObjectStore,
    bucket: &str,
    key: &str,
    upload_id: &str,
    parts: &mut Vec<UploadedPart>,
    rope: &mut Vec<Bytes>,
    rope_len: &mut usize,
) -> Result<()> {
    let mut body = Vec::with_capacity(*rope_len);
    let mut hasher = Sha256::new();
    for chunk in rope.drain(..) {
        hasher.update(&chunk);
        body.extend_from_slice(&chunk);
    }
    *rope_len = 0;

    let checksum = base64::engine::general_purpose::STANDARD.encode(hasher.finalize());
    // Part numbers start at 1, dense, in stream order.
    let part_number = parts.len() as i32 + 1;
    let part = store
        .upload_part(
            bucket,
            key,
            upload_id,
            part_number,
            Bytes::from(body),
            &checksum,
        )
        .await?;
    debug!(key, part_number, "part uploaded");
    parts.push(part);
    Ok(())
}

/// `ChecksumSHA256` header value for a whole shard: base64 of its digest.
fn base64_checksum(shard: &ShardId) -> String {
    base64::engine::general_purpose::STANDARD.encode(shard.digest())
}

fn base64_sha256(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(Sha256::digest(bytes))
}
