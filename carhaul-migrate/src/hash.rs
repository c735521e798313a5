//! Shard hasher: stream a source object, return its CAR cid.

use crate::error::{MigrateError, Result};
use carhaul_core::{ObjectRef, ShardId};
use carhaul_storage_aws::ObjectStore;
use sha2::{Digest, Sha256};

/// Stream `src` and compute its content identity.
///
/// One GET, constant memory: each chunk feeds an incremental SHA-256, and
/// the finalized digest becomes a CAR-codec CIDv1. No writes.
pub async fn hash_shard(store: &ObjectStore, src: &ObjectRef) -> Result<ShardId> {
    let mut body = store.get(&src.bucket, &src.key).await?;
    if body.content_length == 0 {
        return Err(MigrateError::not_found(format!(
            "source object has zero content length: {}",
            src.key
        )));
    }

    let mut hasher = Sha256::new();
    let mut streamed: u64 = 0;
    while let Some(chunk) = body.next_chunk().await? {
        streamed += chunk.len() as u64;
        hasher.update(&chunk);
    }

    let digest: [u8; 32] = hasher.finalize().into();
    let shard = ShardId::from_sha256_digest(&digest);
    tracing::debug!(key = %src.key, bytes = streamed, cid = %shard, "hashed source object");
    Ok(shard)
}
