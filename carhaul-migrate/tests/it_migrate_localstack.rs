//! Migration worker integration tests using testcontainers + LocalStack.
//!
//! Run (requires Docker):
//!   cargo test -p carhaul-migrate --features aws-testcontainers --test it_migrate_localstack -- --nocapture

#![cfg(feature = "aws-testcontainers")]

mod support;

use carhaul_core::{
    canonical_carpath, link_key, multihash_base58, shard_key, side_index, side_index_key,
};
use carhaul_migrate::{
    copy_shard, hash_shard, reindex_shard, CopyOptions, CopyOutcome, CopyRequest, HashRequest,
    IndexRequest, MigrateError,
};
use carhaul_storage_aws::BlockIndexKey;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use support::*;

fn query_for(fixture: &ShardFixture) -> HashMap<String, String> {
    HashMap::from([
        ("region".to_string(), REGION.to_string()),
        ("bucket".to_string(), SRC_BUCKET.to_string()),
        ("key".to_string(), fixture.src_key()),
        ("shard".to_string(), fixture.shard.to_string()),
        ("root".to_string(), fixture.root.to_string()),
    ])
}

fn copy_request(fixture: &ShardFixture) -> CopyRequest {
    CopyRequest::from_query(&query_for(fixture)).expect("valid copy request")
}

fn index_request(fixture: &ShardFixture) -> IndexRequest {
    IndexRequest::from_query(&query_for(fixture)).expect("valid index request")
}

#[tokio::test]
async fn hash_returns_shard_cid() {
    let (_container, endpoint) = localstack().await;
    let world = provision(&endpoint).await;

    let mut rng = StdRng::seed_from_u64(11);
    let fixture = build_shard(&mut rng, 8, 64 * 1024);
    upload_shard(&world, &fixture).await;

    let query = query_for(&fixture);
    let req = HashRequest::from_query(&query).unwrap();
    let cid = hash_shard(&world.source, &req.src).await.unwrap();
    assert_eq!(cid, fixture.shard);
}

#[tokio::test]
async fn hash_missing_object_is_not_found() {
    let (_container, endpoint) = localstack().await;
    let world = provision(&endpoint).await;

    let mut rng = StdRng::seed_from_u64(12);
    let fixture = build_shard(&mut rng, 1, 1024);
    // Never uploaded.
    let req = HashRequest::from_query(&query_for(&fixture)).unwrap();
    let err = hash_shard(&world.source, &req.src).await.unwrap_err();
    assert_eq!(err.status(), 404);
}

/// S1 — small copy takes the single-PUT path and leaves all three
/// destination artifacts.
#[tokio::test]
async fn copy_small_shard_single_put() {
    let (_container, endpoint) = localstack().await;
    let world = provision(&endpoint).await;

    let mut rng = StdRng::seed_from_u64(21);
    // ≈5 MiB: 20 blocks of 256 KiB.
    let fixture = build_shard(&mut rng, 20, 256 * 1024);
    upload_shard(&world, &fixture).await;

    let req = copy_request(&fixture);
    let outcome = copy_shard(&world.source, &world.dest, &req, &CopyOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, CopyOutcome::Copied);

    // Shard body, sorted side index, and link marker all exist.
    let car = world
        .dest
        .store
        .head(CARPARK_BUCKET, &shard_key(&fixture.shard))
        .await
        .unwrap()
        .expect("car object present");
    assert_eq!(car.content_length, fixture.bytes.len() as u64);

    let idx = world
        .dest
        .store
        .get(SATNAV_BUCKET, &side_index_key(&fixture.shard))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    let entries = side_index::decode(&idx).unwrap();
    assert_eq!(entries.len(), fixture.blocks.len());
    for block in &fixture.blocks {
        assert!(entries
            .iter()
            .any(|(mh, offset)| mh == block.cid.hash() && *offset == block.offset));
    }

    let link = world
        .dest
        .store
        .head(DUDEWHERE_BUCKET, &link_key(&fixture.root, &fixture.shard))
        .await
        .unwrap()
        .expect("link marker present");
    assert_eq!(link.content_length, 0);
}

/// S2 — a large shard above the PUT ceiling goes multipart and still
/// produces all three artifacts.
#[tokio::test]
async fn copy_large_shard_multipart() {
    let (_container, endpoint) = localstack().await;
    let world = provision(&endpoint).await;

    let mut rng = StdRng::seed_from_u64(22);
    // ≈500 MiB: 500 blocks of 1 MiB; with a 50 MiB PUT ceiling this runs
    // the multipart path with 100 MiB target parts (≥ 5 parts).
    let fixture = build_shard(&mut rng, 500, 1024 * 1024);
    upload_shard(&world, &fixture).await;

    let opts = CopyOptions {
        max_put_size: 50 * 1024 * 1024,
    };
    let req = copy_request(&fixture);
    let outcome = copy_shard(&world.source, &world.dest, &req, &opts)
        .await
        .unwrap();
    assert_eq!(outcome, CopyOutcome::Copied);

    let car = world
        .dest
        .store
        .head(CARPARK_BUCKET, &shard_key(&fixture.shard))
        .await
        .unwrap()
        .expect("car object present");
    assert_eq!(car.content_length, fixture.bytes.len() as u64);

    assert!(world
        .dest
        .store
        .head(SATNAV_BUCKET, &side_index_key(&fixture.shard))
        .await
        .unwrap()
        .is_some());
    assert!(world
        .dest
        .store
        .head(DUDEWHERE_BUCKET, &link_key(&fixture.root, &fixture.shard))
        .await
        .unwrap()
        .is_some());
}

/// S3 — a shard asserted against an unrelated cid fails with an
/// integrity error and leaves no destination object.
#[tokio::test]
async fn copy_integrity_failure_leaves_nothing() {
    let (_container, endpoint) = localstack().await;
    let world = provision(&endpoint).await;

    let mut rng = StdRng::seed_from_u64(23);
    let fixture = build_shard(&mut rng, 10, 128 * 1024);
    upload_shard(&world, &fixture).await;

    // Assert the bytes of `fixture` against the cid of a different shard.
    let unrelated = build_shard(&mut rng, 1, 1024);
    let mut query = query_for(&fixture);
    query.insert("shard".to_string(), unrelated.shard.to_string());
    let req = CopyRequest::from_query(&query).unwrap();

    let err = copy_shard(&world.source, &world.dest, &req, &CopyOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::Integrity(_)), "got: {err}");

    assert!(world
        .dest
        .store
        .head(CARPARK_BUCKET, &shard_key(&unrelated.shard))
        .await
        .unwrap()
        .is_none());
}

/// S3 (multipart variant) — integrity failure aborts the upload; no
/// completed multipart object remains.
#[tokio::test]
async fn copy_integrity_failure_aborts_multipart() {
    let (_container, endpoint) = localstack().await;
    let world = provision(&endpoint).await;

    let mut rng = StdRng::seed_from_u64(24);
    let fixture = build_shard(&mut rng, 12, 1024 * 1024);
    upload_shard(&world, &fixture).await;

    let unrelated = build_shard(&mut rng, 1, 1024);
    let mut query = query_for(&fixture);
    query.insert("shard".to_string(), unrelated.shard.to_string());
    let req = CopyRequest::from_query(&query).unwrap();

    // Force multipart for a 12 MiB shard.
    let opts = CopyOptions {
        max_put_size: 1024 * 1024,
    };
    let err = copy_shard(&world.source, &world.dest, &req, &opts)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::Integrity(_)), "got: {err}");

    assert!(world
        .dest
        .store
        .head(CARPARK_BUCKET, &shard_key(&unrelated.shard))
        .await
        .unwrap()
        .is_none());
}

/// S4 — a second copy of the same shard is an idempotent hit.
#[tokio::test]
async fn copy_twice_is_idempotent() {
    let (_container, endpoint) = localstack().await;
    let world = provision(&endpoint).await;

    let mut rng = StdRng::seed_from_u64(25);
    let fixture = build_shard(&mut rng, 20, 256 * 1024);
    upload_shard(&world, &fixture).await;

    let req = copy_request(&fixture);
    let first = copy_shard(&world.source, &world.dest, &req, &CopyOptions::default())
        .await
        .unwrap();
    assert_eq!(first, CopyOutcome::Copied);

    let second = copy_shard(&world.source, &world.dest, &req, &CopyOptions::default())
        .await
        .unwrap();
    assert_eq!(second, CopyOutcome::AlreadyStored);
}

/// S5 — reindex via the precomputed side index: every legacy row moves
/// to the canonical carpath.
#[tokio::test]
async fn reindex_with_side_index() {
    let (_container, endpoint) = localstack().await;
    let world = provision(&endpoint).await;

    let mut rng = StdRng::seed_from_u64(26);
    let fixture = build_shard(&mut rng, 30, 32 * 1024);
    upload_shard(&world, &fixture).await;
    world
        .source
        .put(
            SRC_BUCKET,
            &format!("{}.idx", fixture.src_key()),
            bytes::Bytes::from(fixture.side_index_bytes()),
            None,
        )
        .await
        .unwrap();

    let legacy_carpath = format!("{REGION}/{SRC_BUCKET}/{}", fixture.src_key());
    seed_rows(&world.table, &legacy_rows(&fixture, &legacy_carpath)).await;

    let req = index_request(&fixture);
    let updated = reindex_shard(&world.source, &world.table, &req)
        .await
        .unwrap();
    assert_eq!(updated, fixture.blocks.len() as u64);

    let canonical = canonical_carpath(&fixture.shard);
    for block in &fixture.blocks {
        let mh = multihash_base58(block.cid.hash());

        let new_row = world
            .table
            .get_row(&BlockIndexKey {
                block_multihash: mh.clone(),
                carpath: canonical.clone(),
            })
            .await
            .unwrap()
            .expect("canonical row present");
        assert_eq!(new_row.offset, block.offset);
        assert_eq!(new_row.length, block.length);

        assert!(world
            .table
            .get_row(&BlockIndexKey {
                block_multihash: mh,
                carpath: legacy_carpath.clone(),
            })
            .await
            .unwrap()
            .is_none());
    }
}

/// S5 (fallback variant) — with no side index, reindex parses the shard.
#[tokio::test]
async fn reindex_falls_back_to_shard_parse() {
    let (_container, endpoint) = localstack().await;
    let world = provision(&endpoint).await;

    let mut rng = StdRng::seed_from_u64(27);
    let fixture = build_shard(&mut rng, 15, 64 * 1024);
    upload_shard(&world, &fixture).await;
    // No .idx uploaded.

    let legacy_carpath = format!("{REGION}/{SRC_BUCKET}/{}", fixture.src_key());
    seed_rows(&world.table, &legacy_rows(&fixture, &legacy_carpath)).await;

    let req = index_request(&fixture);
    let updated = reindex_shard(&world.source, &world.table, &req)
        .await
        .unwrap();
    assert_eq!(updated, fixture.blocks.len() as u64);
}

/// S6 — rows at a third carpath for the same multihashes are untouched.
#[tokio::test]
async fn reindex_leaves_other_carpaths_alone() {
    let (_container, endpoint) = localstack().await;
    let world = provision(&endpoint).await;

    let mut rng = StdRng::seed_from_u64(28);
    let fixture = build_shard(&mut rng, 10, 32 * 1024);
    upload_shard(&world, &fixture).await;
    world
        .source
        .put(
            SRC_BUCKET,
            &format!("{}.idx", fixture.src_key()),
            bytes::Bytes::from(fixture.side_index_bytes()),
            None,
        )
        .await
        .unwrap();

    let legacy_carpath = format!("{REGION}/{SRC_BUCKET}/{}", fixture.src_key());
    let third_carpath = format!(
        "{REGION}/{SRC_BUCKET}/raw/u/{}/{}.car",
        fixture.root, fixture.shard
    );
    seed_rows(&world.table, &legacy_rows(&fixture, &legacy_carpath)).await;
    // Third-path rows carry different offsets on purpose.
    let mut third_rows = legacy_rows(&fixture, &third_carpath);
    for row in &mut third_rows {
        row.offset += 7;
        row.length += 7;
    }
    seed_rows(&world.table, &third_rows).await;

    let req = index_request(&fixture);
    let updated = reindex_shard(&world.source, &world.table, &req)
        .await
        .unwrap();
    assert_eq!(updated, fixture.blocks.len() as u64);

    // The third-path rows still exist with the exact same attributes.
    for row in &third_rows {
        let found = world
            .table
            .get_row(&row.key())
            .await
            .unwrap()
            .expect("third-path row still present");
        assert_eq!(&found, row);
    }
}

/// Reindexing a shard whose legacy rows are already migrated updates
/// nothing and succeeds (safe rerun).
#[tokio::test]
async fn reindex_rerun_is_idempotent() {
    let (_container, endpoint) = localstack().await;
    let world = provision(&endpoint).await;

    let mut rng = StdRng::seed_from_u64(29);
    let fixture = build_shard(&mut rng, 10, 32 * 1024);
    upload_shard(&world, &fixture).await;

    let legacy_carpath = format!("{REGION}/{SRC_BUCKET}/{}", fixture.src_key());
    seed_rows(&world.table, &legacy_rows(&fixture, &legacy_carpath)).await;

    let req = index_request(&fixture);
    let first = reindex_shard(&world.source, &world.table, &req)
        .await
        .unwrap();
    assert_eq!(first, fixture.blocks.len() as u64);

    // Legacy rows are gone, so the rerun finds nothing to rewrite.
    let second = reindex_shard(&world.source, &world.table, &req)
        .await
        .unwrap();
    assert_eq!(second, 0);
}
