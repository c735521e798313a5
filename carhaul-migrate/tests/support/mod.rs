//! Shared harness for LocalStack integration tests: SDK wiring, bucket
//! and table provisioning, and CAR shard fixtures.

#![allow(dead_code)]

use carhaul_core::{Block, RootLink, ShardId, SideIndexWriter};
use carhaul_migrate::Destination;
use carhaul_storage_aws::{
    BlockIndexRow, BlockIndexTable, ObjectStore, ObjectStoreConfig, TableConfig,
};
use cid::Cid;
use multihash::Multihash;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::Duration;
use testcontainers::core::IntoContainerPort;
use testcontainers::{runners::AsyncRunner, ContainerAsync, GenericImage, ImageExt};

pub const LOCALSTACK_EDGE_PORT: u16 = 4566;
/// Must be one of the migration source regions the request layer allows.
pub const REGION: &str = "us-east-2";

pub const SRC_BUCKET: &str = "dotstorage-test-0";
pub const CARPARK_BUCKET: &str = "carpark-test-0";
pub const SATNAV_BUCKET: &str = "satnav-test-0";
pub const DUDEWHERE_BUCKET: &str = "dudewhere-test-0";
pub const TABLE_NAME: &str = "blockindex-test";

fn set_test_aws_env() {
    // Dummy credentials accepted by LocalStack.
    std::env::set_var("AWS_ACCESS_KEY_ID", "test");
    std::env::set_var("AWS_SECRET_ACCESS_KEY", "test");
    std::env::set_var("AWS_REGION", REGION);
    std::env::set_var("AWS_DEFAULT_REGION", REGION);
    // Avoid IMDS lookups that can hang tests.
    std::env::set_var("AWS_EC2_METADATA_DISABLED", "true");
}

/// Boot LocalStack and return the container plus its edge endpoint.
pub async fn localstack() -> (ContainerAsync<GenericImage>, String) {
    let image = GenericImage::new("localstack/localstack", "latest")
        .with_exposed_port(LOCALSTACK_EDGE_PORT.tcp())
        .with_env_var("SERVICES", "s3,dynamodb")
        .with_env_var("DEFAULT_REGION", REGION)
        .with_env_var("SKIP_SSL_CERT_DOWNLOAD", "1");
    let container = image
        .start()
        .await
        .expect("LocalStack started (Docker must be running)");
    let host_port = container
        .get_host_port_ipv4(LOCALSTACK_EDGE_PORT)
        .await
        .expect("LocalStack edge port mapped");
    (container, format!("http://127.0.0.1:{host_port}"))
}

pub async fn sdk_config_for_localstack(endpoint: &str) -> aws_config::SdkConfig {
    set_test_aws_env();
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(REGION))
        .endpoint_url(endpoint)
        .load()
        .await
}

pub async fn wait_for_localstack(sdk_config: &aws_config::SdkConfig) {
    let s3 = aws_sdk_s3::Client::new(sdk_config);
    for _ in 0..60 {
        if s3.list_buckets().send().await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("LocalStack did not become ready in time");
}

pub async fn ensure_bucket(sdk_config: &aws_config::SdkConfig, bucket: &str) {
    let s3 = aws_sdk_s3::Client::new(sdk_config);
    let _ = s3.create_bucket().bucket(bucket).send().await;

    for _ in 0..30 {
        if s3.head_bucket().bucket(bucket).send().await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    panic!("S3 bucket was not available: {bucket}");
}

/// One ready-to-use test world: source store, destination, table.
pub struct TestWorld {
    pub source: ObjectStore,
    pub dest: Destination,
    pub table: BlockIndexTable,
    pub sdk_config: aws_config::SdkConfig,
}

pub async fn provision(endpoint: &str) -> TestWorld {
    let sdk_config = sdk_config_for_localstack(endpoint).await;
    wait_for_localstack(&sdk_config).await;

    for bucket in [SRC_BUCKET, CARPARK_BUCKET, SATNAV_BUCKET, DUDEWHERE_BUCKET] {
        ensure_bucket(&sdk_config, bucket).await;
    }

    let store_config = ObjectStoreConfig {
        region: Some(REGION.to_string()),
        endpoint: Some(endpoint.to_string()),
        timeout_ms: Some(120_000),
        ..Default::default()
    };
    let source = ObjectStore::new(&sdk_config, store_config.clone()).expect("source store");
    let dest_store = ObjectStore::new(&sdk_config, store_config).expect("dest store");

    let table = BlockIndexTable::new(
        &sdk_config,
        TableConfig {
            table_name: TABLE_NAME.to_string(),
            region: Some(REGION.to_string()),
            endpoint: Some(endpoint.to_string()),
            timeout_ms: Some(30_000),
        },
    )
    .expect("block index table");
    table.ensure_table().await.expect("table ACTIVE");

    TestWorld {
        source,
        dest: Destination {
            store: dest_store,
            carpark_bucket: CARPARK_BUCKET.to_string(),
            satnav_bucket: SATNAV_BUCKET.to_string(),
            dudewhere_bucket: DUDEWHERE_BUCKET.to_string(),
        },
        table,
        sdk_config,
    }
}

// ─── Shard fixtures ─────────────────────────────────────────────────────────

pub struct ShardFixture {
    pub bytes: Vec<u8>,
    pub shard: ShardId,
    pub root: RootLink,
    pub blocks: Vec<Block>,
}

impl ShardFixture {
    /// The canonical source key for a shard of this root.
    pub fn src_key(&self) -> String {
        format!("complete/{}.car", self.root)
    }

    /// Serialized sorted side index for this shard.
    pub fn side_index_bytes(&self) -> Vec<u8> {
        let mut writer = SideIndexWriter::new();
        for block in &self.blocks {
            writer.add(*block.cid.hash(), block.offset);
        }
        writer.finish()
    }
}

fn raw_cid(payload: &[u8]) -> Cid {
    let digest: [u8; 32] = Sha256::digest(payload).into();
    let mh = Multihash::<64>::wrap(0x12, &digest).unwrap();
    Cid::new_v1(0x55, mh)
}

/// Minimal dag-cbor CAR header: `{"roots": [root], "version": 1}`.
fn encode_header(root: &Cid) -> Vec<u8> {
    let cid_bytes = root.to_bytes();
    let tagged_len = cid_bytes.len() + 1; // identity multibase prefix byte

    let mut header = Vec::new();
    header.push(0xA2); // map(2)
    header.push(0x65); // text(5)
    header.extend_from_slice(b"roots");
    header.push(0x81); // array(1)
    header.extend_from_slice(&[0xD8, 0x2A]); // tag(42)
    header.extend_from_slice(&[0x58, tagged_len as u8]); // bytes(N)
    header.push(0x00);
    header.extend_from_slice(&cid_bytes);
    header.push(0x67); // text(7)
    header.extend_from_slice(b"version");
    header.push(0x01); // 1
    header
}

/// Build a random CAR shard of `block_count` blocks of `block_size` bytes.
pub fn build_shard(rng: &mut impl RngCore, block_count: usize, block_size: usize) -> ShardFixture {
    let mut payloads = Vec::with_capacity(block_count);
    for _ in 0..block_count {
        let mut payload = vec![0u8; block_size];
        rng.fill_bytes(&mut payload);
        payloads.push(payload);
    }
    let root = RootLink::from_cid(raw_cid(&payloads[0]));

    let mut bytes = Vec::new();
    let header = encode_header(root.as_cid());
    carhaul_core::varint::encode_varint(header.len() as u64, &mut bytes);
    bytes.extend_from_slice(&header);

    let mut blocks = Vec::with_capacity(block_count);
    for payload in &payloads {
        let cid = raw_cid(payload);
        let cid_bytes = cid.to_bytes();
        let data_len = (cid_bytes.len() + payload.len()) as u64;
        let offset = bytes.len() as u64;
        let before = bytes.len();
        carhaul_core::varint::encode_varint(data_len, &mut bytes);
        let width = (bytes.len() - before) as u64;
        bytes.extend_from_slice(&cid_bytes);
        bytes.extend_from_slice(payload);
        blocks.push(Block {
            cid,
            offset,
            length: width + data_len,
        });
    }

    let digest: [u8; 32] = Sha256::digest(&bytes).into();
    ShardFixture {
        bytes,
        shard: ShardId::from_sha256_digest(&digest),
        root,
        blocks,
    }
}

/// Upload the shard body to the source bucket.
pub async fn upload_shard(world: &TestWorld, fixture: &ShardFixture) {
    world
        .source
        .put(
            SRC_BUCKET,
            &fixture.src_key(),
            bytes::Bytes::from(fixture.bytes.clone()),
            None,
        )
        .await
        .expect("upload shard");
}

/// Seed block-index rows in write batches.
pub async fn seed_rows(table: &BlockIndexTable, rows: &[BlockIndexRow]) {
    for chunk in rows.chunks(25) {
        let unprocessed = table.batch_put(chunk).await.expect("seed rows");
        assert!(unprocessed.is_empty(), "seeding should not be throttled");
    }
}

/// Legacy rows for every block of a fixture at the given carpath.
pub fn legacy_rows(fixture: &ShardFixture, carpath: &str) -> Vec<BlockIndexRow> {
    fixture
        .blocks
        .iter()
        .map(|block| BlockIndexRow {
            block_multihash: carhaul_core::multihash_base58(block.cid.hash()),
            carpath: carpath.to_string(),
            offset: block.offset,
            length: block.length,
        })
        .collect()
}
