//! DynamoDB block-index table adapter.
//!
//! The block-index table maps `(blockmultihash, carpath)` to the byte
//! offset and length of that block within that carpath's shard:
//!
//! - partition key `blockmultihash` (S): base58btc of the multihash bytes
//! - sort key `carpath` (S): `{region}/{bucket}/{key}` for legacy rows,
//!   `auto/carpark-prod-0/{shard}/{shard}.car` for migrated rows
//! - attributes `offset`, `length` (N): non-negative integers
//!
//! Every read, write, and delete uses the full composite key, so
//! concurrent migrations of different shards never contend even when they
//! share multihashes.
//!
//! Batched writes/deletes return the store's unprocessed subset instead of
//! retrying internally — the rewrite loop in the worker owns the retry
//! budget. Batched gets retry unprocessed keys internally with backoff
//! (throttling on reads is not part of any caller contract).

use crate::error::{Result, StorageError};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, DeleteRequest, KeySchemaElement, KeyType,
    KeysAndAttributes, PutRequest, ScalarAttributeType, WriteRequest,
};
use aws_sdk_dynamodb::Client;
use aws_smithy_types::timeout::TimeoutConfig;
use std::collections::HashMap;
use std::time::Duration;

/// Partition key attribute: base58btc multihash bytes.
pub const ATTR_BLOCK_MULTIHASH: &str = "blockmultihash";
/// Sort key attribute: carpath string.
pub const ATTR_CARPATH: &str = "carpath";
/// Byte offset of the block frame within the shard.
pub const ATTR_OFFSET: &str = "offset";
/// Byte length of the block frame.
pub const ATTR_LENGTH: &str = "length";

/// BatchGetItem key ceiling.
pub const MAX_BATCH_GET: usize = 100;
/// BatchWriteItem request ceiling.
pub const MAX_BATCH_WRITE: usize = 25;

type Item = HashMap<String, AttributeValue>;

/// Composite primary key of one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockIndexKey {
    pub block_multihash: String,
    pub carpath: String,
}

/// One block-location row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndexRow {
    pub block_multihash: String,
    pub carpath: String,
    pub offset: u64,
    pub length: u64,
}

impl BlockIndexRow {
    /// The row's composite key.
    pub fn key(&self) -> BlockIndexKey {
        BlockIndexKey {
            block_multihash: self.block_multihash.clone(),
            carpath: self.carpath.clone(),
        }
    }
}

/// Block-index table configuration.
#[derive(Debug, Clone, Default)]
pub struct TableConfig {
    /// DynamoDB table name
    pub table_name: String,
    /// AWS region (optional, uses SDK default if not specified)
    pub region: Option<String>,
    /// Optional endpoint override (e.g. LocalStack)
    pub endpoint: Option<String>,
    /// Timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

/// DynamoDB-backed block-index table.
#[derive(Clone)]
pub struct BlockIndexTable {
    client: Client,
    table_name: String,
}

impl std::fmt::Debug for BlockIndexTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockIndexTable")
            .field("table_name", &self.table_name)
            .finish()
    }
}

impl BlockIndexTable {
    /// Create from SDK config plus table config.
    pub fn new(sdk_config: &aws_config::SdkConfig, config: TableConfig) -> Result<Self> {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

        if let Some(region) = config.region {
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region));
        }
        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if let Some(timeout_ms) = config.timeout_ms {
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build();
            builder = builder.timeout_config(timeout_config);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            table_name: config.table_name,
        })
    }

    /// Create from a pre-built client (for testing).
    pub fn from_client(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    /// Point-lookup one row with the full composite key.
    pub async fn get_row(&self, key: &BlockIndexKey) -> Result<Option<BlockIndexRow>> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(
                ATTR_BLOCK_MULTIHASH,
                AttributeValue::S(key.block_multihash.clone()),
            )
            .key(ATTR_CARPATH, AttributeValue::S(key.carpath.clone()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StorageError::dynamodb(format!("GetItem failed: {e}")))?;

        response.item().map(row_from_item).transpose()
    }

    /// Batched point lookup of up to [`MAX_BATCH_GET`] composite keys.
    ///
    /// Keys absent from the table are simply absent from the result.
    /// Unprocessed keys (throttling) are retried with backoff; exhausting
    /// the retries is an error.
    pub async fn batch_get(&self, keys: &[BlockIndexKey]) -> Result<Vec<BlockIndexRow>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        debug_assert!(keys.len() <= MAX_BATCH_GET);

        let key_items: Vec<Item> = keys.iter().map(key_item).collect();
        let ka = KeysAndAttributes::builder()
            .set_keys(Some(key_items))
            .consistent_read(true)
            .build()
            .map_err(|e| StorageError::dynamodb(format!("KeysAndAttributes build failed: {e}")))?;

        let mut rows = Vec::with_capacity(keys.len());
        let mut pending = Some(ka);
        let max_retries = 5;
        for retry in 0..=max_retries {
            let request_ka = pending.take().expect("pending keys");
            let response = self
                .client
                .batch_get_item()
                .request_items(&self.table_name, request_ka)
                .send()
                .await
                .map_err(|e| StorageError::dynamodb(format!("BatchGetItem failed: {e}")))?;

            if let Some(table_items) = response.responses().and_then(|r| r.get(&self.table_name)) {
                for item in table_items {
                    rows.push(row_from_item(item)?);
                }
            }

            // Retry unprocessed keys with exponential backoff.
            match response
                .unprocessed_keys()
                .and_then(|u| u.get(&self.table_name))
            {
                Some(unprocessed) if !unprocessed.keys().is_empty() => {
                    if retry == max_retries {
                        return Err(StorageError::throttled(
                            "BatchGetItem: max retries exhausted for UnprocessedKeys",
                        ));
                    }
                    let backoff_ms = 50 * (1 << retry.min(4)); // 50, 100, 200, 400, 800ms
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    pending = Some(unprocessed.clone());
                }
                _ => break,
            }
        }

        Ok(rows)
    }

    /// Batched put of up to [`MAX_BATCH_WRITE`] rows.
    ///
    /// Returns the unprocessed subset so the caller's retry loop resends
    /// only what failed.
    pub async fn batch_put(&self, rows: &[BlockIndexRow]) -> Result<Vec<BlockIndexRow>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        debug_assert!(rows.len() <= MAX_BATCH_WRITE);

        let requests: Vec<WriteRequest> = rows
            .iter()
            .map(|row| {
                WriteRequest::builder()
                    .put_request(
                        PutRequest::builder()
                            .set_item(Some(item_from_row(row)))
                            .build()
                            .expect("valid PutRequest"),
                    )
                    .build()
            })
            .collect();

        let unprocessed = self.send_batch_write(requests).await?;
        unprocessed
            .iter()
            .map(|wr| {
                let item = wr
                    .put_request()
                    .map(|p| p.item())
                    .ok_or_else(|| StorageError::dynamodb("unprocessed item without PutRequest"))?;
                row_from_item(item)
            })
            .collect()
    }

    /// Batched delete of up to [`MAX_BATCH_WRITE`] composite keys.
    ///
    /// Deleting an absent key is a no-op. Returns the unprocessed subset.
    pub async fn batch_delete(&self, keys: &[BlockIndexKey]) -> Result<Vec<BlockIndexKey>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        debug_assert!(keys.len() <= MAX_BATCH_WRITE);

        let requests: Vec<WriteRequest> = keys
            .iter()
            .map(|key| {
                WriteRequest::builder()
                    .delete_request(
                        DeleteRequest::builder()
                            .set_key(Some(key_item(key)))
                            .build()
                            .expect("valid DeleteRequest"),
                    )
                    .build()
            })
            .collect();

        let unprocessed = self.send_batch_write(requests).await?;
        unprocessed
            .iter()
            .map(|wr| {
                let item = wr.delete_request().map(|d| d.key()).ok_or_else(|| {
                    StorageError::dynamodb("unprocessed item without DeleteRequest")
                })?;
                key_from_item(item)
            })
            .collect()
    }

    async fn send_batch_write(&self, requests: Vec<WriteRequest>) -> Result<Vec<WriteRequest>> {
        let response = self
            .client
            .batch_write_item()
            .request_items(&self.table_name, requests)
            .send()
            .await
            .map_err(|e| StorageError::dynamodb(format!("BatchWriteItem failed: {e}")))?;

        Ok(response
            .unprocessed_items()
            .and_then(|u| u.get(&self.table_name))
            .cloned()
            .unwrap_or_default())
    }

    /// Create the table if it does not exist and wait for ACTIVE.
    /// Test/provisioning hook.
    pub async fn ensure_table(&self) -> Result<()> {
        let result = self
            .client
            .create_table()
            .table_name(&self.table_name)
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(ATTR_BLOCK_MULTIHASH)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .expect("valid attr def"),
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(ATTR_CARPATH)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .expect("valid attr def"),
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(ATTR_BLOCK_MULTIHASH)
                    .key_type(KeyType::Hash)
                    .build()
                    .expect("valid key schema"),
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(ATTR_CARPATH)
                    .key_type(KeyType::Range)
                    .build()
                    .expect("valid key schema"),
            )
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;

        match result {
            Ok(_) => {}
            Err(ref e) => {
                // Ignore ResourceInUseException (table already exists)
                let is_exists = matches!(
                    e,
                    aws_sdk_dynamodb::error::SdkError::ServiceError(se)
                    if matches!(
                        se.err(),
                        aws_sdk_dynamodb::operation::create_table::CreateTableError::ResourceInUseException(_)
                    )
                );
                if !is_exists {
                    return Err(StorageError::dynamodb(format!("CreateTable failed: {e}")));
                }
            }
        }

        // Wait for ACTIVE
        for _ in 0..60 {
            let desc = self
                .client
                .describe_table()
                .table_name(&self.table_name)
                .send()
                .await
                .map_err(|e| StorageError::dynamodb(format!("DescribeTable failed: {e}")))?;

            if let Some(table) = desc.table() {
                if table.table_status() == Some(&aws_sdk_dynamodb::types::TableStatus::Active) {
                    return Ok(());
                }
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        Err(StorageError::dynamodb(
            "table did not become ACTIVE within 30s",
        ))
    }
}

// ─── AttributeValue conversion helpers ──────────────────────────────────────

fn key_item(key: &BlockIndexKey) -> Item {
    HashMap::from([
        (
            ATTR_BLOCK_MULTIHASH.to_string(),
            AttributeValue::S(key.block_multihash.clone()),
        ),
        (
            ATTR_CARPATH.to_string(),
            AttributeValue::S(key.carpath.clone()),
        ),
    ])
}

fn item_from_row(row: &BlockIndexRow) -> Item {
    HashMap::from([
        (
            ATTR_BLOCK_MULTIHASH.to_string(),
            AttributeValue::S(row.block_multihash.clone()),
        ),
        (
            ATTR_CARPATH.to_string(),
            AttributeValue::S(row.carpath.clone()),
        ),
        (
            ATTR_OFFSET.to_string(),
            AttributeValue::N(row.offset.to_string()),
        ),
        (
            ATTR_LENGTH.to_string(),
            AttributeValue::N(row.length.to_string()),
        ),
    ])
}

fn string_attr(item: &Item, name: &str) -> Result<String> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| StorageError::dynamodb(format!("row missing string attribute '{name}'")))
}

fn number_attr(item: &Item, name: &str) -> Result<u64> {
    item.get(name)
        .and_then(|v| v.as_n().ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StorageError::dynamodb(format!("row missing numeric attribute '{name}'")))
}

fn row_from_item(item: &Item) -> Result<BlockIndexRow> {
    Ok(BlockIndexRow {
        block_multihash: string_attr(item, ATTR_BLOCK_MULTIHASH)?,
        carpath: string_attr(item, ATTR_CARPATH)?,
        offset: number_attr(item, ATTR_OFFSET)?,
        length: number_attr(item, ATTR_LENGTH)?,
    })
}

fn key_from_item(item: &Item) -> Result<BlockIndexKey> {
    Ok(BlockIndexKey {
        block_multihash: string_attr(item, ATTR_BLOCK_MULTIHASH)?,
        carpath: string_attr(item, ATTR_CARPATH)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_item_roundtrip() {
        let row = BlockIndexRow {
            block_multihash: "zQmTest".to_string(),
            carpath: "us-east-2/dotstorage-prod-0/complete/x.car".to_string(),
            offset: 59,
            length: 262_192,
        };
        let item = item_from_row(&row);
        assert_eq!(row_from_item(&item).unwrap(), row);
    }

    #[test]
    fn test_key_item_roundtrip() {
        let key = BlockIndexKey {
            block_multihash: "zQmKey".to_string(),
            carpath: "auto/carpark-prod-0/bag/bag.car".to_string(),
        };
        assert_eq!(key_from_item(&key_item(&key)).unwrap(), key);
    }

    #[test]
    fn test_missing_attribute_is_error() {
        let key = BlockIndexKey {
            block_multihash: "z".to_string(),
            carpath: "c".to_string(),
        };
        // A key item has no offset/length.
        assert!(row_from_item(&key_item(&key)).is_err());
    }

    #[test]
    fn test_row_key_projection() {
        let row = BlockIndexRow {
            block_multihash: "zAAA".to_string(),
            carpath: "p".to_string(),
            offset: 1,
            length: 2,
        };
        let key = row.key();
        assert_eq!(key.block_multihash, "zAAA");
        assert_eq!(key.carpath, "p");
    }
}
