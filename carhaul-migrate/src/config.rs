//! Environment-derived worker configuration.
//!
//! The copy worker writes to three destination buckets behind one
//! endpoint/credential pair; the reindex worker talks to one DynamoDB
//! table. Both read their configuration from process environment so the
//! same workers run under the HTTP surface, the driver CLI, and tests.

use crate::error::{MigrateError, Result};
use carhaul_storage_aws::{BlockIndexTable, ObjectStore, ObjectStoreConfig, TableConfig};

/// Destination endpoint override (R2 URL; unset means default AWS).
pub const ENV_DEST_ENDPOINT: &str = "DEST_ENDPOINT";
/// Destination region (R2 uses the literal `"auto"`).
pub const ENV_DEST_REGION: &str = "DEST_REGION";
pub const ENV_DEST_ACCESS_KEY_ID: &str = "DEST_ACCESS_KEY_ID";
pub const ENV_DEST_SECRET_ACCESS_KEY: &str = "DEST_SECRET_ACCESS_KEY";
/// Bucket receiving shard bodies.
pub const ENV_CARPARK_BUCKET: &str = "CARPARK_BUCKET";
/// Bucket receiving sorted side indexes.
pub const ENV_SATNAV_BUCKET: &str = "SATNAV_BUCKET";
/// Bucket receiving root→shard link markers.
pub const ENV_DUDEWHERE_BUCKET: &str = "DUDEWHERE_BUCKET";

/// Region of the block-index table.
pub const ENV_BLOCK_INDEX_REGION: &str = "BLOCK_INDEX_REGION";
/// Name of the block-index table.
pub const ENV_BLOCK_INDEX_TABLE: &str = "BLOCK_INDEX_TABLE";

fn required(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| MigrateError::validation(format!("missing environment variable {name}")))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Copy-worker destination configuration.
#[derive(Debug, Clone)]
pub struct DestEnv {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub carpark_bucket: String,
    pub satnav_bucket: String,
    pub dudewhere_bucket: String,
}

impl DestEnv {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            endpoint: optional(ENV_DEST_ENDPOINT),
            region: required(ENV_DEST_REGION)?,
            access_key_id: required(ENV_DEST_ACCESS_KEY_ID)?,
            secret_access_key: required(ENV_DEST_SECRET_ACCESS_KEY)?,
            carpark_bucket: required(ENV_CARPARK_BUCKET)?,
            satnav_bucket: required(ENV_SATNAV_BUCKET)?,
            dudewhere_bucket: required(ENV_DUDEWHERE_BUCKET)?,
        })
    }

    /// Build the destination store plus bucket layout.
    pub async fn connect(&self) -> Result<Destination> {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let store = ObjectStore::new(
            &sdk_config,
            ObjectStoreConfig {
                region: Some(self.region.clone()),
                endpoint: self.endpoint.clone(),
                access_key_id: Some(self.access_key_id.clone()),
                secret_access_key: Some(self.secret_access_key.clone()),
                ..Default::default()
            },
        )?;
        Ok(Destination {
            store,
            carpark_bucket: self.carpark_bucket.clone(),
            satnav_bucket: self.satnav_bucket.clone(),
            dudewhere_bucket: self.dudewhere_bucket.clone(),
        })
    }
}

/// The connected destination: one store, three buckets.
#[derive(Debug, Clone)]
pub struct Destination {
    pub store: ObjectStore,
    pub carpark_bucket: String,
    pub satnav_bucket: String,
    pub dudewhere_bucket: String,
}

/// Reindex-worker table configuration.
#[derive(Debug, Clone)]
pub struct TableEnv {
    pub region: String,
    pub table: String,
}

impl TableEnv {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            region: required(ENV_BLOCK_INDEX_REGION)?,
            table: required(ENV_BLOCK_INDEX_TABLE)?,
        })
    }

    /// Build the block-index table client.
    pub async fn connect(&self) -> Result<BlockIndexTable> {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Ok(BlockIndexTable::new(
            &sdk_config,
            TableConfig {
                table_name: self.table.clone(),
                region: Some(self.region.clone()),
                ..Default::default()
            },
        )?)
    }
}

/// Build a source store for one of the legacy regions.
///
/// `endpoint` is an override for local testing; production sources ride
/// on the ambient credential chain.
pub async fn connect_source(region: &str, endpoint: Option<&str>) -> Result<ObjectStore> {
    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    Ok(ObjectStore::new(
        &sdk_config,
        ObjectStoreConfig {
            region: Some(region.to_string()),
            endpoint: endpoint.map(str::to_string),
            ..Default::default()
        },
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_env_is_validation_error() {
        // Use names that no environment will have set.
        std::env::remove_var("CARHAUL_TEST_UNSET");
        let err = required("CARHAUL_TEST_UNSET").unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(err.to_string().contains("CARHAUL_TEST_UNSET"));
    }

    #[test]
    fn test_empty_env_treated_as_missing() {
        std::env::set_var("CARHAUL_TEST_EMPTY", "");
        assert!(required("CARHAUL_TEST_EMPTY").is_err());
        assert!(optional("CARHAUL_TEST_EMPTY").is_none());
        std::env::remove_var("CARHAUL_TEST_EMPTY");
    }
}
