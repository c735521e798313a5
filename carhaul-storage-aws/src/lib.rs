//! AWS adapters for CAR shard migration
//!
//! This crate provides the two cloud seams the migration workers stand on:
//!
//! - **`s3::ObjectStore`**: uniform GET/HEAD/PUT/multipart over any
//!   S3-compatible store (AWS S3, R2, LocalStack), with streaming bodies
//!   and `ChecksumSHA256` integrity headers. Two stores with different
//!   endpoints/credentials coexist in one operation (source vs
//!   destination).
//! - **`dynamodb::BlockIndexTable`**: batched point lookups and batched
//!   put/delete against the `(blockmultihash, carpath)` wide table,
//!   exposing unprocessed subsets so callers retry only what failed.
//!
//! ## Usage
//!
//! ```ignore
//! use carhaul_storage_aws::s3::{ObjectStore, ObjectStoreConfig};
//! use carhaul_storage_aws::dynamodb::{BlockIndexTable, TableConfig};
//!
//! let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
//!
//! let dest = ObjectStore::new(&sdk_config, ObjectStoreConfig {
//!     region: Some("auto".into()),
//!     endpoint: Some("https://<account>.r2.cloudflarestorage.com".into()),
//!     ..Default::default()
//! })?;
//!
//! let table = BlockIndexTable::new(&sdk_config, TableConfig {
//!     table_name: "blocks".into(),
//!     ..Default::default()
//! })?;
//! ```

pub mod dynamodb;
pub mod error;
pub mod s3;

pub use dynamodb::{BlockIndexKey, BlockIndexRow, BlockIndexTable, TableConfig};
pub use error::{Result, StorageError};
pub use s3::{
    ListPage, ObjectBody, ObjectHead, ObjectStore, ObjectStoreConfig, ObjectSummary, UploadedPart,
};
