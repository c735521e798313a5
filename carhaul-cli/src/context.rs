//! Shared per-run state: the source store and resolved arguments.

use crate::cli::Cli;
use crate::error::{CliError, CliResult};
use carhaul_migrate::connect_source;
use carhaul_storage_aws::ObjectStore;
use std::collections::HashMap;

pub struct Context {
    pub store: ObjectStore,
    pub region: String,
    pub bucket: String,
}

impl Context {
    /// Connect the source store for the run.
    pub async fn connect(cli: &Cli) -> CliResult<Self> {
        let bucket = cli
            .bucket
            .clone()
            .ok_or_else(|| CliError::Usage("--bucket is required for this command".into()))?;
        let store = connect_source(&cli.region, cli.endpoint.as_deref()).await?;
        Ok(Self {
            store,
            region: cli.region.clone(),
            bucket,
        })
    }

    /// The worker-surface query map for one source key.
    pub fn query_for(&self, key: &str) -> HashMap<String, String> {
        HashMap::from([
            ("region".to_string(), self.region.clone()),
            ("bucket".to_string(), self.bucket.clone()),
            ("key".to_string(), key.to_string()),
        ])
    }
}
