//! `carhaul head` — check destination presence of each shard.

use crate::cli::Cli;
use crate::commands::run_items;
use crate::error::CliResult;
use crate::input;
use carhaul_core::{shard_key, ShardId};
use carhaul_migrate::{DestEnv, MigrateError};

pub async fn run(cli: &Cli, key: Option<String>) -> CliResult<()> {
    let dest = DestEnv::from_env()?.connect().await?;
    let items = input::items_from(key)?;

    run_items(items, cli.concurrency, cli.retries, |item| {
        let dest = &dest;
        async move {
            let shard: ShardId = item
                .shard
                .as_deref()
                .ok_or_else(|| {
                    MigrateError::validation(format!("item '{}' has no shard cid", item.key))
                })?
                .parse()
                .map_err(|e| MigrateError::validation(format!("invalid shard cid: {e}")))?;

            let head = dest
                .store
                .head(&dest.carpark_bucket, &shard_key(&shard))
                .await?;
            Ok(serde_json::json!({
                "key": item.key,
                "ok": true,
                "shard": shard.to_string(),
                "exists": head.is_some(),
            }))
        }
    })
    .await
}
