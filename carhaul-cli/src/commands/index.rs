//! `carhaul index` — rewrite block-index rows for each shard.

use crate::cli::Cli;
use crate::commands::run_items;
use crate::context::Context;
use crate::error::CliResult;
use crate::input;
use carhaul_migrate::{reindex_shard, IndexRequest, MigrateError, TableEnv};

pub async fn run(cli: &Cli, key: Option<String>) -> CliResult<()> {
    let ctx = Context::connect(cli).await?;
    let table = TableEnv::from_env()?.connect().await?;
    let items = input::items_from(key)?;

    run_items(items, cli.concurrency, cli.retries, |item| {
        let ctx = &ctx;
        let table = &table;
        async move {
            let shard = item.shard.clone().ok_or_else(|| {
                MigrateError::validation(format!("item '{}' has no shard cid", item.key))
            })?;

            let mut query = ctx.query_for(&item.key);
            query.insert("shard".to_string(), shard.clone());
            let req = IndexRequest::from_query(&query)?;

            let updated = reindex_shard(&ctx.store, table, &req).await?;
            Ok(serde_json::json!({
                "key": item.key,
                "ok": true,
                "shard": shard,
                "updated": updated,
            }))
        }
    })
    .await
}
