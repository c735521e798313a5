//! `carhaul hash` — compute the CAR cid of each source object.

use crate::cli::Cli;
use crate::commands::run_items;
use crate::context::Context;
use crate::error::CliResult;
use crate::input;
use carhaul_migrate::{hash_shard, HashRequest, HashResponse};

pub async fn run(cli: &Cli, key: Option<String>) -> CliResult<()> {
    let ctx = Context::connect(cli).await?;
    let items = input::items_from(key)?;

    run_items(items, cli.concurrency, cli.retries, |item| {
        let ctx = &ctx;
        async move {
            let req = HashRequest::from_query(&ctx.query_for(&item.key))?;
            let cid = hash_shard(&ctx.store, &req.src).await?;
            let mut value = serde_json::json!(HashResponse::new(&cid));
            value["key"] = serde_json::json!(item.key);
            value["shard"] = serde_json::json!(cid.to_string());
            Ok(value)
        }
    })
    .await
}
