//! `carhaul list` — emit source keys under a prefix as NDJSON.

use crate::cli::Cli;
use crate::context::Context;
use crate::error::CliResult;
use crate::output;
use carhaul_migrate::MigrateError;

const PAGE_SIZE: usize = 1000;

pub async fn run(cli: &Cli, prefix: String) -> CliResult<()> {
    let ctx = Context::connect(cli).await?;

    let mut token = None;
    loop {
        let page = ctx
            .store
            .list_page(&ctx.bucket, &prefix, token.take(), PAGE_SIZE)
            .await
            .map_err(MigrateError::from)?;

        for object in &page.objects {
            output::emit(&serde_json::json!({
                "key": object.key,
                "size": object.size,
            }));
        }

        match page.continuation_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    Ok(())
}
