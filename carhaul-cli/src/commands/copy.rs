//! `carhaul copy` — copy each shard to the destination.
//!
//! Items missing a `shard` field get hashed first; items missing a
//! `root` derive it from the key when the key has the
//! `complete/{root}.car` shape.

use crate::cli::Cli;
use crate::commands::run_items;
use crate::context::Context;
use crate::error::CliResult;
use crate::input::{self, Item};
use carhaul_core::RootLink;
use carhaul_migrate::{
    copy_shard, hash_shard, CopyOptions, CopyRequest, DestEnv, HashRequest, MigrateError,
};

pub async fn run(cli: &Cli, key: Option<String>, max_put_size: Option<u64>) -> CliResult<()> {
    let ctx = Context::connect(cli).await?;
    let dest = DestEnv::from_env()?.connect().await?;
    let items = input::items_from(key)?;

    let mut opts = CopyOptions::default();
    if let Some(max_put_size) = max_put_size {
        opts.max_put_size = max_put_size;
    }

    run_items(items, cli.concurrency, cli.retries, |item| {
        let ctx = &ctx;
        let dest = &dest;
        let opts = &opts;
        async move {
            let shard = match &item.shard {
                Some(shard) => shard.clone(),
                None => {
                    let req = HashRequest::from_query(&ctx.query_for(&item.key))?;
                    hash_shard(&ctx.store, &req.src).await?.to_string()
                }
            };
            let root = match &item.root {
                Some(root) => root.clone(),
                None => derive_root(&item)?.to_string(),
            };

            let mut query = ctx.query_for(&item.key);
            query.insert("shard".to_string(), shard.clone());
            query.insert("root".to_string(), root.clone());
            let req = CopyRequest::from_query(&query)?;

            copy_shard(&ctx.store, dest, &req, opts).await?;
            Ok(serde_json::json!({
                "key": item.key,
                "ok": true,
                "shard": shard,
                "root": root,
            }))
        }
    })
    .await
}

/// Derive the root cid from a `.../{root}.car` key.
fn derive_root(item: &Item) -> Result<RootLink, MigrateError> {
    let stem = item
        .key
        .rsplit('/')
        .next()
        .and_then(|name| name.strip_suffix(".car"))
        .unwrap_or_default();
    stem.parse().map_err(|_| {
        MigrateError::validation(format!(
            "item '{}' has no root and none can be derived from the key",
            item.key
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_root_from_complete_key() {
        let item = Item::from_key(
            "complete/bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi.car".to_string(),
        );
        let root = derive_root(&item).unwrap();
        assert_eq!(
            root.to_string(),
            "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi"
        );
    }

    #[test]
    fn test_derive_root_rejects_opaque_key() {
        let item = Item::from_key("raw/some-opaque-name.car".to_string());
        assert!(derive_root(&item).is_err());
    }
}
