//! Driver subcommands.

pub mod copy;
pub mod errors;
pub mod hash;
pub mod head;
pub mod index;
pub mod list;

use crate::error::CliResult;
use crate::input::Item;
use crate::output;
use carhaul_migrate::MigrateError;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Fan a work list through `f` with bounded concurrency and per-item
/// retry.
///
/// Retryable failures get `retries` extra attempts with exponential
/// backoff; final failures are recorded to the output stream as
/// `{"key", "ok": false, "error"}` and processing continues — a failed
/// item never stops the run.
pub async fn run_items<F, Fut>(
    items: Vec<Item>,
    concurrency: usize,
    retries: usize,
    f: F,
) -> CliResult<()>
where
    F: Fn(Item) -> Fut,
    Fut: Future<Output = Result<serde_json::Value, MigrateError>>,
{
    let total = items.len();
    let concurrency = concurrency.max(1);
    let f = &f;

    let mut failed: usize = 0;
    let mut pending = FuturesUnordered::new();
    let mut queue = items.into_iter();
    loop {
        while pending.len() < concurrency {
            match queue.next() {
                Some(item) => pending.push(process_one(item, retries, f)),
                None => break,
            }
        }
        match pending.next().await {
            Some(ok) => {
                if !ok {
                    failed += 1;
                }
            }
            None => break,
        }
    }

    info!(total, failed, "run complete");
    Ok(())
}

/// Process one item: returns whether it ultimately succeeded.
async fn process_one<F, Fut>(item: Item, retries: usize, f: &F) -> bool
where
    F: Fn(Item) -> Fut,
    Fut: Future<Output = Result<serde_json::Value, MigrateError>>,
{
    let key = item.key.clone();
    let mut attempt: usize = 0;
    loop {
        match f(item.clone()).await {
            Ok(value) => {
                output::emit(&value);
                return true;
            }
            Err(err) if err.is_retryable() && attempt < retries => {
                attempt += 1;
                let backoff = Duration::from_millis(500 * (1 << attempt.min(4)));
                warn!(key, %err, attempt, "retrying after backoff");
                tokio::time::sleep(backoff).await;
            }
            Err(err) => {
                output::emit(&serde_json::json!({
                    "key": key,
                    "ok": false,
                    "error": err.to_string(),
                }));
                return false;
            }
        }
    }
}
