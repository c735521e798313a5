//! NDJSON work-item input.
//!
//! Items come from a positional key or, when none is given, one JSON
//! object per stdin line. Unknown fields are ignored so the output of a
//! previous run (which carries `ok`, `cid`, `error`, ...) pipes straight
//! into the next stage.

use crate::error::{CliError, CliResult};
use serde::Deserialize;
use std::io::BufRead;

/// One unit of work for a driver subcommand.
#[derive(Debug, Clone, Deserialize)]
pub struct Item {
    /// Source object key.
    pub key: String,
    /// Shard cid, when a previous stage already computed it.
    #[serde(default)]
    pub shard: Option<String>,
    /// Root cid, when known.
    #[serde(default)]
    pub root: Option<String>,
}

impl Item {
    pub fn from_key(key: String) -> Self {
        Self {
            key,
            shard: None,
            root: None,
        }
    }
}

/// Build the work list: the positional key, or all of stdin.
pub fn items_from(key: Option<String>) -> CliResult<Vec<Item>> {
    match key {
        Some(key) => Ok(vec![Item::from_key(key)]),
        None => read_stdin_items(),
    }
}

fn read_stdin_items() -> CliResult<Vec<Item>> {
    let stdin = std::io::stdin();
    let mut items = Vec::new();
    for (line_no, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let item: Item = serde_json::from_str(trimmed).map_err(|e| {
            CliError::Input(format!("stdin line {}: {e}", line_no + 1))
        })?;
        items.push(item);
    }
    Ok(items)
}
