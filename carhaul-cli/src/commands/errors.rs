//! `carhaul errors` — filter a previous run's output down to failures.
//!
//! Reads NDJSON on stdin and re-emits every line whose `ok` is `false`,
//! producing the retry list for the next run.

use crate::error::{CliError, CliResult};
use crate::output;
use std::io::BufRead;

pub fn run() -> CliResult<()> {
    let stdin = std::io::stdin();
    for (line_no, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(trimmed)
            .map_err(|e| CliError::Input(format!("stdin line {}: {e}", line_no + 1)))?;
        if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
            output::emit(&value);
        }
    }
    Ok(())
}
