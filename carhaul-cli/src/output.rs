//! NDJSON result output.

use std::io::Write;

/// Emit one result object as a single stdout line.
///
/// Results from concurrent items interleave in completion order; each
/// line is written atomically under the stdout lock.
pub fn emit(value: &serde_json::Value) {
    let mut stdout = std::io::stdout().lock();
    // A broken pipe downstream (e.g. `head`) is a normal way to stop.
    let _ = writeln!(stdout, "{value}");
}
