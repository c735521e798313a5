use clap::{Parser, Subcommand};

/// Driver for CAR shard migration.
///
/// Work items flow as NDJSON: `list` emits `{"key": ...}` lines, the
/// other subcommands consume such lines on stdin (or a single positional
/// key) and emit one result object per item. Failed items are emitted
/// with `"ok": false` and processing continues; pipe a run's output
/// through `carhaul errors` to collect the retry list.
#[derive(Parser, Debug)]
#[command(name = "carhaul")]
#[command(about = "Migrate CAR shards between object stores", version)]
pub struct Cli {
    /// Source endpoint override (LocalStack/MinIO testing)
    #[arg(long, global = true, env = "SOURCE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Source region
    #[arg(long, global = true, default_value = "us-east-2")]
    pub region: String,

    /// Source bucket
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Concurrent in-flight items
    #[arg(long, global = true, default_value_t = 25)]
    pub concurrency: usize,

    /// Extra attempts per item on retryable failures
    #[arg(long, global = true, default_value_t = 2)]
    pub retries: usize,

    /// Disable colored error output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List source keys under a prefix as NDJSON
    List {
        /// Key prefix to list under
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Compute the CAR cid of source objects
    Hash {
        /// Single key (reads NDJSON items from stdin when omitted)
        key: Option<String>,
    },

    /// Copy shards to the destination (reads DEST_* environment)
    Copy {
        /// Single key (reads NDJSON items from stdin when omitted)
        key: Option<String>,

        /// Single-PUT ceiling in bytes; larger objects go multipart
        #[arg(long)]
        max_put_size: Option<u64>,
    },

    /// Check whether shards already exist at the destination
    Head {
        /// Single key (reads NDJSON items from stdin when omitted)
        key: Option<String>,
    },

    /// Rewrite block-index rows for shards (reads BLOCK_INDEX_* environment)
    Index {
        /// Single key (reads NDJSON items from stdin when omitted)
        key: Option<String>,
    },

    /// Re-emit failed items from a previous run's output on stdin
    Errors,
}
