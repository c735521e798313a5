//! CAR shard migration HTTP server
//!
//! A standalone HTTP server exposing the three migration workers. Each
//! endpoint takes the worker's parameters as query strings and answers
//! with the worker's JSON shape.
//!
//! # Endpoints
//!
//! - `GET /hash?region=&bucket=&key=` - Compute a source object's CAR cid
//! - `GET /copy?region=&bucket=&key=&shard=&root=` - Copy a shard
//! - `GET /index?region=&bucket=&key=&shard=` - Reindex a shard's blocks
//! - `GET /health` - Health check
//!
//! # Configuration
//!
//! Destination buckets/credentials come from the `DEST_*` / `*_BUCKET`
//! environment (see carhaul-migrate), the block-index table from
//! `BLOCK_INDEX_REGION` / `BLOCK_INDEX_TABLE`. Endpoints whose
//! environment is absent answer 400. See `--help` for server options.
//!
//! # Example
//!
//! ```bash
//! carhaul-httpd --listen 0.0.0.0:9190
//! ```

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use carhaul_migrate::{
    connect_source, copy_shard, hash_shard, reindex_shard, CopyOptions, CopyRequest, DestEnv,
    Destination, ErrorResponse, HashRequest, HashResponse, IndexRequest, IndexResponse,
    MigrateError, TableEnv, ALLOWED_REGIONS,
};
use carhaul_storage_aws::{BlockIndexTable, ObjectStore};
use clap::Parser;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// CAR shard migration HTTP server
#[derive(Parser, Debug)]
#[command(name = "carhaul-httpd")]
#[command(about = "HTTP server for the CAR shard migration workers")]
struct Args {
    /// Listen address
    #[arg(long, default_value = "0.0.0.0:9190", env = "CARHAUL_LISTEN")]
    listen: SocketAddr,

    /// Source endpoint override (LocalStack/MinIO testing)
    #[arg(long, env = "SOURCE_ENDPOINT")]
    source_endpoint: Option<String>,

    /// Single-PUT ceiling in bytes; larger objects go multipart
    #[arg(long, env = "MAX_PUT_SIZE")]
    max_put_size: Option<u64>,
}

/// Application state shared across handlers.
struct AppState {
    /// One source store per allowed legacy region.
    sources: HashMap<String, ObjectStore>,
    /// Copy destination, when the `DEST_*` environment is present.
    dest: Option<Destination>,
    /// Block-index table, when the `BLOCK_INDEX_*` environment is present.
    table: Option<BlockIndexTable>,
    copy_opts: CopyOptions,
}

impl AppState {
    fn source(&self, region: &str) -> Result<&ObjectStore, MigrateError> {
        self.sources
            .get(region)
            .ok_or_else(|| MigrateError::upstream(format!("no source store for region {region}")))
    }

    fn dest(&self) -> Result<&Destination, MigrateError> {
        self.dest.as_ref().ok_or_else(|| {
            MigrateError::validation("copy is not configured (DEST_* environment missing)")
        })
    }

    fn table(&self) -> Result<&BlockIndexTable, MigrateError> {
        self.table.as_ref().ok_or_else(|| {
            MigrateError::validation("index is not configured (BLOCK_INDEX_* environment missing)")
        })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carhaul=info,carhaul_httpd=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut sources = HashMap::new();
    for region in ALLOWED_REGIONS {
        let store = connect_source(region, args.source_endpoint.as_deref()).await?;
        sources.insert(region.to_string(), store);
    }

    let dest = match DestEnv::from_env() {
        Ok(env) => Some(env.connect().await?),
        Err(e) => {
            info!("copy disabled: {e}");
            None
        }
    };
    let table = match TableEnv::from_env() {
        Ok(env) => Some(env.connect().await?),
        Err(e) => {
            info!("index disabled: {e}");
            None
        }
    };

    let mut copy_opts = CopyOptions::default();
    if let Some(max_put_size) = args.max_put_size {
        copy_opts.max_put_size = max_put_size;
    }

    let state = Arc::new(AppState {
        sources,
        dest,
        table,
        copy_opts,
    });

    let app = Router::new()
        .route("/hash", get(hash_handler))
        .route("/copy", get(copy_handler))
        .route("/index", get(index_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!(listen = %args.listen, "carhaul-httpd listening");
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn hash_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let result = async {
        let req = HashRequest::from_query(&params)?;
        let store = state.source(&req.src.region)?;
        let cid = hash_shard(store, &req.src).await?;
        Ok::<_, MigrateError>(HashResponse::new(&cid))
    }
    .await;

    match result {
        Ok(body) => (StatusCode::OK, Json(serde_json::json!(body))),
        Err(e) => error_reply(e),
    }
}

async fn copy_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let result = async {
        let req = CopyRequest::from_query(&params)?;
        let store = state.source(&req.src.object.region)?;
        let dest = state.dest()?;
        copy_shard(store, dest, &req, &state.copy_opts).await?;
        Ok::<_, MigrateError>(carhaul_migrate::CopyResponse::new())
    }
    .await;

    match result {
        Ok(body) => (StatusCode::OK, Json(serde_json::json!(body))),
        Err(e) => error_reply(e),
    }
}

async fn index_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let result = async {
        let req = IndexRequest::from_query(&params)?;
        let store = state.source(&req.src.object.region)?;
        let table = state.table()?;
        let updated = reindex_shard(store, table, &req).await?;
        Ok::<_, MigrateError>(IndexResponse::new(updated))
    }
    .await;

    match result {
        Ok(body) => (StatusCode::OK, Json(serde_json::json!(body))),
        Err(e) => error_reply(e),
    }
}

fn error_reply(err: MigrateError) -> (StatusCode, Json<serde_json::Value>) {
    error!("{err}");
    let (status, body) = ErrorResponse::from_error(&err);
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(serde_json::json!(body)),
    )
}
