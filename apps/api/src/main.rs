mod cache;
mod config;
mod db;
mod documents;
mod errors;
mod form;
mod llm_client;
mod models;
mod pipeline;
mod routes;
mod state;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::{spawn_cache_sweeper, CacheTtls, PipelineCaches};
use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::pipeline::lock::{FillLock, InMemoryFillLock, RedisFillLock};
use crate::pipeline::orchestrator::{Pipeline, PipelineSettings};
use crate::pipeline::progress::StoreProgressSink;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::blob::S3BinaryStorage;
use crate::storage::store::PgApplicationStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing or malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Petition API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let store = Arc::new(PgApplicationStore::new(db));

    // Initialize Redis fill lock
    let redis = redis::Client::open(config.redis_url.clone())?;
    let lock: Arc<dyn FillLock> = match RedisFillLock::connect(&redis, config.fill_lock_ttl).await {
        Ok(lock) => {
            info!(
                "Redis fill lock initialized (ttl {}s)",
                config.fill_lock_ttl.as_secs()
            );
            Arc::new(lock)
        }
        Err(e) => {
            warn!("Redis unavailable ({e}); using in-process fill lock (single node only)");
            Arc::new(InMemoryFillLock::new(config.fill_lock_ttl))
        }
    };

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let storage = Arc::new(S3BinaryStorage::new(s3, config.s3_bucket.clone()));
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    // Initialize LLM client (serves both oracles)
    let llm = Arc::new(LlmClient::new(config.anthropic_api_key.clone()));
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Caches and their sweeper
    let caches = PipelineCaches::new(&CacheTtls::from_config(&config));
    spawn_cache_sweeper(caches.clone(), config.cache_sweep_interval);
    info!(
        "Cache sweeper running every {}s",
        config.cache_sweep_interval.as_secs()
    );

    info!(
        "Form template: {} (empty value policy: {:?})",
        config.form_template_key, config.empty_value_policy
    );

    let pipeline = Pipeline {
        storage,
        store: store.clone(),
        analysis_oracle: llm.clone(),
        value_oracle: llm,
        lock,
        progress: Arc::new(StoreProgressSink::new(store)),
        caches,
        settings: PipelineSettings::from_config(&config),
    };

    // Build app state
    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
/// Path-style addressing keeps MinIO endpoints working.
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "petition-static",
    );

    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}
