//! soundsink - a self-hosted music ingestion and playback service
//!
//! Submit a URL, get a deduplicated, catalogue-linked track in your library.

#![allow(dead_code)]

mod api;
mod config;
mod core;
mod db;
mod models;
mod musicbrainz;
mod queue;
mod storage;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use crate::api::AppState;
use crate::config::{Paths, Settings};
use crate::core::{AutoMatcher, IngestProcessor};
use crate::musicbrainz::{CatalogueClient, MusicBrainzClient};
use crate::queue::{JobQueue, ProgressFanout, RedisJobQueue, WorkerPool, WorkerPoolConfig};
use crate::storage::{LocalObjectStore, ObjectStore};

/// soundsink - self-hosted music ingestion
#[derive(Parser, Debug)]
#[command(name = "soundsink")]
#[command(version)]
#[command(about = "A self-hosted music ingestion and playback service")]
struct Args {
    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 5080)]
    port: u16,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to config directory
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let paths = Paths::init(args.config.clone())?;

    // settings first so the log filter can come from them
    let settings_handle = Settings::global();
    {
        let mut settings = settings_handle.write();
        if settings.server_id.is_empty() {
            settings.server_id = uuid::Uuid::new_v4().to_string();
            settings.save()?;
        }
    }
    let settings = settings_handle.read().clone();

    let log_level = if args.debug {
        "debug".to_string()
    } else {
        settings.log_level.clone()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("soundsink v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Config directory: {:?}", paths.config_dir());

    // SQLite for tracks and library entries
    let db_path = settings
        .database_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| paths.app_db_path());
    db::setup_sqlite_at(&db_path).await?;
    info!("Database ready at {:?}", db_path);

    // Shared job store
    let redis = redis::Client::open(settings.redis_url.as_str())?;
    info!("Job store: {}", settings.redis_url);

    let queue: Arc<dyn JobQueue> = Arc::new(RedisJobQueue::new(redis.clone()));
    let fanout = Arc::new(ProgressFanout::new(redis));

    // Catalogue client; one per process, the rate limiter lives inside it
    let catalogue: Arc<dyn CatalogueClient> = Arc::new(MusicBrainzClient::new(
        settings.musicbrainz_rate_limit_per_second,
    ));
    let matcher = Arc::new(AutoMatcher::new(catalogue));

    let storage_dir = settings
        .storage_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| paths.storage_dir());
    let storage: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(storage_dir)?);

    // Worker pool driving the ingest pipeline
    let processor = Arc::new(IngestProcessor::new(
        Arc::clone(&storage),
        Arc::clone(&matcher),
    ));
    let pool = Arc::new(WorkerPool::new(
        Arc::clone(&queue),
        processor,
        WorkerPoolConfig {
            worker_count: settings.worker_count,
            max_retries: settings.max_retries,
            job_timeout: settings.job_timeout(),
            ..Default::default()
        },
    ));
    pool.start();

    let state = AppState {
        queue,
        fanout,
        matcher,
        storage,
    };

    let addr = format!("{}:{}", args.host, args.port);
    info!("Server listening on http://{}", addr);

    use actix_cors::Cors;
    use actix_web::{middleware, web, App, HttpServer};

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .app_data(web::Data::new(state.clone()))
            .app_data(web::JsonConfig::default().error_handler(api::json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(api::query_error_handler))
            .configure(api::configure)
    })
    .bind(addr)?
    .run()
    .await?;

    info!("Shutting down, waiting for in-flight jobs...");
    pool.stop(Duration::from_secs(30)).await?;

    Ok(())
}
