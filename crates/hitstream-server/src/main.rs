use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

mod app;
mod config;
mod routes;
mod state;

use config::Config;
use state::AppState;

use hitstream_core::fingerprint::set_fingerprint_keys;
use hitstream_core::geo::GeoDb;
use hitstream_duckdb::DuckDbStore;
use hitstream_tracker::{Tracker, TrackerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hitstream=info".parse()?),
        )
        .json()
        .init();

    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // Keys must be in place before the first fingerprint.
    set_fingerprint_keys(cfg.fingerprint_key0, cfg.fingerprint_key1);

    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/hitstream.db", cfg.data_dir);
    let store = Arc::new(DuckDbStore::open(&db_path, &cfg.duckdb_memory_limit)?);

    let geo_db = match GeoDb::open(&cfg.geo_db_path) {
        Ok(geo_db) => Some(geo_db),
        Err(error) => {
            warn!(
                geo_db_path = %cfg.geo_db_path,
                %error,
                "geo database not loaded; country and city stay empty. \
                 Download GeoLite2-City.mmdb from MaxMind and set HITSTREAM_GEO_DB_PATH."
            );
            None
        }
    };

    let tracker = Tracker::new(
        store,
        cfg.salt.clone(),
        Some(TrackerConfig {
            worker: cfg.worker,
            worker_buffer_size: cfg.worker_buffer_size,
            worker_timeout: cfg.worker_timeout,
            session_max_age: cfg.session_max_age,
            geo_db,
            ..Default::default()
        }),
    )
    .await?;

    let state = Arc::new(AppState::new(tracker, cfg.trusted_proxies.clone()));
    let router = app::build_app(Arc::clone(&state));

    let addr = format!("0.0.0.0:{}", cfg.port);
    info!(port = cfg.port, "hitstream listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Drain the worker buffers before the process exits.
    state.tracker.stop().await;
    info!("tracker drained, shutting down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
    }
}
