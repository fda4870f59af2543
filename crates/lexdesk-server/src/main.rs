mod logging;
mod routes;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use lexdesk_core::{
    config::{Config, LogFormat},
    simulator::UploadSimulator,
};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::logging::BroadcastLayer;

// ── AppState ──────────────────────────────────────────────────────────────

pub struct AppState {
    pub simulator: Arc<UploadSimulator>,
    pub start_time: Instant,
    pub log_tx: broadcast::Sender<String>,
    pub log_ring: Arc<std::sync::Mutex<VecDeque<String>>>,
}

// ── main ──────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let (log_tx, _) = broadcast::channel(256);
    let log_ring = Arc::new(std::sync::Mutex::new(VecDeque::new()));
    let json = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lexdesk_server=info,lexdesk_core=info,tower_http=debug".into()
            }),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(BroadcastLayer {
            tx: log_tx.clone(),
            ring: Arc::clone(&log_ring),
        })
        .init();

    info!(
        "upload simulation: increment < {}, tick every {}..{} ms",
        config.simulation.max_increment,
        config.simulation.tick_min_ms,
        config.simulation.tick_min_ms + config.simulation.tick_jitter_ms,
    );

    let simulator = UploadSimulator::from_config(&config.simulation);
    let state = Arc::new(AppState {
        simulator: Arc::clone(&simulator),
        start_time: Instant::now(),
        log_tx,
        log_ring,
    });
    let app = routes::router(state);

    let addr = config.bind_addr();
    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {e}");
            }
        })
        .await?;

    simulator.shutdown();
    info!("shut down");
    Ok(())
}
