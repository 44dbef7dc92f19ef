use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use clap::Parser;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use easel::{
    cli::{self, Cli, Commands},
    config::Config,
    handlers::{health_check, map_status, metrics_handler, HttpState},
    router::CanvasRouter,
    storage::CanvasStore,
    telemetry::Telemetry,
    websocket::{websocket_handler, WsState},
};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = Telemetry::init()?;

    let cli = Cli::parse();
    if let Some(Commands::Debug { url, map, command }) = cli.command {
        return cli::run_debug_client(url, map, command).await;
    }

    let config = Config::from_env();
    info!(
        port = config.port,
        chunk_size = config.chunk_size,
        max_frame_bytes = config.max_frame_bytes,
        serialize_writes = config.serialize_writes,
        "starting easel canvas server"
    );

    let store = match &config.redis_url {
        Some(url) => match CanvasStore::connect(url).await {
            Ok(store) => {
                info!(redis = %url, "connected to redis");
                store
            }
            Err(err) => {
                error!(redis = %url, error = %err, "failed to connect to redis");
                std::process::exit(1);
            }
        },
        None => {
            info!("no EASEL_REDIS_URL set; canvases are in-memory and will not survive restart");
            CanvasStore::in_memory()
        }
    };

    let router = Arc::new(CanvasRouter::new(store.clone(), &config));
    let ws_state = WsState::new(router, config.clone());
    let http_state = HttpState {
        store,
        metrics: telemetry.metrics_handle(),
    };

    let http_routes = Router::new()
        .route("/health", get(health_check))
        .route("/maps/:map_ident", get(map_status))
        .route("/metrics", get(metrics_handler))
        .with_state(http_state);

    let ws_routes = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(ws_state);

    let app = Router::new()
        .merge(http_routes)
        .merge(ws_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("easel listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown with error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}
