//! HTTP/WebSocket server wiring

use crate::engine::{self, EngineConfig};
use crate::hub::{self, BroadcastHub};
use crate::state::AppState;
use crate::{api, ws};
use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Listener and engine settings for one server run
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub host: String,
    pub port: u16,
    pub engine: EngineConfig,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(api::health))
        .route("/api/set-directory", post(api::set_directory))
        .route("/api/reset-frames", post(api::reset_frames))
        .route("/api/set-total-frames", post(api::set_total_frames))
        .route("/api/server-info", get(api::server_info))
        .route("/api/state", get(api::current_state))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(state)
}

/// Run until SIGINT/SIGTERM
pub async fn serve(options: ServeOptions) -> Result<()> {
    let hub = Arc::new(BroadcastHub::new());
    let default_watch_dir = options.engine.watch_dir.clone();

    let (engine, engine_task) = engine::start(options.engine, hub.clone())
        .await
        .context("Failed to start progress engine")?;

    let heartbeat = hub::start_heartbeat(hub.clone(), hub::HEARTBEAT_INTERVAL);

    let state = AppState {
        engine: engine.clone(),
        default_watch_dir,
    };
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let local = listener.local_addr().context("Failed to read listener address")?;
    tracing::info!(%local, "Server listening");
    tracing::info!("Viewer channel: ws://{local}/ws");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped accepting connections, cleaning up");
    heartbeat.abort();

    hub.shutdown_all();
    engine.shutdown().await;
    let _ = tokio::time::timeout(Duration::from_secs(5), engine_task).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
