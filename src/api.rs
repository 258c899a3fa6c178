//! Health & Status API endpoints
//!
//! - GET /health - Simple health check
//! - GET /metrics - Prometheus metrics
//! - GET /status - Uptime, tracked transfers and chain cursors
//! - GET /conversions - Most recent completed conversions per chain

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::Result;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{ConversionRow, CursorRow, PgStore};
use crate::metrics;
use crate::types::Chain;

const RECENT_CONVERSIONS: i64 = 50;

#[derive(Clone)]
struct AppState {
    store: PgStore,
    started: Arc<Instant>,
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    uptime_seconds: u64,
    tracked_transfers: u64,
    cursors: Vec<CursorRow>,
}

#[derive(Serialize)]
struct ConversionsResponse {
    ethereum: Vec<ConversionRow>,
    talleo: Vec<ConversionRow>,
}

async fn health_check() -> &'static str {
    "OK"
}

async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
    }

    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response()
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let cursors = state.store.cursors().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to read cursors for status");
        Vec::new()
    });

    Json(StatusResponse {
        status: "ok".to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
        tracked_transfers: metrics::TRACKED_TRANSFERS.get().max(0.0) as u64,
        cursors,
    })
}

async fn conversions(State(state): State<AppState>) -> Json<ConversionsResponse> {
    let recent = |chain: Chain| {
        let store = state.store.clone();
        async move {
            store
                .recent_conversions(chain, RECENT_CONVERSIONS)
                .await
                .unwrap_or_default()
        }
    };

    Json(ConversionsResponse {
        ethereum: recent(Chain::Ethereum).await,
        talleo: recent(Chain::Talleo).await,
    })
}

fn router(store: PgStore) -> Router {
    let state = AppState {
        store,
        started: Arc::new(Instant::now()),
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(prometheus_metrics))
        .route("/status", get(status))
        .route("/conversions", get(conversions))
        .with_state(state)
}

/// Start the API server (combines metrics and status endpoints)
pub async fn start_api_server(addr: SocketAddr, store: PgStore) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server started");

    metrics::UP.set(1.0);

    axum::serve(listener, router(store)).await?;
    Ok(())
}
