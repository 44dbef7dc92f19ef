//! Plain HTTP surface next to the WebSocket endpoint.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use easel_core::MapIdent;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tracing::error;

use crate::storage::CanvasStore;

#[derive(Clone)]
pub struct HttpState {
    pub store: CanvasStore,
    pub metrics: PrometheusHandle,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    status: &'static str,
    persistent: bool,
}

#[derive(Debug, Serialize)]
pub struct MapStatusResponse {
    pub exists: bool,
    pub pixel_count: usize,
}

/// GET /health
pub async fn health_check(State(state): State<HttpState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        persistent: state.store.is_persistent(),
    })
}

/// GET /maps/:map_ident - pixel count without opening a WebSocket.
pub async fn map_status(
    State(state): State<HttpState>,
    Path(map_ident): Path<String>,
) -> Result<Json<MapStatusResponse>, StatusCode> {
    let map_ident = MapIdent::parse(&map_ident).map_err(|_| StatusCode::BAD_REQUEST)?;

    match state.store.pixel_count(&map_ident).await {
        Ok(Some(pixel_count)) => Ok(Json(MapStatusResponse {
            exists: true,
            pixel_count,
        })),
        Ok(None) => Ok(Json(MapStatusResponse {
            exists: false,
            pixel_count: 0,
        })),
        Err(err) => {
            error!(map = %map_ident, error = %err, "map status lookup failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler(State(state): State<HttpState>) -> impl IntoResponse {
    let body = state.metrics.render();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
