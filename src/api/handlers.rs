//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint. Every handler goes
//! through the `Cache` facade, so the same router serves either engine.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::warn;

use crate::cache::Cache;
use crate::config::CacheDriver;
use crate::error::{CacheError, Result};
use crate::models::{
    validate_key, DeleteResponse, GetResponse, HealthResponse, IncrRequest, IncrResponse,
    SetRequest, SetResponse, StatsResponse, TtlResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn Cache>,
    pub driver: CacheDriver,
}

impl AppState {
    pub fn new(cache: Arc<dyn Cache>, driver: CacheDriver) -> Self {
        Self { cache, driver }
    }
}

fn checked_key(key: &str) -> Result<()> {
    match validate_key(key) {
        Some(msg) => Err(CacheError::InvalidArgument(msg)),
        None => Ok(()),
    }
}

/// Handler for PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(msg) = req.validate() {
        return Err(CacheError::InvalidArgument(msg));
    }
    let ttl = Duration::from_secs(req.ttl.unwrap_or(0));
    state.cache.set(&req.key, req.cache_value(), ttl).await?;
    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state.cache.get(&key).await?;
    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.cache.delete(&key).await?;
    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for GET /ttl/:key
pub async fn ttl_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<TtlResponse>> {
    let ttl = state.cache.ttl(&key).await?;
    Ok(Json(TtlResponse::new(key, ttl)))
}

/// Handler for POST /incr/:key
pub async fn incr_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<IncrRequest>,
) -> Result<Json<IncrResponse>> {
    checked_key(&key)?;
    let value = state.cache.increment(&key, req.delta).await?;
    Ok(Json(IncrResponse { key, value }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.cache.stats().await;
    Json(StatsResponse::new(state.driver.as_str(), stats))
}

/// Handler for GET /health
///
/// 200 when the engine answers a live round trip, 503 otherwise.
pub async fn health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    match state.cache.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse::healthy(state.driver.as_str())),
        ),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::unhealthy(state.driver.as_str(), e.to_string())),
            )
        }
    }
}
