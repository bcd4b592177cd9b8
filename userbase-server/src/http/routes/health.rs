//! Liveness and readiness endpoints
//!
//! Both bypass the connection middleware: `/health` answers as long as the
//! process is up, `/ready` reports dependency state without forcing a rebuild.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use sqlx::PgPool;

use crate::db::Store;
use crate::http::server::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

#[derive(Serialize)]
pub struct DatabaseStatus {
    pub healthy: bool,
    pub generation: u64,
}

#[derive(Serialize)]
pub struct CacheStatus {
    pub initialized: bool,
    pub healthy: bool,
}

/// Readiness response
#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub database: DatabaseStatus,
    pub cache: CacheStatus,
}

/// GET /health
async fn health<S>(State(state): State<Arc<AppState<S>>>) -> Json<HealthResponse>
where
    S: Store<Handle = PgPool>,
{
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// GET /ready
async fn ready<S>(State(state): State<Arc<AppState<S>>>) -> (StatusCode, Json<ReadyResponse>)
where
    S: Store<Handle = PgPool>,
{
    let database = DatabaseStatus {
        healthy: state.manager.is_healthy().await,
        generation: state.manager.generation().await,
    };

    let cache = match state.cache.get() {
        Ok(client) => CacheStatus {
            initialized: true,
            healthy: client.ping().await.is_ok(),
        },
        Err(_) => CacheStatus {
            initialized: false,
            healthy: false,
        },
    };

    let is_ready = database.healthy && cache.healthy;
    let status = if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if is_ready { "ready" } else { "not_ready" },
            database,
            cache,
        }),
    )
}

/// Health routes
pub fn router<S>() -> Router<Arc<AppState<S>>>
where
    S: Store<Handle = PgPool>,
{
    Router::new()
        .route("/health", get(health::<S>))
        .route("/ready", get(ready::<S>))
}
