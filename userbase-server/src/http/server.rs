//! Axum server setup
//!
//! Server skeleton with:
//! - Per-request connection middleware on data routes
//! - Tracing and request timeout middleware
//! - Graceful shutdown bounded by a grace period

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::middleware::attach_connection;
use super::routes;
use crate::cache::CacheInitializer;
use crate::db::{ConnectionManager, PgStore, Store};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0:8080)
    pub bind_addr: SocketAddr,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// How long in-flight requests get after the shutdown signal
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            request_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Shared application state
pub struct AppState<S: Store = PgStore> {
    pub manager: Arc<ConnectionManager<S>>,
    pub cache: Arc<CacheInitializer>,
    pub started_at: Instant,
}

impl<S: Store> AppState<S> {
    pub fn new(manager: Arc<ConnectionManager<S>>, cache: Arc<CacheInitializer>) -> Self {
        Self {
            manager,
            cache,
            started_at: Instant::now(),
        }
    }
}

/// Build the application router with all routes
pub fn build_router<S>(state: AppState<S>, config: &ServerConfig) -> Router
where
    S: Store<Handle = PgPool>,
{
    let state = Arc::new(state);

    let data_routes = Router::new()
        .merge(routes::welcome::router())
        .merge(routes::users::router::<S>())
        .route_layer(from_fn_with_state(state.clone(), attach_connection::<S>));

    Router::new()
        .merge(data_routes)
        .merge(routes::health::router::<S>())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn run_server<S, F>(
    state: AppState<S>,
    config: ServerConfig,
    shutdown: F,
) -> Result<(), ServerError>
where
    S: Store<Handle = PgPool>,
    F: Future<Output = ()> + Send,
{
    let app = build_router(state, &config);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    serve_until(listener, app, config.shutdown_grace, shutdown).await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Serve `app` on `listener`. Once `shutdown` resolves the listener stops
/// accepting; open connections get `grace` to finish and are then abandoned.
pub async fn serve_until<F>(
    listener: TcpListener,
    app: Router,
    grace: Duration,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send,
{
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .into_future(),
    );

    tokio::select! {
        joined = &mut server => return Ok(joined??),
        _ = shutdown => {}
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => joined??,
        Err(_) => {
            tracing::warn!(grace = ?grace, "Grace period elapsed, abandoning open connections");
            server.abort();
        }
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
