//! Per-request connection middleware
//!
//! Asks the connection manager for a healthy pool before the handler runs
//! and attaches it to the request for the [`Db`] extractor.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use sqlx::PgPool;

use super::error::ApiError;
use super::extractors::Db;
use super::server::AppState;
use crate::db::Store;

pub async fn attach_connection<S>(
    State(state): State<Arc<AppState<S>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    S: Store<Handle = PgPool>,
{
    let pool = state.manager.get_connection().await?;
    request.extensions_mut().insert(Db(pool));
    Ok(next.run(request).await)
}
