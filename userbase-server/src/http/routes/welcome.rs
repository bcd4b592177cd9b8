//! Root greeting

use axum::{routing::get, Router};

/// GET /
async fn welcome() -> &'static str {
    "Welcome to userbase API!"
}

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/", get(welcome))
}
