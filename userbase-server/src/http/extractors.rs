//! Custom Axum extractors

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sqlx::PgPool;

use super::error::ApiError;

/// The healthy pool attached to this request by the connection middleware
#[derive(Clone)]
pub struct Db(pub PgPool);

impl<S> FromRequestParts<S> for Db
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Db>()
            .cloned()
            .ok_or_else(|| ApiError::Internal {
                message: "route is missing the connection middleware".into(),
            })
    }
}
