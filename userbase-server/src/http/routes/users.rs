//! User endpoints

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::db::repos::{User, UserRepo};
use crate::db::Store;
use crate::http::error::ApiError;
use crate::http::extractors::Db;
use crate::http::server::AppState;
use crate::services::UserService;

/// Create user request
#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// GET /users - list all users
async fn list_users(Db(pool): Db) -> Result<Json<Vec<User>>, ApiError> {
    let users = UserService::new(UserRepo::new(&pool)).list().await?;
    Ok(Json(users))
}

/// POST /users - create a user
async fn create_user(
    Db(pool): Db,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let Json(req) = payload?;
    let user = UserService::new(UserRepo::new(&pool))
        .create(&req.name, &req.email)
        .await?;
    tracing::debug!(id = user.id, "user created");

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User created",
        }),
    ))
}

/// GET /users/{id} - fetch one user
async fn get_user(Db(pool): Db, Path(id): Path<i64>) -> Result<Json<User>, ApiError> {
    let user = UserService::new(UserRepo::new(&pool)).get(id).await?;
    Ok(Json(user))
}

/// User routes
pub fn router<S>() -> Router<Arc<AppState<S>>>
where
    S: Store<Handle = PgPool>,
{
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user))
}
