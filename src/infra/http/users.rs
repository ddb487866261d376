//! User service routes.

use axum::Json;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::users::UserService;
use crate::infra::db::PostgresRepositories;

use super::error::{ApiError, user_to_api};

#[derive(Clone)]
pub struct UsersState {
    pub users: UserService,
    pub database: Option<PostgresRepositories>,
}

pub async fn list_users(State(state): State<UsersState>) -> Result<impl IntoResponse, ApiError> {
    let users = state.users.list_users().await.map_err(user_to_api)?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<UsersState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let user = state.users.find_user(id).await.map_err(user_to_api)?;
    Ok(Json(user))
}

pub async fn health(State(state): State<UsersState>) -> impl IntoResponse {
    super::health_response("user-service", state.database.as_ref()).await
}
