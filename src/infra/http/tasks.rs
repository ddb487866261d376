//! Task service routes.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::application::tasks::{CreateTaskCommand, TaskService, UpdateTaskCommand};
use crate::domain::types::TaskStatus;
use crate::infra::db::PostgresRepositories;

use super::error::{ApiError, task_to_api};

#[derive(Clone)]
pub struct TasksState {
    pub tasks: TaskService,
    /// Probed by `/health`; absent when running on in-memory repositories.
    pub database: Option<PostgresRepositories>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    /// Absent leaves the assignee alone; `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub assignee: Option<Option<String>>,
    #[serde(default)]
    pub comments: Option<String>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub async fn list_tasks(State(state): State<TasksState>) -> Result<impl IntoResponse, ApiError> {
    let tasks = state.tasks.list_tasks().await.map_err(task_to_api)?;
    Ok(Json(tasks))
}

pub async fn get_task(
    State(state): State<TasksState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let task = state.tasks.find_task(id).await.map_err(task_to_api)?;
    Ok(Json(task))
}

pub async fn create_task(
    State(state): State<TasksState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;

    let command = CreateTaskCommand {
        title: payload.title,
        description: payload.description,
        status: payload.status,
        assignee: payload.assignee,
        comments: payload.comments,
    };

    let created = state
        .tasks
        .create_task(command)
        .await
        .map_err(task_to_api)?;

    Ok((StatusCode::CREATED, Json(created.value)))
}

pub async fn update_task(
    State(state): State<TasksState>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let Json(payload) = payload?;

    let command = UpdateTaskCommand {
        id,
        title: payload.title,
        description: payload.description,
        status: payload.status,
        assignee: payload.assignee,
        comments: payload.comments,
    };

    let updated = state
        .tasks
        .update_task(command)
        .await
        .map_err(task_to_api)?;

    Ok(Json(updated.value))
}

pub async fn delete_task(
    State(state): State<TasksState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    state.tasks.delete_task(id).await.map_err(task_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health(State(state): State<TasksState>) -> impl IntoResponse {
    super::health_response("task-service", state.database.as_ref()).await
}
