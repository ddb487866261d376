mod error;
mod middleware;
mod notifications;
mod tasks;
mod users;

pub use error::{ApiError, ApiErrorBody, ApiErrorMessage, codes};
pub use notifications::NotificationsState;
pub use tasks::{CreateTaskRequest, TasksState, UpdateTaskRequest};
pub use users::UsersState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router, middleware as axum_middleware};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::application::error::ErrorReport;
use crate::infra::db::PostgresRepositories;

use self::middleware::{log_responses, set_request_context};

#[derive(Debug, Serialize)]
struct ServiceHealth {
    online: bool,
    service: &'static str,
    database: &'static str,
}

async fn health_response(
    service: &'static str,
    database: Option<&PostgresRepositories>,
) -> Response {
    let Some(database) = database else {
        return Json(ServiceHealth {
            online: true,
            service,
            database: "not_configured",
        })
        .into_response();
    };

    match database.health_check().await {
        Ok(()) => Json(ServiceHealth {
            online: true,
            service,
            database: "ok",
        })
        .into_response(),
        Err(err) => {
            let mut response = (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ServiceHealth {
                    online: false,
                    service,
                    database: "unavailable",
                }),
            )
                .into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

pub fn build_tasks_router(state: TasksState) -> Router {
    let router = Router::new()
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/tasks/{id}",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/health", get(tasks::health))
        .with_state(state);

    with_common_layers(router)
}

pub fn build_users_router(state: UsersState) -> Router {
    let router = Router::new()
        .route("/users", get(users::list_users))
        .route("/users/{id}", get(users::get_user))
        .route("/health", get(users::health))
        .with_state(state);

    with_common_layers(router)
}

pub fn build_notifications_router(state: NotificationsState) -> Router {
    let router = Router::new()
        .route("/ws", get(notifications::ws_handler))
        .route("/health", get(notifications::health))
        .with_state(state);

    with_common_layers(router)
}

fn with_common_layers(router: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .route("/", get(redirect_to_health))
        .fallback(route_not_found)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
        .layer(cors)
}

async fn redirect_to_health() -> Redirect {
    Redirect::to("/health")
}

async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
