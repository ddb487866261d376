//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{TaskRecord, UserRecord};
use crate::domain::tasks::{NewTask, TaskChanges};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateTaskParams {
    pub id: Uuid,
    pub task: NewTask,
}

#[derive(Debug, Clone)]
pub struct UpdateTaskParams {
    pub id: Uuid,
    pub changes: TaskChanges,
}

#[async_trait]
pub trait TasksRepo: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, RepoError>;

    async fn find_task(&self, id: Uuid) -> Result<Option<TaskRecord>, RepoError>;
}

#[async_trait]
pub trait TasksWriteRepo: Send + Sync {
    async fn create_task(&self, params: CreateTaskParams) -> Result<TaskRecord, RepoError>;

    /// Applies `changes` and returns the post-mutation row.
    /// Returns [`RepoError::NotFound`] when no row matched.
    async fn update_task(&self, params: UpdateTaskParams) -> Result<TaskRecord, RepoError>;

    /// Returns [`RepoError::NotFound`] when no row matched.
    async fn delete_task(&self, id: Uuid) -> Result<(), RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn list_users(&self) -> Result<Vec<UserRecord>, RepoError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;
}
