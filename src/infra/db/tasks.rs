use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    application::repos::{
        CreateTaskParams, RepoError, TasksRepo, TasksWriteRepo, UpdateTaskParams,
    },
    domain::entities::TaskRecord,
    domain::types::TaskStatus,
};

use super::{PostgresRepositories, map_sqlx_error};

const TASK_COLUMNS: &str = "id, title, description, status, assignee, comments";

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    title: String,
    description: String,
    status: TaskStatus,
    assignee: Option<String>,
    comments: String,
}

impl From<TaskRow> for TaskRecord {
    fn from(row: TaskRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            status: row.status,
            assignee: row.assignee,
            comments: row.comments,
        }
    }
}

#[async_trait]
impl TasksRepo for PostgresRepositories {
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, RepoError> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at, id"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TaskRecord::from).collect())
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<TaskRecord>, RepoError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(TaskRecord::from))
    }
}

#[async_trait]
impl TasksWriteRepo for PostgresRepositories {
    async fn create_task(&self, params: CreateTaskParams) -> Result<TaskRecord, RepoError> {
        let CreateTaskParams { id, task } = params;

        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "INSERT INTO tasks (id, title, description, status, assignee, comments) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(id)
        .bind(task.title)
        .bind(task.description)
        .bind(task.status)
        .bind(task.assignee)
        .bind(task.comments)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_task(&self, params: UpdateTaskParams) -> Result<TaskRecord, RepoError> {
        let UpdateTaskParams { id, changes } = params;
        if changes.is_empty() {
            return Err(RepoError::InvalidInput {
                message: "no fields to update".to_string(),
            });
        }

        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("UPDATE tasks SET ");
        {
            let mut set = qb.separated(", ");
            if let Some(title) = changes.title {
                set.push("title = ");
                set.push_bind_unseparated(title);
            }
            if let Some(description) = changes.description {
                set.push("description = ");
                set.push_bind_unseparated(description);
            }
            if let Some(status) = changes.status {
                set.push("status = ");
                set.push_bind_unseparated(status);
            }
            if let Some(assignee) = changes.assignee {
                set.push("assignee = ");
                set.push_bind_unseparated(assignee);
            }
            if let Some(comments) = changes.comments {
                set.push("comments = ");
                set.push_bind_unseparated(comments);
            }
            set.push("updated_at = now()");
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" RETURNING ");
        qb.push(TASK_COLUMNS);

        let row = qb
            .build_query_as::<TaskRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(TaskRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_task(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
