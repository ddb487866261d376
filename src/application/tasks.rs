//! Task reads through the cache and the invalidating write path.
//!
//! Every successful mutation runs persist, then invalidate, then publish, each
//! step awaited before the next. Only the persist step can fail the call.
//! Invalidation and publish failures are logged and handed back in
//! [`SideEffects`] without undoing the mutation.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::repos::{
    CreateTaskParams, RepoError, TasksRepo, TasksWriteRepo, UpdateTaskParams,
};
use crate::cache::{CacheError, CacheKey, ReadThroughCache};
use crate::domain::entities::TaskRecord;
use crate::domain::error::DomainError;
use crate::domain::events::ChangeEvent;
use crate::domain::tasks::{NewTask, TaskChanges};
use crate::domain::types::TaskStatus;
use crate::events::{BusError, EventPublisher};

const SOURCE: &str = "application::tasks";

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0}")]
    Validation(String),
    #[error("task `{0}` not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<DomainError> for TaskError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { message } => Self::Validation(message),
            other => Self::Validation(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateTaskCommand {
    pub title: String,
    pub description: String,
    pub status: Option<TaskStatus>,
    pub assignee: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaskCommand {
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    /// `Some(None)` clears the assignee.
    pub assignee: Option<Option<String>>,
    pub comments: Option<String>,
}

/// Outcome of the best-effort steps that follow a committed mutation.
#[derive(Debug)]
pub struct SideEffects {
    pub invalidation: Result<(), CacheError>,
    pub publish: Result<(), BusError>,
}

impl SideEffects {
    pub fn is_clean(&self) -> bool {
        self.invalidation.is_ok() && self.publish.is_ok()
    }
}

/// A committed mutation and what happened to its side effects.
#[derive(Debug)]
pub struct Mutation<T> {
    pub value: T,
    pub effects: SideEffects,
}

#[derive(Clone)]
pub struct TaskService {
    reader: Arc<dyn TasksRepo>,
    writer: Arc<dyn TasksWriteRepo>,
    cache: ReadThroughCache,
    publisher: Arc<EventPublisher>,
    channel: String,
    list_ttl: Duration,
}

impl TaskService {
    pub fn new(
        reader: Arc<dyn TasksRepo>,
        writer: Arc<dyn TasksWriteRepo>,
        cache: ReadThroughCache,
        publisher: Arc<EventPublisher>,
        channel: impl Into<String>,
        list_ttl: Duration,
    ) -> Self {
        Self {
            reader,
            writer,
            cache,
            publisher,
            channel: channel.into(),
            list_ttl,
        }
    }

    /// All tasks, served from the `all_tasks` cache entry when present.
    pub async fn list_tasks(&self) -> Result<Vec<TaskRecord>, TaskError> {
        self.cache
            .fetch(CacheKey::AllTasks.as_str(), self.list_ttl, || async {
                Ok::<_, TaskError>(self.reader.list_tasks().await?)
            })
            .await
    }

    pub async fn find_task(&self, id: Uuid) -> Result<TaskRecord, TaskError> {
        self.reader
            .find_task(id)
            .await?
            .ok_or(TaskError::NotFound(id))
    }

    pub async fn create_task(
        &self,
        command: CreateTaskCommand,
    ) -> Result<Mutation<TaskRecord>, TaskError> {
        let task = NewTask::new(
            command.title,
            command.description,
            command.status,
            command.assignee,
            command.comments,
        )?;

        let created = self
            .writer
            .create_task(CreateTaskParams {
                id: Uuid::new_v4(),
                task,
            })
            .await?;
        info!(target = SOURCE, task_id = %created.id, "task created");

        let effects = self
            .propagate(ChangeEvent::Created {
                task: created.clone(),
            })
            .await;

        Ok(Mutation {
            value: created,
            effects,
        })
    }

    pub async fn update_task(
        &self,
        command: UpdateTaskCommand,
    ) -> Result<Mutation<TaskRecord>, TaskError> {
        let id = command.id;
        let changes = TaskChanges::new(
            command.title,
            command.description,
            command.status,
            command.assignee,
            command.comments,
        )?;

        let updated = self
            .writer
            .update_task(UpdateTaskParams { id, changes })
            .await
            .map_err(|err| not_found_as(err, id))?;
        info!(target = SOURCE, task_id = %id, "task updated");

        let effects = self
            .propagate(ChangeEvent::Updated {
                task: updated.clone(),
            })
            .await;

        Ok(Mutation {
            value: updated,
            effects,
        })
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<Mutation<()>, TaskError> {
        self.writer
            .delete_task(id)
            .await
            .map_err(|err| not_found_as(err, id))?;
        info!(target = SOURCE, task_id = %id, "task deleted");

        let effects = self.propagate(ChangeEvent::Deleted { task_id: id }).await;

        Ok(Mutation { value: (), effects })
    }

    async fn propagate(&self, event: ChangeEvent) -> SideEffects {
        let key = CacheKey::AllTasks.as_str();
        let invalidation = self.cache.invalidate(key).await;
        if let Err(err) = &invalidation {
            warn!(
                target = SOURCE,
                key,
                task_id = %event.task_id(),
                error = %err,
                "cache invalidation failed; readers may see stale data until expiry"
            );
        }

        let publish = self.publisher.publish(&self.channel, &event).await;
        if let Err(err) = &publish {
            warn!(
                target = SOURCE,
                channel = self.channel.as_str(),
                action = event.action(),
                task_id = %event.task_id(),
                error = %err,
                "failed to publish change event"
            );
        }

        SideEffects {
            invalidation,
            publish,
        }
    }
}

fn not_found_as(err: RepoError, id: Uuid) -> TaskError {
    match err {
        RepoError::NotFound => TaskError::NotFound(id),
        other => TaskError::Repo(other),
    }
}
