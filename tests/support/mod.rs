//! In-memory repositories and service wiring shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use taskflow::application::repos::{
    CreateTaskParams, RepoError, TasksRepo, TasksWriteRepo, UpdateTaskParams, UsersRepo,
};
use taskflow::application::tasks::TaskService;
use taskflow::application::users::UserService;
use taskflow::cache::{MemoryCacheBackend, ReadThroughCache};
use taskflow::domain::entities::{TaskRecord, UserRecord};
use taskflow::domain::types::UserRole;
use taskflow::events::{EventPublisher, MemoryBus};

pub const CHANNEL: &str = "task-updates";
pub const LIST_TTL: Duration = Duration::from_secs(60);

#[derive(Default)]
pub struct InMemoryTasks {
    tasks: Mutex<BTreeMap<Uuid, TaskRecord>>,
    list_calls: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InMemoryTasks {
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn stored(&self, id: Uuid) -> Option<TaskRecord> {
        self.tasks.lock().await.get(&id).cloned()
    }

    fn check_writable(&self) -> Result<(), RepoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("database is read-only".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TasksRepo for InMemoryTasks {
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, RepoError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tasks.lock().await.values().cloned().collect())
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<TaskRecord>, RepoError> {
        Ok(self.tasks.lock().await.get(&id).cloned())
    }
}

#[async_trait]
impl TasksWriteRepo for InMemoryTasks {
    async fn create_task(&self, params: CreateTaskParams) -> Result<TaskRecord, RepoError> {
        self.check_writable()?;
        let record = params.task.into_record(params.id);
        self.tasks.lock().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_task(&self, params: UpdateTaskParams) -> Result<TaskRecord, RepoError> {
        self.check_writable()?;
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        params.changes.apply_to(task);
        Ok(task.clone())
    }

    async fn delete_task(&self, id: Uuid) -> Result<(), RepoError> {
        self.check_writable()?;
        self.tasks
            .lock()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

#[derive(Default)]
pub struct InMemoryUsers {
    users: Mutex<Vec<UserRecord>>,
    list_calls: AtomicUsize,
}

impl InMemoryUsers {
    pub async fn add(&self, email: &str, role: UserRole) -> UserRecord {
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        self.users.lock().await.push(user.clone());
        user
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsersRepo for InMemoryUsers {
    async fn list_users(&self) -> Result<Vec<UserRecord>, RepoError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.users.lock().await.clone())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .users
            .lock()
            .await
            .iter()
            .find(|user| user.id == id)
            .cloned())
    }
}

/// A task service over in-memory repositories, cache and bus.
pub struct TaskHarness {
    pub repo: Arc<InMemoryTasks>,
    pub backend: Arc<MemoryCacheBackend>,
    pub bus: MemoryBus,
    pub service: TaskService,
}

impl TaskHarness {
    pub fn new() -> Self {
        Self::with_bus(MemoryBus::recording())
    }

    pub fn with_bus(bus: MemoryBus) -> Self {
        let repo = Arc::new(InMemoryTasks::default());
        let backend = Arc::new(MemoryCacheBackend::new());
        let publisher = Arc::new(EventPublisher::new(Arc::new(bus.clone())));
        let service = TaskService::new(
            repo.clone(),
            repo.clone(),
            ReadThroughCache::new(backend.clone()),
            publisher,
            CHANNEL,
            LIST_TTL,
        );

        Self {
            repo,
            backend,
            bus,
            service,
        }
    }

    /// Decoded change events published so far.
    pub fn published(&self) -> Vec<serde_json::Value> {
        self.bus
            .published_on(CHANNEL)
            .iter()
            .map(|payload| serde_json::from_str(payload).expect("published payload is JSON"))
            .collect()
    }
}

pub struct UserHarness {
    pub repo: Arc<InMemoryUsers>,
    pub backend: Arc<MemoryCacheBackend>,
    pub service: UserService,
}

impl UserHarness {
    pub fn new() -> Self {
        let repo = Arc::new(InMemoryUsers::default());
        let backend = Arc::new(MemoryCacheBackend::new());
        let service = UserService::new(
            repo.clone(),
            ReadThroughCache::new(backend.clone()),
            Duration::from_secs(300),
        );
        Self {
            repo,
            backend,
            service,
        }
    }
}
