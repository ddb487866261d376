use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{RepoError, UsersRepo};
use crate::cache::{CacheKey, ReadThroughCache};
use crate::domain::entities::UserRecord;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("user `{0}` not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UsersRepo>,
    cache: ReadThroughCache,
    list_ttl: Duration,
}

impl UserService {
    pub fn new(repo: Arc<dyn UsersRepo>, cache: ReadThroughCache, list_ttl: Duration) -> Self {
        Self {
            repo,
            cache,
            list_ttl,
        }
    }

    pub async fn list_users(&self) -> Result<Vec<UserRecord>, UserError> {
        self.cache
            .fetch(CacheKey::AllUsers.as_str(), self.list_ttl, || async {
                Ok::<_, UserError>(self.repo.list_users().await?)
            })
            .await
    }

    pub async fn find_user(&self, id: Uuid) -> Result<UserRecord, UserError> {
        self.repo.find_user(id).await?.ok_or(UserError::NotFound(id))
    }
}
