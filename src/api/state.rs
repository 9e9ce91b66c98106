//! Application state for shared services

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::{Cancellation, ChangeSet, DomainError, Page, UserEntity, UserId};
use crate::infrastructure::storage::Postgres;

/// Application state containing shared services using dynamic dispatch
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<dyn UserServiceTrait>,
    pub database: Arc<dyn DatabaseHealth>,
    shutdown: watch::Receiver<bool>,
    request_timeout: Duration,
}

/// Trait for user service operations
#[async_trait]
pub trait UserServiceTrait: Send + Sync {
    /// Validate and insert a user, returning its new identifier
    async fn create(&self, cancel: &Cancellation, user: UserEntity) -> Result<UserId, DomainError>;
    /// The user behind `id`, password always empty
    async fn get(&self, cancel: &Cancellation, id: &UserId) -> Result<UserEntity, DomainError>;
    /// Validate and overwrite a user, returning what changed
    async fn update(
        &self,
        cancel: &Cancellation,
        id: &UserId,
        user: UserEntity,
    ) -> Result<ChangeSet, DomainError>;
    async fn delete(&self, cancel: &Cancellation, id: &UserId) -> Result<(), DomainError>;
    async fn list(&self, cancel: &Cancellation, page: Page) -> Result<Vec<UserEntity>, DomainError>;
}

/// Trait for the readiness check's database check
#[async_trait]
pub trait DatabaseHealth: Send + Sync {
    async fn ping(&self) -> Result<(), DomainError>;
}

#[async_trait]
impl DatabaseHealth for Postgres {
    async fn ping(&self) -> Result<(), DomainError> {
        Postgres::ping(self).await
    }
}

impl AppState {
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// State whose requests are only bounded by the default timeout
    pub fn new(user_service: Arc<dyn UserServiceTrait>, database: Arc<dyn DatabaseHealth>) -> Self {
        let (_, shutdown) = watch::channel(false);

        Self {
            user_service,
            database,
            shutdown,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Cancel in-flight requests once `shutdown` flips to `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Signal for one request: server shutdown or the request deadline
    pub fn cancellation(&self) -> Cancellation {
        Cancellation::new(self.shutdown.clone()).with_timeout(self.request_timeout)
    }
}
