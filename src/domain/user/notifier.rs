//! Notification hook invoked after a user mutation commits

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;

use super::changes::ChangeSet;
use super::entity::UserId;

/// Kind of mutation that happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserEvent {
    Created,
    Updated,
    Deleted,
}

/// What a notifier is told about a committed mutation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserNotification {
    pub event: UserEvent,
    pub id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeSet>,
}

/// Receives notifications about user mutations.
///
/// Called once per committed mutation, after the commit, never inside a transaction.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserNotifier: Send + Sync {
    async fn notify(&self, notification: UserNotification);
}
