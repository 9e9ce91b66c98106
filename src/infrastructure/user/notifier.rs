//! Notification sink that only records the event in the log

use async_trait::async_trait;
use tracing::debug;

use crate::domain::user::{UserNotification, UserNotifier};

/// Default notifier: nothing is delivered anywhere
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl UserNotifier for LoggingNotifier {
    async fn notify(&self, notification: UserNotification) {
        let changed: Vec<&str> = notification
            .changes
            .as_ref()
            .map(|changes| changes.fields().collect())
            .unwrap_or_default();

        debug!(
            event = ?notification.event,
            user_id = %notification.id,
            changed = ?changed,
            "User notification"
        );
    }
}
