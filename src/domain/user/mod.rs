//! User domain
//!
//! This module provides the user entity and storage record, the validation
//! pipeline, change tracking for updates, and the notifier trait.

mod changes;
mod entity;
mod notifier;
mod validation;

pub use changes::{diff_fields, ChangeSet, FieldChange, TrackedField};
pub use entity::{Page, UserEntity, UserId, UserRecord};
pub use notifier::{UserEvent, UserNotification, UserNotifier};
pub use validation::{validate_user, Check, UserField, CREATE_FIELDS, UPDATE_FIELDS};

#[cfg(test)]
pub use notifier::MockUserNotifier;
