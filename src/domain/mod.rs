//! Domain layer - Core business logic and entities

pub mod cancel;
pub mod error;
pub mod user;

pub use cancel::Cancellation;
pub use error::{DomainError, ErrorKind, ResultExt, ValidationError};
pub use user::{
    validate_user, ChangeSet, Page, UserEntity, UserId, UserNotification, UserNotifier,
    UserRecord,
};
