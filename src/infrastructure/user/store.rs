//! User record store trait

use async_trait::async_trait;

use crate::domain::user::{Page, UserId, UserRecord};
use crate::domain::DomainError;
use crate::infrastructure::storage::Runner;

/// Persistence for user records.
///
/// Every operation runs on the runner it is given, so the caller decides
/// whether it joins a transaction. Failures arrive already classified.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert the record and return the identifier the store generated.
    ///
    /// The password is hashed by the store itself. Fails `NotUnique` when the
    /// email or nickname is taken.
    async fn persist(&self, run: &mut dyn Runner, user: &UserRecord) -> Result<UserId, DomainError>;

    /// Read a record. With `for_update` the row stays locked until the
    /// enclosing transaction ends. Fails `NotFound` for an unknown id.
    async fn retrieve(
        &self,
        run: &mut dyn Runner,
        id: &UserId,
        for_update: bool,
    ) -> Result<UserRecord, DomainError>;

    /// Overwrite the mutable fields and `updated_at`, returning the values held
    /// before the write. Fails `NotFound` for an unknown id.
    async fn update(
        &self,
        run: &mut dyn Runner,
        id: &UserId,
        user: &UserRecord,
    ) -> Result<UserRecord, DomainError>;

    /// Remove exactly one record. Fails `NotFound` for an unknown id.
    async fn delete(&self, run: &mut dyn Runner, id: &UserId) -> Result<(), DomainError>;

    /// Records ordered by creation time
    async fn list(&self, run: &mut dyn Runner, page: Page) -> Result<Vec<UserRecord>, DomainError>;
}
