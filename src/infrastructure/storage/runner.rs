//! Execution abstraction shared by pooled and transactional statement runners

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::Postgres;

use crate::domain::DomainError;

/// A parameterised statement ready to be executed
pub type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Executes statements against the backing store.
///
/// Implemented once for the connection pool (every call is its own unit of work)
/// and once for an open transaction (every call joins the same unit of work).
/// Callers cannot tell which one they hold. Failures are already translated
/// into the domain taxonomy.
#[async_trait]
pub trait Runner: Send {
    /// Run a statement and return the number of affected rows
    async fn exec<'q>(&mut self, query: PgQuery<'q>) -> Result<u64, DomainError>;

    /// Run a statement and stream its rows; dropping the stream closes it
    fn query_many<'r, 'q: 'r>(
        &'r mut self,
        query: PgQuery<'q>,
    ) -> BoxStream<'r, Result<PgRow, DomainError>>;

    /// Run a statement that yields exactly one row.
    ///
    /// No row is `NotFound`; a second row is an internal error.
    async fn query_one<'q>(&mut self, query: PgQuery<'q>) -> Result<PgRow, DomainError>;
}

/// A runner bound to an explicitly begun transaction
#[async_trait]
pub trait TxRunner: Runner {
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;

    /// Have the server abort any later statement of this transaction that
    /// runs longer than `timeout`
    async fn set_statement_timeout(&mut self, timeout: Duration) -> Result<(), DomainError>;

    /// Give up on the transaction without waiting for the server.
    ///
    /// Nothing is committed; the rollback completes in the background once the
    /// connection is free again.
    fn abort(self: Box<Self>);

    fn as_runner(&mut self) -> &mut dyn Runner;
}

/// Hands out runners with or without an explicit transaction
#[async_trait]
pub trait Transactioner: Send + Sync {
    /// Begin a transaction; it stays open until committed or rolled back
    async fn begin(&self) -> Result<Box<dyn TxRunner>, DomainError>;

    /// A runner where each statement is its own implicit unit of work
    fn runner(&self) -> Box<dyn Runner>;
}
