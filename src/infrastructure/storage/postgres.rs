//! PostgreSQL connection pool and statement runners

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use tracing::info;

use super::error::translate;
use super::runner::{PgQuery, Runner, Transactioner, TxRunner};
use crate::config::StorageConfig;
use crate::domain::{DomainError, ResultExt};

/// Connection pool handing out pooled and transactional runners
#[derive(Debug, Clone)]
pub struct Postgres {
    pool: PgPool,
}

impl Postgres {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build connection options from the configured `host:port` address
    pub fn connect_options(config: &StorageConfig) -> Result<PgConnectOptions, DomainError> {
        let (host, port) = config.host_port().ok_or_else(|| {
            DomainError::internal(format!("invalid storage address {:?}: expected host:port", config.addr))
        })?;

        Ok(PgConnectOptions::new()
            .host(host)
            .port(port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database))
    }

    /// Open the pool and verify the database answers
    pub async fn connect(config: &StorageConfig) -> Result<Self, DomainError> {
        let options = Self::connect_options(config)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect_with(options)
            .await
            .map_err(translate)
            .context("connect to postgres")?;

        let db = Self::new(pool);
        db.ping().await?;

        info!(
            addr = %config.addr,
            database = %config.database,
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );

        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), DomainError> {
        let mut run = self.runner();
        run.query_one(sqlx::query("SELECT 1"))
            .await
            .map(|_| ())
            .context("ping database")
    }

    /// Wait for checked-out connections to return and close the pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Transactioner for Postgres {
    async fn begin(&self) -> Result<Box<dyn TxRunner>, DomainError> {
        let tx = self.pool.begin().await.map_err(translate)?;
        Ok(Box::new(PgTxRunner { tx }))
    }

    fn runner(&self) -> Box<dyn Runner> {
        Box::new(PoolRunner {
            pool: self.pool.clone(),
        })
    }
}

/// Read exactly one row, consuming at most two
async fn single_row(
    mut rows: BoxStream<'_, Result<PgRow, sqlx::Error>>,
) -> Result<PgRow, DomainError> {
    let first = rows
        .try_next()
        .await
        .map_err(translate)?
        .ok_or_else(|| translate(sqlx::Error::RowNotFound))?;

    if rows.try_next().await.map_err(translate)?.is_some() {
        return Err(DomainError::internal("query returned more than one row"));
    }

    Ok(first)
}

/// Runs every statement on whichever pooled connection is free
#[derive(Debug)]
pub struct PoolRunner {
    pool: PgPool,
}

#[async_trait]
impl Runner for PoolRunner {
    async fn exec<'q>(&mut self, query: PgQuery<'q>) -> Result<u64, DomainError> {
        let result = query.execute(&self.pool).await.map_err(translate)?;
        Ok(result.rows_affected())
    }

    fn query_many<'r, 'q: 'r>(
        &'r mut self,
        query: PgQuery<'q>,
    ) -> BoxStream<'r, Result<PgRow, DomainError>> {
        query.fetch(&self.pool).map_err(translate).boxed()
    }

    async fn query_one<'q>(&mut self, query: PgQuery<'q>) -> Result<PgRow, DomainError> {
        single_row(query.fetch(&self.pool)).await
    }
}

/// Runs every statement inside one open transaction.
///
/// Dropping it without commit rolls the transaction back.
pub struct PgTxRunner {
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

impl std::fmt::Debug for PgTxRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTxRunner").finish_non_exhaustive()
    }
}

#[async_trait]
impl Runner for PgTxRunner {
    async fn exec<'q>(&mut self, query: PgQuery<'q>) -> Result<u64, DomainError> {
        let result = query.execute(&mut *self.tx).await.map_err(translate)?;
        Ok(result.rows_affected())
    }

    fn query_many<'r, 'q: 'r>(
        &'r mut self,
        query: PgQuery<'q>,
    ) -> BoxStream<'r, Result<PgRow, DomainError>> {
        query.fetch(&mut *self.tx).map_err(translate).boxed()
    }

    async fn query_one<'q>(&mut self, query: PgQuery<'q>) -> Result<PgRow, DomainError> {
        single_row(query.fetch(&mut *self.tx)).await
    }
}

#[async_trait]
impl TxRunner for PgTxRunner {
    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit().await.map_err(translate).context("commit")
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.rollback().await.map_err(translate).context("rollback")
    }

    async fn set_statement_timeout(&mut self, timeout: Duration) -> Result<(), DomainError> {
        // Zero would disable the timeout
        let millis = timeout.as_millis().max(1);
        let query = sqlx::query("SELECT set_config('statement_timeout', $1, true)")
            .bind(format!("{}ms", millis));

        self.exec(query).await.map(|_| ()).context("set statement timeout")
    }

    fn abort(self: Box<Self>) {
        // Dropping an open sqlx transaction queues its rollback on the connection
        drop(self);
    }

    fn as_runner(&mut self) -> &mut dyn Runner {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_options_from_addr() {
        let config = StorageConfig::new("db.local:6543")
            .with_credentials("app", "secret")
            .with_database("users");

        let options = Postgres::connect_options(&config).unwrap();
        assert_eq!(options.get_host(), "db.local");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_username(), "app");
        assert_eq!(options.get_database(), Some("users"));
    }

    #[test]
    fn test_connect_options_reject_malformed_addr() {
        for addr in ["db.local", "db.local:http", ":5432", ""] {
            let err = Postgres::connect_options(&StorageConfig::new(addr)).unwrap_err();
            assert!(err.to_string().contains("host:port"), "addr {:?}", addr);
        }
    }

    #[tokio::test]
    async fn test_connect_fails_fast_on_bad_addr() {
        let err = Postgres::connect(&StorageConfig::new("nowhere")).await.unwrap_err();
        assert_eq!(err.kind(), crate::domain::ErrorKind::Internal);
    }
}
