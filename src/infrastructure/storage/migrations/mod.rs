//! Database migrations infrastructure

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::Executor;
use tracing::info;

use super::error::translate;
use crate::domain::{DomainError, ResultExt};

/// Trait for running database migrations
#[async_trait]
pub trait Migrator: Send + Sync {
    /// Runs all pending migrations, returning how many were applied
    async fn run(&self) -> Result<usize, DomainError>;

    /// Returns the current migration version
    async fn version(&self) -> Result<Option<i64>, DomainError>;
}

/// Applies versioned schema changes and records them in `_migrations`
#[derive(Debug)]
pub struct PostgresMigrator {
    pool: PgPool,
    migrations: Vec<Migration>,
}

impl PostgresMigrator {
    pub fn new(pool: PgPool) -> Self {
        Self::with_migrations(pool, users_migrations())
    }

    pub fn with_migrations(pool: PgPool, migrations: Vec<Migration>) -> Self {
        Self { pool, migrations }
    }

    /// Creates the migrations table if it doesn't exist
    async fn ensure_migrations_table(&self) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(translate)
        .context("create migrations table")?;

        Ok(())
    }

    /// Applies a single migration unless it is already recorded.
    ///
    /// The statements and the bookkeeping row commit together.
    pub async fn run_migration(&self, migration: &Migration) -> Result<bool, DomainError> {
        let applied: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM _migrations WHERE version = $1)")
                .bind(migration.version)
                .fetch_one(&self.pool)
                .await
                .map_err(translate)
                .context("check migration status")?;

        if applied {
            return Ok(false);
        }

        let failed = || format!("apply migration {}", migration.version);

        let mut tx = self.pool.begin().await.map_err(translate).with_context(failed)?;

        // A concrete connection type keeps the future `Send` inside `async_trait`
        let conn: &mut PgConnection = &mut tx;
        Executor::execute(&mut *conn, sqlx::raw_sql(migration.up))
            .await
            .map_err(translate)
            .with_context(failed)?;

        sqlx::query("INSERT INTO _migrations (version, description) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(migration.description)
            .execute(&mut *conn)
            .await
            .map_err(translate)
            .with_context(failed)?;

        tx.commit().await.map_err(translate).with_context(failed)?;

        info!(
            version = migration.version,
            description = migration.description,
            "Applied migration"
        );

        Ok(true)
    }
}

#[async_trait]
impl Migrator for PostgresMigrator {
    async fn run(&self) -> Result<usize, DomainError> {
        self.ensure_migrations_table().await?;

        let mut applied = 0;
        for migration in &self.migrations {
            if self.run_migration(migration).await? {
                applied += 1;
            }
        }

        Ok(applied)
    }

    async fn version(&self) -> Result<Option<i64>, DomainError> {
        self.ensure_migrations_table().await?;

        sqlx::query_scalar("SELECT MAX(version) FROM _migrations")
            .fetch_one(&self.pool)
            .await
            .map_err(translate)
            .context("read migration version")
    }
}

/// Represents a database migration
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Applied in ascending order
    pub version: i64,
    pub description: &'static str,
    /// One or more statements, run as a simple query
    pub up: &'static str,
}

impl Migration {
    pub const fn new(version: i64, description: &'static str, up: &'static str) -> Self {
        Self {
            version,
            description,
            up,
        }
    }
}

/// Schema for the user store
pub fn users_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "Enable pgcrypto",
            "CREATE EXTENSION IF NOT EXISTS pgcrypto",
        ),
        Migration::new(
            2,
            "Create users table",
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY DEFAULT gen_random_uuid()::text,
                first_name VARCHAR(50) NOT NULL,
                last_name VARCHAR(50) NOT NULL,
                nickname VARCHAR(30) NOT NULL,
                email VARCHAR(254) NOT NULL,
                country VARCHAR(2) NOT NULL,
                password TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT users_email_key UNIQUE (email),
                CONSTRAINT users_nickname_key UNIQUE (nickname),
                CONSTRAINT users_country_check CHECK (char_length(country) <= 2)
            );
            CREATE INDEX IF NOT EXISTS idx_users_created_at ON users (created_at, id);
            "#,
        ),
    ]
}

/// Applies every pending user store migration
pub async fn run_storage_migrations(pool: &PgPool) -> Result<usize, DomainError> {
    let migrator = PostgresMigrator::new(pool.clone());
    let applied = migrator.run().await?;

    info!(applied, "Storage migrations complete");
    Ok(applied)
}
