//! Users Service
//!
//! Transactional create, read, update, and delete of user records in
//! PostgreSQL, exposed over HTTP.

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use api::state::AppState;
use infrastructure::storage::{run_storage_migrations, Postgres};
use infrastructure::user::{PostgresUserStore, UserService};
use tokio::sync::watch;

/// Connect to the database and wire the services behind the HTTP state.
///
/// Returns the pool handle alongside the state so the caller can close it
/// after the server stops.
pub async fn create_app_state_with_config(
    config: &AppConfig,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<(AppState, Postgres)> {
    let database = Postgres::connect(&config.storage).await?;

    if config.storage.run_migrations {
        run_storage_migrations(database.pool()).await?;
    }

    let user_service = UserService::new(Arc::new(database.clone()), Arc::new(PostgresUserStore::new()));

    let state = AppState::new(Arc::new(user_service), Arc::new(database.clone()))
        .with_shutdown(shutdown)
        .with_request_timeout(config.server.request_timeout());

    Ok((state, database))
}
