//! Migrate command - applies pending storage migrations

use tracing::info;

use crate::infrastructure::storage::{Migrator, Postgres, PostgresMigrator};

pub async fn run() -> anyhow::Result<()> {
    let config = super::bootstrap()?;

    let database = Postgres::connect(&config.storage).await?;
    let migrator = PostgresMigrator::new(database.pool().clone());

    let applied = migrator.run().await?;
    let version = migrator.version().await?;
    info!(applied, ?version, "Migrations complete");

    database.close().await;

    Ok(())
}
