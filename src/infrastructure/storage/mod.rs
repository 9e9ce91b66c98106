//! Storage infrastructure - PostgreSQL pool, runners, and schema

mod error;
pub mod migrations;
mod postgres;
mod runner;

pub use error::{classify_sqlstate, translate};
pub use migrations::{run_storage_migrations, Migration, Migrator, PostgresMigrator};
pub use postgres::{PgTxRunner, PoolRunner, Postgres};
pub use runner::{PgQuery, Runner, Transactioner, TxRunner};

#[cfg(test)]
pub use runner::stub;
