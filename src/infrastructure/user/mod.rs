//! User infrastructure module
//!
//! This module provides the user store trait and its PostgreSQL implementation, the user service that
//! scopes transactions around it, and the default notification sink.

mod notifier;
mod postgres_store;
mod service;
mod store;

pub use notifier::LoggingNotifier;
pub use postgres_store::PostgresUserStore;
pub use service::UserService;
pub use store::UserStore;

#[cfg(test)]
pub use store::fake::{FakeUserStore, StoreCall};
