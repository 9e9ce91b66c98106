//! API layer - HTTP endpoints for the user resource

pub mod health;
pub mod router;
pub mod state;
pub mod types;
pub mod users;

pub use router::create_router;
pub use state::{AppState, DatabaseHealth, UserServiceTrait};
