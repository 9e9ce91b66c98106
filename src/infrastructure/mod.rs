//! Infrastructure layer - PostgreSQL storage and service implementations

pub mod logging;
pub mod storage;
pub mod user;
