//! Request, response, and error types shared by the HTTP handlers

pub mod error;
pub mod json;
pub mod user;

pub use error::{ApiError, ApiErrorResponse, ApiErrorType};
pub use json::Json;
pub use user::{CreateUserRequest, CreatedUserResponse, ListUsersQuery, UpdateUserRequest, UserResponse};
