//! User request and response bodies

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{Page, UserEntity, UserId};

/// Body of `POST /users`.
///
/// Missing fields decode as empty strings so that validation names them.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub email: String,
    pub country: String,
    pub password: String,
}

impl fmt::Debug for CreateUserRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUserRequest")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("nickname", &self.nickname)
            .field("email", &self.email)
            .field("country", &self.country)
            .finish_non_exhaustive()
    }
}

impl From<CreateUserRequest> for UserEntity {
    fn from(req: CreateUserRequest) -> Self {
        Self {
            first_name: req.first_name,
            last_name: req.last_name,
            nickname: req.nickname,
            email: req.email,
            country: req.country,
            password: req.password,
        }
    }
}

/// Body of `PUT /users/{id}`; the password cannot be changed here
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub email: String,
    pub country: String,
}

impl From<UpdateUserRequest> for UserEntity {
    fn from(req: UpdateUserRequest) -> Self {
        Self {
            first_name: req.first_name,
            last_name: req.last_name,
            nickname: req.nickname,
            email: req.email,
            country: req.country,
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedUserResponse {
    pub id: UserId,
}

/// A user as returned to clients, never with a password
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub email: String,
    pub country: String,
}

impl From<UserEntity> for UserResponse {
    fn from(entity: UserEntity) -> Self {
        Self {
            first_name: entity.first_name,
            last_name: entity.last_name,
            nickname: entity.nickname,
            email: entity.email,
            country: entity.country,
        }
    }
}

/// Query string of `GET /users`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListUsersQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListUsersQuery {
    pub fn page(&self) -> Page {
        Page::new(
            self.limit.unwrap_or(Page::DEFAULT_LIMIT),
            self.offset.unwrap_or(0),
        )
    }
}
