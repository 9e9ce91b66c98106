//! User entity, storage record, and related types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque user identifier assigned by the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Service-facing view of a user.
///
/// `password` is only meaningful on create; it is always empty when read back.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UserEntity {
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub email: String,
    pub country: String,
    pub password: String,
}

impl fmt::Debug for UserEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserEntity")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("nickname", &self.nickname)
            .field("email", &self.email)
            .field("country", &self.country)
            .finish_non_exhaustive()
    }
}

/// Storage-facing user row
#[derive(Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Absent until the store assigns one
    pub id: Option<UserId>,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub email: String,
    pub country: String,
    /// Plaintext handed to the store for hashing on insert; never read back
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Build a record from an entity, leaving the password out
    pub fn from_entity(entity: &UserEntity, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            first_name: entity.first_name.clone(),
            last_name: entity.last_name.clone(),
            nickname: entity.nickname.clone(),
            email: entity.email.clone(),
            country: entity.country.clone(),
            password: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a record for insertion, carrying the plaintext password to the store
    pub fn for_insert(entity: &UserEntity, now: DateTime<Utc>) -> Self {
        Self {
            password: Some(entity.password.clone()),
            ..Self::from_entity(entity, now)
        }
    }
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("nickname", &self.nickname)
            .field("email", &self.email)
            .field("country", &self.country)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

impl From<UserRecord> for UserEntity {
    fn from(record: UserRecord) -> Self {
        Self {
            first_name: record.first_name,
            last_name: record.last_name,
            nickname: record.nickname,
            email: record.email,
            country: record.country,
            password: String::new(),
        }
    }
}

/// Window over the user listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    limit: u32,
    offset: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 100;

    /// Limits outside `1..=MAX_LIMIT` are clamped
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT, 0)
    }
}
