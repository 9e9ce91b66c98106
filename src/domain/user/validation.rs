//! Field checks applied before anything touches the store

use std::fmt;

use validator::ValidateEmail;

use super::entity::UserEntity;
use crate::domain::ValidationError;

const MAX_FIRST_NAME_LENGTH: usize = 50;
const MAX_LAST_NAME_LENGTH: usize = 50;
const MAX_NICKNAME_LENGTH: usize = 30;
const MAX_PASSWORD_LENGTH: usize = 20;
const MAX_COUNTRY_LENGTH: usize = 2;

const MIN_EMAIL_LENGTH: usize = 6;
const MAX_EMAIL_LENGTH: usize = 254;

/// A validated property of [`UserEntity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    FirstName,
    LastName,
    Nickname,
    Email,
    Country,
    Password,
}

/// Fields checked on create, in order
pub const CREATE_FIELDS: &[UserField] = &[
    UserField::FirstName,
    UserField::LastName,
    UserField::Nickname,
    UserField::Email,
    UserField::Country,
    UserField::Password,
];

/// Fields checked on update, in order
pub const UPDATE_FIELDS: &[UserField] = &[
    UserField::FirstName,
    UserField::LastName,
    UserField::Nickname,
    UserField::Email,
    UserField::Country,
];

/// The single check a field is subject to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// Not blank after trimming, at most `n` characters
    NonBlankMaxLen(usize),
    /// Syntactically valid email address, no DNS lookup
    EmailFormat,
}

impl UserField {
    pub fn name(self) -> &'static str {
        match self {
            Self::FirstName => "FirstName",
            Self::LastName => "LastName",
            Self::Nickname => "Nickname",
            Self::Email => "Email",
            Self::Country => "Country",
            Self::Password => "Password",
        }
    }

    pub fn check(self) -> Check {
        match self {
            Self::FirstName => Check::NonBlankMaxLen(MAX_FIRST_NAME_LENGTH),
            Self::LastName => Check::NonBlankMaxLen(MAX_LAST_NAME_LENGTH),
            Self::Nickname => Check::NonBlankMaxLen(MAX_NICKNAME_LENGTH),
            Self::Email => Check::EmailFormat,
            Self::Country => Check::NonBlankMaxLen(MAX_COUNTRY_LENGTH),
            Self::Password => Check::NonBlankMaxLen(MAX_PASSWORD_LENGTH),
        }
    }

    fn value(self, user: &UserEntity) -> &str {
        match self {
            Self::FirstName => &user.first_name,
            Self::LastName => &user.last_name,
            Self::Nickname => &user.nickname,
            Self::Email => &user.email,
            Self::Country => &user.country,
            Self::Password => &user.password,
        }
    }
}

impl fmt::Display for UserField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Check {
    /// Violation description, if any
    pub fn violation(self, value: &str) -> Option<String> {
        match self {
            Self::NonBlankMaxLen(max) => {
                if value.trim().is_empty() {
                    return Some("blank or empty".to_string());
                }
                if value.chars().count() > max {
                    return Some(format!("exceeds max length: {}", max));
                }
                None
            }
            Self::EmailFormat => (!is_email(value)).then(|| "invalid format".to_string()),
        }
    }
}

/// Fast-mode email check: syntax only, and the host must be dotted.
///
/// Dots in the local part may not lead, trail, or repeat.
fn is_email(value: &str) -> bool {
    if value.len() < MIN_EMAIL_LENGTH || value.len() > MAX_EMAIL_LENGTH {
        return false;
    }

    let Some((user, host)) = value.rsplit_once('@') else {
        return false;
    };

    if user.starts_with('.') || user.ends_with('.') || user.contains("..") {
        return false;
    }

    let dotted = host
        .split_once('.')
        .is_some_and(|(head, tail)| !head.is_empty() && !tail.is_empty());

    dotted && value.validate_email()
}

/// Run the checks for `fields` in order and stop at the first failure
pub fn validate_user(user: &UserEntity, fields: &[UserField]) -> Result<(), ValidationError> {
    for field in fields {
        if let Some(violation) = field.check().violation(field.value(user)) {
            return Err(ValidationError::field(field.name(), violation));
        }
    }

    Ok(())
}
