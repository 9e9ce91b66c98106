use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Classification every failure reduces to, regardless of how deeply it was wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadInput,
    NotUnique,
    NotFound,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadInput => write!(f, "bad input"),
            Self::NotUnique => write!(f, "not unique"),
            Self::NotFound => write!(f, "not found"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Bad input: {message}")]
    BadInput { message: String },

    #[error("Not unique: {message}")]
    NotUnique { message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<DomainError>,
    },
}

impl DomainError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::BadInput {
            message: message.into(),
        }
    }

    pub fn not_unique(message: impl Into<String>) -> Self {
        Self::NotUnique {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap the error with a short description of the operation that failed.
    ///
    /// The classification of the wrapped error is preserved.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Taxonomy membership, resolved through any number of context layers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::BadInput { .. } => ErrorKind::BadInput,
            Self::NotUnique { .. } => ErrorKind::NotUnique,
            Self::Validation(err) => err.cause,
            Self::Internal { .. } | Self::Cancelled => ErrorKind::Internal,
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// The innermost error, with all context layers peeled off
    pub fn root(&self) -> &DomainError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Validation details if this error (or what it wraps) is a validation failure
    pub fn validation(&self) -> Option<&ValidationError> {
        match self.root() {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_bad_input(&self) -> bool {
        self.kind() == ErrorKind::BadInput
    }

    pub fn is_not_unique(&self) -> bool {
        self.kind() == ErrorKind::NotUnique
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }
}

/// Adds operation context to fallible results
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T, DomainError>;

    fn with_context<C, F>(self, f: F) -> Result<T, DomainError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> ResultExt<T> for Result<T, DomainError> {
    fn context(self, context: impl Into<String>) -> Result<T, DomainError> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T, DomainError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.context(f()))
    }
}

/// Input rejected before it reached the store.
///
/// Only the first offending field is reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    pub cause: ErrorKind,
    pub details: BTreeMap<String, String>,
}

impl ValidationError {
    pub fn field(field: impl Into<String>, violation: impl Into<String>) -> Self {
        let mut details = BTreeMap::new();
        details.insert(field.into(), violation.into());

        Self {
            cause: ErrorKind::BadInput,
            details,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = serde_json::json!({
            "cause": self.cause.to_string(),
            "details": self.details,
        });
        write!(f, "{}", body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let error = DomainError::not_found("no rows");
        assert_eq!(error.to_string(), "Not found: no rows");
        assert!(error.is_not_found());
    }

    #[test]
    fn test_context_preserves_kind() {
        let error = DomainError::not_unique("users_email_key")
            .context("query single")
            .context("persist user");

        assert_eq!(error.kind(), ErrorKind::NotUnique);
        assert!(error.is_not_unique());
        assert_eq!(
            error.to_string(),
            "persist user: query single: Not unique: users_email_key"
        );
    }

    #[test]
    fn test_context_exposes_source_chain() {
        use std::error::Error;

        let error = DomainError::not_found("gone").context("delete user \"42\"");
        let source = error.source().unwrap();
        assert_eq!(source.to_string(), "Not found: gone");
    }

    #[test]
    fn test_validation_classifies_as_bad_input() {
        let error: DomainError = ValidationError::field("Email", "invalid format").into();
        assert!(error.is_bad_input());

        let details = &error.validation().unwrap().details;
        assert_eq!(details.len(), 1);
        assert_eq!(details.get("Email").map(String::as_str), Some("invalid format"));
    }

    #[test]
    fn test_validation_display_is_json() {
        let error = ValidationError::field("Nickname", "exceeds max length: 30");
        let rendered: serde_json::Value = serde_json::from_str(&error.to_string()).unwrap();

        assert_eq!(rendered["cause"], "bad input");
        assert_eq!(rendered["details"]["Nickname"], "exceeds max length: 30");
    }

    #[test]
    fn test_cancelled_is_internal() {
        let error = DomainError::Cancelled.context("update user \"1\"");
        assert_eq!(error.kind(), ErrorKind::Internal);
        assert!(error.is_cancelled());
    }

    #[test]
    fn test_result_ext_context() {
        let result: Result<(), DomainError> = Err(DomainError::bad_input("check violation"));
        let error = result.with_context(|| format!("update user {:?}", "abc")).unwrap_err();

        assert!(error.is_bad_input());
        assert!(error.to_string().starts_with("update user \"abc\": "));
    }
}
