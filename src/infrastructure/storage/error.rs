//! Translation of driver failures into the domain taxonomy

use sqlx::error::DatabaseError;

use crate::domain::{DomainError, ErrorKind};

/// SQLSTATE raised when the server cancels a statement, including on `statement_timeout`
pub const QUERY_CANCELED: &str = "57014";

/// Map a SQLSTATE code to the taxonomy, `None` for codes left as internal failures.
///
/// Integrity constraint violations are class `23`.
pub fn classify_sqlstate(code: &str) -> Option<ErrorKind> {
    match code {
        "23000" | "23001" | "23502" | "23503" | "23514" | "23P01" => Some(ErrorKind::BadInput),
        "23505" => Some(ErrorKind::NotUnique),
        _ => None,
    }
}

fn describe(err: &dyn DatabaseError) -> String {
    match err.constraint() {
        Some(constraint) => format!("{} (constraint {})", err.message(), constraint),
        None => err.message().to_string(),
    }
}

/// Classify a driver error.
///
/// An empty result becomes `NotFound`, constraint violations become `BadInput`
/// or `NotUnique`, a server-side cancellation becomes `Cancelled`, and everything
/// else is `Internal` with the driver error kept as the source.
pub fn translate(err: sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::RowNotFound => DomainError::not_found("no rows in result set"),
        sqlx::Error::Database(db) if db.code().as_deref() == Some(QUERY_CANCELED) => {
            DomainError::Cancelled
        }
        sqlx::Error::Database(db) => {
            let kind = db.code().as_deref().and_then(classify_sqlstate);
            match kind {
                Some(ErrorKind::BadInput) => DomainError::bad_input(describe(db.as_ref())),
                Some(ErrorKind::NotUnique) => DomainError::not_unique(describe(db.as_ref())),
                _ => DomainError::internal_with_source("database error", sqlx::Error::Database(db)),
            }
        }
        other => DomainError::internal_with_source("database error", other),
    }
}
