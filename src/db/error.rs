//! Typed storage errors.
//!
//! Constraint violations are translated here so callers never inspect
//! engine-specific error codes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email is already registered")]
    DuplicateEmail,

    #[error("a book with this ISBN already exists")]
    DuplicateIsbn,

    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Whether a sqlx error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
