//! Repository Module
//!
//! CRUD and guarded-update operations over the SQLite pool. Functions
//! are free async fns taking `&SqlitePool` (or a transaction
//! connection for multi-statement units) and returning [`RepoResult`].

// Loyalty cards
pub mod card;
pub mod code;
pub mod template;

// Points
pub mod eligibility;
pub mod ledger;
pub mod rule;

use thiserror::Error;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepoError::Duplicate(db.to_string())
            }
            _ => RepoError::Database(err.to_string()),
        }
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;
