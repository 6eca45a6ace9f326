//! Error types for Elidune lending

use thiserror::Error;

/// PostgreSQL SQLSTATE for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL SQLSTATE for foreign key violations
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Broad classification of application errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Integrity,
    Database,
    Internal,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} with id {id} not found")]
    NotFound { kind: &'static str, id: i32 },

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A persisted row references an entity that no longer exists,
    /// or cannot be turned back into an entity.
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(kind: &'static str, id: i32) -> Self {
        AppError::NotFound { kind, id }
    }

    /// "Author 3 not found for book 7"
    pub fn missing_reference(kind: &'static str, id: i32, owner: &str, owner_id: Option<i32>) -> Self {
        let owner_id = owner_id.map(|id| id.to_string()).unwrap_or_else(|| "?".to_string());
        AppError::Integrity(format!("{} {} not found for {} {}", kind, id, owner, owner_id))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::Integrity(_) => ErrorKind::Integrity,
            AppError::Database(_) => ErrorKind::Database,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let code = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code.to_string());
        let constraint = err
            .as_database_error()
            .and_then(|db| db.constraint())
            .unwrap_or("constraint")
            .to_string();

        match code.as_deref() {
            Some(UNIQUE_VIOLATION) => {
                AppError::Conflict(format!("Duplicate value violates {}", constraint))
            }
            Some(FOREIGN_KEY_VIOLATION) => {
                AppError::Integrity(format!("Referenced row missing ({})", constraint))
            }
            _ => AppError::Database(err),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match e.message {
                    Some(ref msg) => msg.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        messages.sort();
        AppError::Validation(messages.join(", "))
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
