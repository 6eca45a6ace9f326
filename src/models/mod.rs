//! Domain models for Elidune lending
//!
//! Entities own their invariants: fields are private and change only through
//! validated setters or domain operations. Each entity has a flat `*Row`
//! counterpart holding foreign keys and epoch-millisecond timestamps.

pub mod author;
pub mod book;
pub mod loan;
pub mod member;

use chrono::{DateTime, TimeZone, Utc};
use validator::Validate;

use crate::error::{AppError, AppResult};

// Re-export commonly used types
pub use author::{Author, AuthorRow};
pub use book::{Book, BookKind, BookRow, EBookDetails};
pub use loan::{Loan, LoanRow, LoanStatus};
pub use member::{Member, MemberRow};

/// Field rules delegated to `validator`
#[derive(Debug, Default, Validate)]
struct FieldRules {
    #[validate(email(message = "Invalid email format"))]
    email: Option<String>,
    #[validate(length(min = 10, message = "ISBN must be at least 10 characters"))]
    isbn: Option<String>,
}

/// Trimmed, non-empty text field
pub(crate) fn required_text(field: &str, value: impl Into<String>) -> AppResult<String> {
    let value = value.into();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn valid_email(value: impl Into<String>) -> AppResult<String> {
    let value = value.into().trim().to_string();
    FieldRules {
        email: Some(value.clone()),
        ..Default::default()
    }
    .validate()?;
    Ok(value)
}

pub(crate) fn valid_isbn(value: impl Into<String>) -> AppResult<String> {
    let value = value.into().trim().to_string();
    FieldRules {
        isbn: Some(value.clone()),
        ..Default::default()
    }
    .validate()?;
    Ok(value)
}

/// Empty optional text collapses to `None`
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Timestamps are stored as epoch milliseconds
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> AppResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| AppError::Integrity(format!("Invalid timestamp {}", millis)))
}

/// Current time truncated to the store's millisecond resolution
pub(crate) fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    Utc.timestamp_millis_opt(now.timestamp_millis())
        .single()
        .unwrap_or(now)
}
