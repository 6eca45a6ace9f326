//! Loan model: one book lent to one member
//!
//! A loan is `Active` until it is returned, and `Returned` afterwards. While
//! active it is `Overdue` whenever the current time is past the due date; that
//! state is never stored, it is recomputed against the clock on every call.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use super::{book::Book, from_millis, member::Member, now_millis, to_millis};
use crate::error::{AppError, AppResult};

/// Default loan duration in days
pub const DEFAULT_LOAN_DAYS: i64 = 14;

/// Default fine per started day past the due date
pub const DEFAULT_DAILY_FINE: Decimal = Decimal::from_parts(50, 0, 0, false, 2);

/// Loan row as persisted in the `loans` table
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LoanRow {
    pub id: Option<i32>,
    pub book_id: i32,
    pub member_id: i32,
    pub loan_date: i64,
    pub due_date: i64,
    pub return_date: Option<i64>,
}

/// Loan status as seen at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Overdue { fine: Decimal },
    Returned,
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoanStatus::Active => f.write_str("Active"),
            LoanStatus::Overdue { fine } => write!(f, "Overdue (${:.2} fine)", fine),
            LoanStatus::Returned => f.write_str("Returned"),
        }
    }
}

/// Loan entity, carrying its book and member by value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Loan {
    id: Option<i32>,
    book: Book,
    member: Member,
    loan_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
}

impl Loan {
    /// Create a transient loan; without an explicit due date the loan runs
    /// for [`DEFAULT_LOAN_DAYS`].
    pub fn new(
        book: Book,
        member: Member,
        loan_date: DateTime<Utc>,
        due_date: Option<DateTime<Utc>>,
    ) -> Self {
        let due_date = due_date.unwrap_or_else(|| loan_date + Duration::days(DEFAULT_LOAN_DAYS));
        Self {
            id: None,
            book,
            member,
            loan_date,
            due_date,
            return_date: None,
        }
    }

    pub fn id(&self) -> Option<i32> {
        self.id
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn member(&self) -> &Member {
        &self.member
    }

    pub fn loan_date(&self) -> DateTime<Utc> {
        self.loan_date
    }

    pub fn due_date(&self) -> DateTime<Utc> {
        self.due_date
    }

    pub fn return_date(&self) -> Option<DateTime<Utc>> {
        self.return_date
    }

    pub fn is_returned(&self) -> bool {
        self.return_date.is_some()
    }

    pub fn is_active(&self) -> bool {
        !self.is_returned()
    }

    pub fn is_overdue(&self) -> bool {
        self.is_overdue_at(Utc::now())
    }

    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_returned() && now > self.due_date
    }

    /// Close the loan now and put the book back on the shelf
    pub fn return_book(&mut self) -> AppResult<()> {
        self.return_book_at(now_millis())
    }

    pub fn return_book_at(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if let Some(returned) = self.return_date {
            return Err(AppError::Conflict(format!(
                "Loan {} has already been returned on {}",
                self.id.map(|id| id.to_string()).unwrap_or_else(|| "(unsaved)".to_string()),
                returned.format("%Y-%m-%d")
            )));
        }
        self.return_date = Some(now);
        self.book.mark_returned();
        Ok(())
    }

    pub fn calculate_fine(&self, daily_rate: Decimal) -> AppResult<Decimal> {
        self.calculate_fine_at(daily_rate, Utc::now())
    }

    /// Every started day past the due date is charged in full
    pub fn calculate_fine_at(&self, daily_rate: Decimal, now: DateTime<Utc>) -> AppResult<Decimal> {
        Decimal::from(self.days_overdue_at(now))
            .checked_mul(daily_rate)
            .ok_or_else(|| {
                AppError::Validation(format!("Daily fine {} is out of range", daily_rate))
            })
    }

    /// Started days past the due date, 0 when not overdue
    pub fn days_overdue_at(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_overdue_at(now) {
            return 0;
        }
        let elapsed = now - self.due_date;
        let days = elapsed.num_days();
        if elapsed > Duration::days(days) {
            days + 1
        } else {
            days
        }
    }

    pub fn status(&self) -> LoanStatus {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> LoanStatus {
        if self.is_returned() {
            LoanStatus::Returned
        } else if self.is_overdue_at(now) {
            // Cannot overflow: at most i64::MAX days at 0.50
            let days = Decimal::from(self.days_overdue_at(now));
            LoanStatus::Overdue {
                fine: days * DEFAULT_DAILY_FINE,
            }
        } else {
            LoanStatus::Active
        }
    }

    pub fn to_row(&self) -> AppResult<LoanRow> {
        let book_id = self.book.id().ok_or_else(|| {
            AppError::Validation("Book must be saved before it can be lent".to_string())
        })?;
        let member_id = self.member.id().ok_or_else(|| {
            AppError::Validation("Member must be saved before borrowing".to_string())
        })?;

        Ok(LoanRow {
            id: self.id,
            book_id,
            member_id,
            loan_date: to_millis(self.loan_date),
            due_date: to_millis(self.due_date),
            return_date: self.return_date.map(to_millis),
        })
    }

    /// Rebuild a loan from its row and its already hydrated book and member
    pub fn from_row(row: LoanRow, book: Book, member: Member) -> AppResult<Self> {
        if book.id() != Some(row.book_id) || member.id() != Some(row.member_id) {
            return Err(AppError::Integrity(format!(
                "Loan {:?} was hydrated with mismatching book or member",
                row.id
            )));
        }

        Ok(Self {
            id: row.id,
            book,
            member,
            loan_date: from_millis(row.loan_date)?,
            due_date: from_millis(row.due_date)?,
            return_date: row.return_date.map(from_millis).transpose()?,
        })
    }
}
