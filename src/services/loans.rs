//! Loan management service
//!
//! Borrowing and returning touch two rows (the book's availability and the
//! loan), so both run inside one store transaction. The availability switch is
//! a compare-and-set: of two concurrent borrows of one book, only the first
//! sees it available.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::{
    config::LoanPolicy,
    error::{AppError, AppResult},
    models::{now_millis, Loan},
    repository::{EntityRepository, Repository},
    store::{finish, Tables},
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    policy: LoanPolicy,
}

impl LoansService {
    pub fn new(repository: Repository, policy: LoanPolicy) -> Self {
        Self { repository, policy }
    }

    pub fn policy(&self) -> &LoanPolicy {
        &self.policy
    }

    /// Lend a book to a member, starting now
    pub async fn borrow_book(&self, book_id: i32, member_id: i32) -> AppResult<Loan> {
        self.borrow_book_on(book_id, member_id, now_millis()).await
    }

    /// Lend a book with an explicit loan date (back-dated entries)
    pub async fn borrow_book_on(
        &self,
        book_id: i32,
        member_id: i32,
        loan_date: DateTime<Utc>,
    ) -> AppResult<Loan> {
        let mut book = self.repository.books.get_by_id(book_id).await?;
        let member = self.repository.members.get_by_id(member_id).await?;

        // Fails on an unavailable book before anything is written
        book.borrow()?;
        let due_date = self.policy.due_date_for(loan_date)?;
        let loan = Loan::new(book, member, loan_date, Some(due_date));

        let tx = self.repository.begin().await?;
        let outcome = self.persist_borrow(tx.tables(), book_id, &loan).await;
        let loan = finish(tx, outcome).await?;

        info!(
            "Book {} lent to member {} (loan {:?}, due {})",
            book_id,
            member_id,
            loan.id(),
            loan.due_date().format("%Y-%m-%d")
        );
        Ok(loan)
    }

    async fn persist_borrow(&self, tables: &dyn Tables, book_id: i32, loan: &Loan) -> AppResult<Loan> {
        if tables.books().swap_available(book_id, true, false).await?.is_none() {
            return Err(AppError::Conflict(format!(
                "Book '{}' is not available for borrowing",
                loan.book().title()
            )));
        }
        self.repository.loans.create_in(tables, loan).await
    }

    /// Close a loan and put its book back on the shelf
    pub async fn return_book(&self, loan_id: i32) -> AppResult<Loan> {
        self.return_book_at(loan_id, now_millis()).await
    }

    pub async fn return_book_at(&self, loan_id: i32, now: DateTime<Utc>) -> AppResult<Loan> {
        let mut loan = self.repository.loans.get_by_id(loan_id).await?;
        loan.return_book_at(now)?;

        let tx = self.repository.begin().await?;
        let outcome = self.persist_return(tx.tables(), &loan).await;
        let loan = finish(tx, outcome).await?;

        info!("Loan {} returned", loan_id);
        Ok(loan)
    }

    async fn persist_return(&self, tables: &dyn Tables, loan: &Loan) -> AppResult<Loan> {
        let (Some(loan_id), Some(book_id)) = (loan.id(), loan.book().id()) else {
            return Err(AppError::Validation(
                "Only a stored loan can be returned".to_string(),
            ));
        };

        // Re-read inside the transaction: a concurrent return may have won
        let current = tables
            .loans()
            .find_by_id(loan_id)
            .await?
            .ok_or_else(|| AppError::not_found("Loan", loan_id))?;
        if current.return_date.is_some() {
            return Err(AppError::Conflict(format!(
                "Loan {} has already been returned",
                loan_id
            )));
        }

        if tables.books().swap_available(book_id, false, true).await?.is_none() {
            warn!("Book {} was already available when loan {} was returned", book_id, loan_id);
        }
        self.repository.loans.update_in(tables, loan).await
    }

    pub async fn get_loan(&self, id: i32) -> AppResult<Loan> {
        self.repository.loans.get_by_id(id).await
    }

    pub async fn get_active_loans(&self) -> AppResult<Vec<Loan>> {
        self.repository.loans.find_active().await
    }

    /// Full loan history of a member
    pub async fn get_member_loans(&self, member_id: i32) -> AppResult<Vec<Loan>> {
        self.repository.members.get_by_id(member_id).await?;
        self.repository.loans.find_by_member(member_id).await
    }

    pub async fn get_member_active_loans(&self, member_id: i32) -> AppResult<Vec<Loan>> {
        self.repository.members.get_by_id(member_id).await?;
        self.repository.loans.find_active_by_member(member_id).await
    }

    /// Full loan history of a book
    pub async fn get_book_loans(&self, book_id: i32) -> AppResult<Vec<Loan>> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.loans.find_by_book(book_id).await
    }

    /// Active loans past their due date right now
    pub async fn get_overdue_loans(&self) -> AppResult<Vec<Loan>> {
        self.get_overdue_loans_at(Utc::now()).await
    }

    pub async fn get_overdue_loans_at(&self, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let loans = self.repository.loans.find_active().await?;
        Ok(loans
            .into_iter()
            .filter(|loan| loan.is_overdue_at(now))
            .collect())
    }

    /// Sum of fines over overdue loans; defaults to the configured daily fine
    pub async fn calculate_total_fines(&self, daily_rate: Option<Decimal>) -> AppResult<Decimal> {
        self.calculate_total_fines_at(daily_rate, Utc::now()).await
    }

    pub async fn calculate_total_fines_at(
        &self,
        daily_rate: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> AppResult<Decimal> {
        let rate = daily_rate.unwrap_or(self.policy.daily_fine);
        if rate.is_sign_negative() {
            return Err(AppError::Validation(format!(
                "Daily fine cannot be negative (got {})",
                rate
            )));
        }
        let overdue = self.get_overdue_loans_at(now).await?;
        overdue.iter().try_fold(Decimal::ZERO, |total, loan| {
            let fine = loan.calculate_fine_at(rate, now)?;
            total.checked_add(fine).ok_or_else(|| {
                AppError::Validation(format!("Total fines at {} per day are out of range", rate))
            })
        })
    }
}
