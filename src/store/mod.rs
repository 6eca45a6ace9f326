//! Row store: the persistence boundary
//!
//! Repositories never talk to a database directly. They go through
//! [`RowStore`], one per table, reached through [`Tables`]. A [`Store`] can open
//! a [`Transaction`], which exposes the same tables; writes made through it
//! become visible only on commit.
//!
//! Two engines are provided: [`postgres::PgStore`] backed by `sqlx`, and
//! [`memory::MemoryStore`] used by tests and embedders that do not need a
//! database.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::AppResult,
    models::{AuthorRow, BookRow, LoanRow, MemberRow},
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A flat row stored in one table
pub trait StoredRow: Clone + Send + Sync + 'static {
    type Filter: Default + Send + Sync;

    /// Table name
    const TABLE: &'static str;

    fn id(&self) -> Option<i32>;

    fn set_id(&mut self, id: i32);

    fn matches(&self, filter: &Self::Filter) -> bool;

    /// Carry over the columns a plain update must leave alone
    fn keep_immutable(&mut self, _stored: &Self) {}

    /// Column and value of the table's unique constraint, if any
    fn unique_key(&self) -> Option<(&'static str, String)> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthorFilter {
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    pub available: Option<bool>,
    pub author_id: Option<i32>,
    pub isbn: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemberFilter {
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoanFilter {
    /// `Some(true)` keeps loans without a return date, `Some(false)` returned ones
    pub active: Option<bool>,
    pub book_id: Option<i32>,
    pub member_id: Option<i32>,
}

/// CRUD access to one table
#[async_trait]
pub trait RowStore<R: StoredRow>: Send + Sync {
    async fn find_by_id(&self, id: i32) -> AppResult<Option<R>>;

    /// Rows matching `filter`, in ascending id order on every engine
    async fn find_all(&self, filter: &R::Filter) -> AppResult<Vec<R>>;

    /// Insert a row and return it with its assigned id
    async fn insert(&self, row: &R) -> AppResult<R>;

    /// Replace a row's mutable columns; `None` when no row has that id
    async fn update(&self, row: &R) -> AppResult<Option<R>>;

    /// Delete a row, returning the number of rows removed
    async fn delete(&self, id: i32) -> AppResult<u64>;
}

/// Book table with its atomic availability switch
#[async_trait]
pub trait BookRows: RowStore<BookRow> {
    /// The same table seen as a plain row store
    fn as_rows(&self) -> &dyn RowStore<BookRow>;

    /// Set `available` only if it currently equals `expected`.
    /// Returns the updated row, or `None` when nothing matched.
    async fn swap_available(&self, id: i32, expected: bool, available: bool)
        -> AppResult<Option<BookRow>>;
}

/// The four library tables
pub trait Tables: Send + Sync {
    fn authors(&self) -> &dyn RowStore<AuthorRow>;
    fn books(&self) -> &dyn BookRows;
    fn members(&self) -> &dyn RowStore<MemberRow>;
    fn loans(&self) -> &dyn RowStore<LoanRow>;
}

#[async_trait]
pub trait Store: Tables {
    fn tables(&self) -> &dyn Tables;

    async fn begin(&self) -> AppResult<Box<dyn Transaction>>;
}

/// An open unit of work. Dropping it without `commit` discards its writes.
#[async_trait]
pub trait Transaction: Tables {
    fn tables(&self) -> &dyn Tables;

    async fn commit(&mut self) -> AppResult<()>;

    async fn rollback(&mut self) -> AppResult<()>;
}

/// Commit on success, roll back on failure, and hand back the outcome
pub async fn finish<T>(mut tx: Box<dyn Transaction>, outcome: AppResult<T>) -> AppResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!("Rollback failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}

impl StoredRow for AuthorRow {
    type Filter = AuthorFilter;
    const TABLE: &'static str = "authors";

    fn id(&self) -> Option<i32> {
        self.id
    }

    fn set_id(&mut self, id: i32) {
        self.id = Some(id);
    }

    fn matches(&self, filter: &AuthorFilter) -> bool {
        filter
            .email
            .as_ref()
            .map_or(true, |email| self.email.eq_ignore_ascii_case(email))
    }

    fn keep_immutable(&mut self, stored: &Self) {
        self.created_at = stored.created_at;
    }

    fn unique_key(&self) -> Option<(&'static str, String)> {
        Some(("email", self.email.to_lowercase()))
    }
}

impl StoredRow for BookRow {
    type Filter = BookFilter;
    const TABLE: &'static str = "books";

    fn id(&self) -> Option<i32> {
        self.id
    }

    fn set_id(&mut self, id: i32) {
        self.id = Some(id);
    }

    fn matches(&self, filter: &BookFilter) -> bool {
        filter.available.map_or(true, |a| self.available == a)
            && filter.author_id.map_or(true, |id| self.author_id == id)
            && filter.isbn.as_ref().map_or(true, |isbn| &self.isbn == isbn)
    }

    /// Availability only moves through `BookRows::swap_available`
    fn keep_immutable(&mut self, stored: &Self) {
        self.available = stored.available;
        self.created_at = stored.created_at;
    }

    fn unique_key(&self) -> Option<(&'static str, String)> {
        Some(("isbn", self.isbn.clone()))
    }
}

impl StoredRow for MemberRow {
    type Filter = MemberFilter;
    const TABLE: &'static str = "members";

    fn id(&self) -> Option<i32> {
        self.id
    }

    fn set_id(&mut self, id: i32) {
        self.id = Some(id);
    }

    fn matches(&self, filter: &MemberFilter) -> bool {
        filter
            .email
            .as_ref()
            .map_or(true, |email| self.email.eq_ignore_ascii_case(email))
    }

    fn keep_immutable(&mut self, stored: &Self) {
        self.member_since = stored.member_since;
    }

    fn unique_key(&self) -> Option<(&'static str, String)> {
        Some(("email", self.email.to_lowercase()))
    }
}

impl StoredRow for LoanRow {
    type Filter = LoanFilter;
    const TABLE: &'static str = "loans";

    fn id(&self) -> Option<i32> {
        self.id
    }

    fn set_id(&mut self, id: i32) {
        self.id = Some(id);
    }

    fn matches(&self, filter: &LoanFilter) -> bool {
        filter
            .active
            .map_or(true, |active| self.return_date.is_none() == active)
            && filter.book_id.map_or(true, |id| self.book_id == id)
            && filter.member_id.map_or(true, |id| self.member_id == id)
    }

    /// Only the return date changes once a loan exists
    fn keep_immutable(&mut self, stored: &Self) {
        self.book_id = stored.book_id;
        self.member_id = stored.member_id;
        self.loan_date = stored.loan_date;
        self.due_date = stored.due_date;
    }
}
