//! In-memory row store
//!
//! Tables live behind a single `tokio` mutex. A transaction holds that lock
//! for its whole lifetime and works on a staged copy that replaces the shared
//! tables on commit, so transactions are serialized against every other
//! access.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{BookRows, RowStore, Store, StoredRow, Tables, Transaction};
use crate::{
    error::{AppError, AppResult},
    models::{AuthorRow, BookRow, LoanRow, MemberRow},
};

#[derive(Debug, Clone)]
struct Table<R> {
    rows: BTreeMap<i32, R>,
    next_id: i32,
}

impl<R> Default for Table<R> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<R: StoredRow> Table<R> {
    fn check_unique(&self, row: &R, exclude: Option<i32>) -> AppResult<()> {
        let Some((column, value)) = row.unique_key() else {
            return Ok(());
        };
        let taken = self.rows.values().any(|other| {
            other.id() != exclude && other.unique_key().map(|(_, v)| v) == Some(value.clone())
        });
        if taken {
            return Err(AppError::Conflict(format!(
                "Duplicate {}.{}: '{}' already exists",
                R::TABLE,
                column,
                value
            )));
        }
        Ok(())
    }

    fn insert(&mut self, row: &R) -> AppResult<R> {
        self.check_unique(row, None)?;
        let mut row = row.clone();
        let id = self.next_id;
        self.next_id += 1;
        row.set_id(id);
        self.rows.insert(id, row.clone());
        Ok(row)
    }

    fn update(&mut self, row: &R) -> AppResult<Option<R>> {
        let id = row
            .id()
            .ok_or_else(|| AppError::Validation(format!("Cannot update unsaved {} row", R::TABLE)))?;
        let Some(stored) = self.rows.get(&id) else {
            return Ok(None);
        };
        self.check_unique(row, Some(id))?;
        let mut row = row.clone();
        row.keep_immutable(stored);
        self.rows.insert(id, row.clone());
        Ok(Some(row))
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryTables {
    authors: Table<AuthorRow>,
    books: Table<BookRow>,
    members: Table<MemberRow>,
    loans: Table<LoanRow>,
}

/// Per-table access plus the table's foreign keys and cascades
trait HasTable<R: StoredRow> {
    fn table(&self) -> &Table<R>;
    fn table_mut(&mut self) -> &mut Table<R>;

    fn check_references(&self, _row: &R) -> AppResult<()> {
        Ok(())
    }

    /// Remove dependent rows of a deleted row
    fn cascade(&mut self, _id: i32) {}
}

fn foreign_key(table: &str, column: &str, id: i32) -> AppError {
    AppError::Integrity(format!("{}.{} references missing row {}", table, column, id))
}

impl HasTable<AuthorRow> for MemoryTables {
    fn table(&self) -> &Table<AuthorRow> {
        &self.authors
    }

    fn table_mut(&mut self) -> &mut Table<AuthorRow> {
        &mut self.authors
    }

    fn cascade(&mut self, id: i32) {
        let books: Vec<i32> = self
            .books
            .rows
            .values()
            .filter(|b| b.author_id == id)
            .filter_map(|b| b.id)
            .collect();
        for book_id in books {
            self.books.rows.remove(&book_id);
            HasTable::<BookRow>::cascade(self, book_id);
        }
    }
}

impl HasTable<BookRow> for MemoryTables {
    fn table(&self) -> &Table<BookRow> {
        &self.books
    }

    fn table_mut(&mut self) -> &mut Table<BookRow> {
        &mut self.books
    }

    fn check_references(&self, row: &BookRow) -> AppResult<()> {
        if !self.authors.rows.contains_key(&row.author_id) {
            return Err(foreign_key("books", "author_id", row.author_id));
        }
        Ok(())
    }

    fn cascade(&mut self, id: i32) {
        self.loans.rows.retain(|_, loan| loan.book_id != id);
    }
}

impl HasTable<MemberRow> for MemoryTables {
    fn table(&self) -> &Table<MemberRow> {
        &self.members
    }

    fn table_mut(&mut self) -> &mut Table<MemberRow> {
        &mut self.members
    }

    fn cascade(&mut self, id: i32) {
        self.loans.rows.retain(|_, loan| loan.member_id != id);
    }
}

impl HasTable<LoanRow> for MemoryTables {
    fn table(&self) -> &Table<LoanRow> {
        &self.loans
    }

    fn table_mut(&mut self) -> &mut Table<LoanRow> {
        &mut self.loans
    }

    fn check_references(&self, row: &LoanRow) -> AppResult<()> {
        if !self.books.rows.contains_key(&row.book_id) {
            return Err(foreign_key("loans", "book_id", row.book_id));
        }
        if !self.members.rows.contains_key(&row.member_id) {
            return Err(foreign_key("loans", "member_id", row.member_id));
        }
        Ok(())
    }
}

/// Shared handle on one set of tables
#[derive(Clone, Default)]
struct Handle(Arc<Mutex<MemoryTables>>);

#[async_trait]
impl<R> RowStore<R> for Handle
where
    R: StoredRow,
    MemoryTables: HasTable<R>,
{
    async fn find_by_id(&self, id: i32) -> AppResult<Option<R>> {
        let tables = self.0.lock().await;
        Ok(HasTable::<R>::table(&*tables).rows.get(&id).cloned())
    }

    async fn find_all(&self, filter: &R::Filter) -> AppResult<Vec<R>> {
        let tables = self.0.lock().await;
        Ok(HasTable::<R>::table(&*tables)
            .rows
            .values()
            .filter(|row| row.matches(filter))
            .cloned()
            .collect())
    }

    async fn insert(&self, row: &R) -> AppResult<R> {
        let mut tables = self.0.lock().await;
        HasTable::<R>::check_references(&*tables, row)?;
        HasTable::<R>::table_mut(&mut *tables).insert(row)
    }

    async fn update(&self, row: &R) -> AppResult<Option<R>> {
        let mut tables = self.0.lock().await;
        HasTable::<R>::check_references(&*tables, row)?;
        HasTable::<R>::table_mut(&mut *tables).update(row)
    }

    async fn delete(&self, id: i32) -> AppResult<u64> {
        let mut tables = self.0.lock().await;
        if HasTable::<R>::table_mut(&mut *tables).rows.remove(&id).is_none() {
            return Ok(0);
        }
        HasTable::<R>::cascade(&mut *tables, id);
        Ok(1)
    }
}

#[async_trait]
impl BookRows for Handle {
    fn as_rows(&self) -> &dyn RowStore<BookRow> {
        self
    }

    async fn swap_available(
        &self,
        id: i32,
        expected: bool,
        available: bool,
    ) -> AppResult<Option<BookRow>> {
        let mut tables = self.0.lock().await;
        match tables.books.rows.get_mut(&id) {
            Some(book) if book.available == expected => {
                book.available = available;
                Ok(Some(book.clone()))
            }
            _ => Ok(None),
        }
    }
}

/// In-memory store; clones share the same tables
#[derive(Clone, Default)]
pub struct MemoryStore {
    handle: Handle,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables for MemoryStore {
    fn authors(&self) -> &dyn RowStore<AuthorRow> {
        &self.handle
    }

    fn books(&self) -> &dyn BookRows {
        &self.handle
    }

    fn members(&self) -> &dyn RowStore<MemberRow> {
        &self.handle
    }

    fn loans(&self) -> &dyn RowStore<LoanRow> {
        &self.handle
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn tables(&self) -> &dyn Tables {
        self
    }

    async fn begin(&self) -> AppResult<Box<dyn Transaction>> {
        let guard = self.handle.0.clone().lock_owned().await;
        let staged = Handle(Arc::new(Mutex::new((*guard).clone())));
        Ok(Box::new(MemoryTransaction {
            staged,
            guard: Some(guard),
        }))
    }
}

/// Transaction over a staged copy of the tables
pub struct MemoryTransaction {
    staged: Handle,
    guard: Option<OwnedMutexGuard<MemoryTables>>,
}

impl Tables for MemoryTransaction {
    fn authors(&self) -> &dyn RowStore<AuthorRow> {
        &self.staged
    }

    fn books(&self) -> &dyn BookRows {
        &self.staged
    }

    fn members(&self) -> &dyn RowStore<MemberRow> {
        &self.staged
    }

    fn loans(&self) -> &dyn RowStore<LoanRow> {
        &self.staged
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn tables(&self) -> &dyn Tables {
        self
    }

    async fn commit(&mut self) -> AppResult<()> {
        let mut guard = self
            .guard
            .take()
            .ok_or_else(|| AppError::Internal("Transaction already finished".to_string()))?;
        let staged = self.staged.0.lock().await;
        *guard = (*staged).clone();
        Ok(())
    }

    async fn rollback(&mut self) -> AppResult<()> {
        self.guard
            .take()
            .map(drop)
            .ok_or_else(|| AppError::Internal("Transaction already finished".to_string()))
    }
}
