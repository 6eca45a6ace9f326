//! Books repository
//!
//! Book rows only carry `author_id`; every read attaches the full [`Author`].
//! Bulk reads batch the author look-ups so each distinct author is fetched
//! once, whatever the number of books.

use std::sync::Arc;

use async_trait::async_trait;

use super::{authors::AuthorsRepository, EntityRepository};
use crate::{
    error::{AppError, AppResult},
    models::{Author, Book, BookRow},
    store::{BookFilter, RowStore, Store, Tables},
};

#[derive(Clone)]
pub struct BooksRepository {
    store: Arc<dyn Store>,
    authors: AuthorsRepository,
}

impl BooksRepository {
    pub fn new(store: Arc<dyn Store>, authors: AuthorsRepository) -> Self {
        Self { store, authors }
    }

    /// Books matching a filter, hydrated in one batch
    pub async fn find_where(&self, filter: &BookFilter) -> AppResult<Vec<Book>> {
        let tables = self.store.tables();
        let rows = tables.books().find_all(filter).await?;
        self.hydrate_all(tables, rows).await
    }

    pub async fn find_available(&self) -> AppResult<Vec<Book>> {
        self.find_where(&BookFilter {
            available: Some(true),
            ..Default::default()
        })
        .await
    }

    pub async fn find_by_author(&self, author_id: i32) -> AppResult<Vec<Book>> {
        self.find_where(&BookFilter {
            author_id: Some(author_id),
            ..Default::default()
        })
        .await
    }

    pub async fn find_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let tables = self.store.tables();
        let filter = BookFilter {
            isbn: Some(isbn.trim().to_string()),
            ..Default::default()
        };
        match tables.books().find_all(&filter).await?.into_iter().next() {
            Some(row) => Ok(Some(self.hydrate(tables, row).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl EntityRepository<Book> for BooksRepository {
    type Row = BookRow;

    const KIND: &'static str = "Book";

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    fn rows<'t>(&self, tables: &'t dyn Tables) -> &'t dyn RowStore<BookRow> {
        tables.books().as_rows()
    }

    fn entity_id(book: &Book) -> Option<i32> {
        book.id()
    }

    fn to_row(book: &Book) -> AppResult<BookRow> {
        book.to_row()
    }

    async fn hydrate(&self, tables: &dyn Tables, row: BookRow) -> AppResult<Book> {
        let author_row = tables
            .authors()
            .find_by_id(row.author_id)
            .await?
            .ok_or_else(|| AppError::missing_reference("Author", row.author_id, "book", row.id))?;
        Book::from_row(row, Author::from_row(author_row)?)
    }

    async fn hydrate_all(&self, tables: &dyn Tables, rows: Vec<BookRow>) -> AppResult<Vec<Book>> {
        let authors = self
            .authors
            .load_many(tables, rows.iter().map(|row| row.author_id))
            .await?;
        tracing::debug!(
            "Hydrating {} books with {} distinct authors",
            rows.len(),
            authors.len()
        );

        let mut books = Vec::with_capacity(rows.len());
        for row in rows {
            match authors.get(&row.author_id) {
                Some(author) => books.push(Book::from_row(row, author.clone())?),
                None => tracing::warn!(
                    "Skipping book {:?}: author {} not found",
                    row.id,
                    row.author_id
                ),
            }
        }
        Ok(books)
    }
}
