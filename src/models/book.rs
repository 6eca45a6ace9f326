//! Book model: printed books and e-books share one entity, told apart by [`BookKind`]

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::{
    author::Author, from_millis, now_millis, optional_text, required_text, to_millis, valid_isbn,
};
use crate::error::{AppError, AppResult};

const KIND_BOOK: &str = "book";
const KIND_EBOOK: &str = "ebook";

/// Book row as persisted in the `books` table
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct BookRow {
    pub id: Option<i32>,
    pub title: String,
    pub isbn: String,
    pub author_id: i32,
    pub publication_year: Option<i32>,
    pub genre: Option<String>,
    pub available: bool,
    /// "book" or "ebook"
    pub kind: String,
    pub ebook_format: Option<String>,
    pub file_size_mb: Option<f64>,
    pub created_at: i64,
}

/// E-book specific payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EBookDetails {
    /// File format (PDF, EPUB, ...)
    pub format: String,
    pub file_size_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BookKind {
    Book,
    EBook(EBookDetails),
}

/// Book entity, carrying its author by value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Book {
    id: Option<i32>,
    title: String,
    isbn: String,
    author: Author,
    publication_year: Option<i32>,
    genre: Option<String>,
    available: bool,
    #[serde(flatten)]
    kind: BookKind,
    created_at: DateTime<Utc>,
}

impl Book {
    /// Create a transient printed book, available for borrowing
    pub fn new(title: impl Into<String>, isbn: impl Into<String>, author: Author) -> AppResult<Self> {
        Ok(Self {
            id: None,
            title: required_text("Title", title)?,
            isbn: valid_isbn(isbn)?,
            author,
            publication_year: None,
            genre: None,
            available: true,
            kind: BookKind::Book,
            created_at: now_millis(),
        })
    }

    /// Create a transient e-book
    pub fn new_ebook(
        title: impl Into<String>,
        isbn: impl Into<String>,
        author: Author,
        format: impl Into<String>,
        file_size_mb: f64,
    ) -> AppResult<Self> {
        let details = ebook_details(format.into(), file_size_mb)?;
        let mut book = Self::new(title, isbn, author)?;
        book.kind = BookKind::EBook(details);
        Ok(book)
    }

    pub fn with_publication_year(mut self, year: i32) -> Self {
        self.publication_year = Some(year);
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = optional_text(Some(genre.into()));
        self
    }

    pub fn id(&self) -> Option<i32> {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn isbn(&self) -> &str {
        &self.isbn
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn publication_year(&self) -> Option<i32> {
        self.publication_year
    }

    pub fn genre(&self) -> Option<&str> {
        self.genre.as_deref()
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn kind(&self) -> &BookKind {
        &self.kind
    }

    pub fn is_ebook(&self) -> bool {
        matches!(self.kind, BookKind::EBook(_))
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> AppResult<()> {
        self.title = required_text("Title", title)?;
        Ok(())
    }

    pub fn set_isbn(&mut self, isbn: impl Into<String>) -> AppResult<()> {
        self.isbn = valid_isbn(isbn)?;
        Ok(())
    }

    pub fn set_genre(&mut self, genre: Option<String>) {
        self.genre = optional_text(genre);
    }

    pub fn set_publication_year(&mut self, year: Option<i32>) {
        self.publication_year = year;
    }

    /// Switch the author; the new author must already be persisted
    pub fn set_author(&mut self, author: Author) -> AppResult<()> {
        if author.id().is_none() {
            return Err(AppError::Validation(
                "Author must be saved before books can reference it".to_string(),
            ));
        }
        self.author = author;
        Ok(())
    }

    /// Take the book off the shelf
    pub fn borrow(&mut self) -> AppResult<()> {
        if !self.available {
            return Err(AppError::Conflict(format!(
                "Book '{}' is not available for borrowing",
                self.title
            )));
        }
        self.available = false;
        Ok(())
    }

    /// Put the book back on the shelf (idempotent)
    pub fn mark_returned(&mut self) {
        self.available = true;
    }

    /// One-line description; e-books append their format and size
    pub fn info(&self) -> String {
        let year = self
            .publication_year
            .map(|y| format!(" ({})", y))
            .unwrap_or_default();
        let status = if self.available { "Available" } else { "Borrowed" };
        let base = format!(
            "\"{}\" by {}{} - ISBN: {} [{}]",
            self.title,
            self.author.full_name(),
            year,
            self.isbn,
            status
        );

        match &self.kind {
            BookKind::Book => base,
            BookKind::EBook(details) => format!(
                "{} - EBook ({}, {:.1} MB)",
                base, details.format, details.file_size_mb
            ),
        }
    }

    pub fn to_row(&self) -> AppResult<BookRow> {
        let author_id = self.author.id().ok_or_else(|| {
            AppError::Validation("Author must be saved before books can reference it".to_string())
        })?;

        let (kind, ebook_format, file_size_mb) = match &self.kind {
            BookKind::Book => (KIND_BOOK, None, None),
            BookKind::EBook(details) => (
                KIND_EBOOK,
                Some(details.format.clone()),
                Some(details.file_size_mb),
            ),
        };

        Ok(BookRow {
            id: self.id,
            title: self.title.clone(),
            isbn: self.isbn.clone(),
            author_id,
            publication_year: self.publication_year,
            genre: self.genre.clone(),
            available: self.available,
            kind: kind.to_string(),
            ebook_format,
            file_size_mb,
            created_at: to_millis(self.created_at),
        })
    }

    /// Rebuild a book from its row and its already hydrated author
    pub fn from_row(row: BookRow, author: Author) -> AppResult<Self> {
        if author.id() != Some(row.author_id) {
            return Err(AppError::Integrity(format!(
                "Book {:?} references author {} but was given author {:?}",
                row.id,
                row.author_id,
                author.id()
            )));
        }

        let kind = match (row.kind.as_str(), row.ebook_format, row.file_size_mb) {
            (KIND_BOOK, _, _) => BookKind::Book,
            (KIND_EBOOK, Some(format), Some(file_size_mb)) => {
                BookKind::EBook(EBookDetails { format, file_size_mb })
            }
            (KIND_EBOOK, _, _) => {
                return Err(AppError::Integrity(format!(
                    "E-book {:?} is missing its format or file size",
                    row.id
                )))
            }
            (other, _, _) => {
                return Err(AppError::Integrity(format!(
                    "Unknown book kind '{}' for book {:?}",
                    other, row.id
                )))
            }
        };

        Ok(Self {
            id: row.id,
            title: row.title,
            isbn: row.isbn,
            author,
            publication_year: row.publication_year,
            genre: row.genre,
            available: row.available,
            kind,
            created_at: from_millis(row.created_at)?,
        })
    }
}

fn ebook_details(format: String, file_size_mb: f64) -> AppResult<EBookDetails> {
    let format = required_text("E-book format", format)?.to_uppercase();
    if !file_size_mb.is_finite() || file_size_mb < 0.0 {
        return Err(AppError::Validation(
            "E-book file size must be a non-negative number".to_string(),
        ));
    }
    Ok(EBookDetails { format, file_size_mb })
}

impl std::fmt::Display for Book {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.info())
    }
}
