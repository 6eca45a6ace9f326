//! Catalog and membership service

use tracing::info;

use crate::{
    error::{AppError, AppResult},
    models::{Author, Book, Member},
    repository::{EntityRepository, Repository},
};

#[derive(Clone)]
pub struct LibraryService {
    repository: Repository,
}

impl LibraryService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    // ---- Authors ----

    /// Add a new author; emails are unique across authors
    pub async fn add_author(&self, author: &Author) -> AppResult<Author> {
        self.ensure_author_email_free(author.email(), None).await?;
        let created = self.repository.authors.create(author).await?;
        info!("Added author {:?}: {}", created.id(), created.full_name());
        Ok(created)
    }

    pub async fn get_author(&self, id: i32) -> AppResult<Author> {
        self.repository.authors.get_by_id(id).await
    }

    pub async fn list_authors(&self) -> AppResult<Vec<Author>> {
        self.repository.authors.find_all().await
    }

    pub async fn update_author(&self, author: &Author) -> AppResult<Author> {
        let id = saved_id(author.id(), "author")?;
        self.repository.authors.get_by_id(id).await?;
        self.ensure_author_email_free(author.email(), Some(id)).await?;
        self.repository.authors.update(author).await
    }

    /// Remove an author together with their books and those books' loans
    pub async fn remove_author(&self, id: i32) -> AppResult<()> {
        self.repository.authors.delete(id).await?;
        info!("Removed author {}", id);
        Ok(())
    }

    async fn ensure_author_email_free(&self, email: &str, owner: Option<i32>) -> AppResult<()> {
        match self.repository.authors.find_by_email(email).await? {
            Some(existing) if existing.id() != owner => Err(AppError::Conflict(format!(
                "An author with email '{}' already exists",
                email
            ))),
            _ => Ok(()),
        }
    }

    // ---- Books ----

    /// Add a book to the catalog; its author must already be stored
    pub async fn add_book(&self, book: &Book) -> AppResult<Book> {
        let author_id = saved_id(book.author().id(), "author")?;
        self.repository.authors.get_by_id(author_id).await?;
        self.ensure_isbn_free(book.isbn(), None).await?;

        let created = self.repository.books.create(book).await?;
        info!("Added book {:?}: {}", created.id(), created.title());
        Ok(created)
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    pub async fn find_book_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        self.repository.books.find_by_isbn(isbn).await
    }

    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        self.repository.books.find_all().await
    }

    pub async fn list_available_books(&self) -> AppResult<Vec<Book>> {
        self.repository.books.find_available().await
    }

    pub async fn list_books_by_author(&self, author_id: i32) -> AppResult<Vec<Book>> {
        self.repository.authors.get_by_id(author_id).await?;
        self.repository.books.find_by_author(author_id).await
    }

    /// Update catalog fields; availability is left to borrow and return
    pub async fn update_book(&self, book: &Book) -> AppResult<Book> {
        let id = saved_id(book.id(), "book")?;
        self.repository.books.get_by_id(id).await?;
        let author_id = saved_id(book.author().id(), "author")?;
        self.repository.authors.get_by_id(author_id).await?;
        self.ensure_isbn_free(book.isbn(), Some(id)).await?;
        self.repository.books.update(book).await
    }

    /// Remove a book and its loan history; refused while the book is lent out
    pub async fn remove_book(&self, id: i32) -> AppResult<()> {
        let book = self.repository.books.get_by_id(id).await?;
        if self.repository.loans.count_active_for_book(id).await? > 0 {
            return Err(AppError::Conflict(format!(
                "Book '{}' is currently on loan",
                book.title()
            )));
        }
        self.repository.books.delete(id).await?;
        info!("Removed book {}: {}", id, book.title());
        Ok(())
    }

    async fn ensure_isbn_free(&self, isbn: &str, owner: Option<i32>) -> AppResult<()> {
        match self.repository.books.find_by_isbn(isbn).await {
            Ok(Some(existing)) if existing.id() != owner => Err(AppError::Conflict(format!(
                "A book with ISBN '{}' already exists",
                isbn
            ))),
            Ok(_) => Ok(()),
            // A dangling row still holds the ISBN
            Err(AppError::Integrity(_)) => Err(AppError::Conflict(format!(
                "A book with ISBN '{}' already exists",
                isbn
            ))),
            Err(e) => Err(e),
        }
    }

    // ---- Members ----

    /// Register a member; emails are unique across members
    pub async fn register_member(&self, member: &Member) -> AppResult<Member> {
        self.ensure_member_email_free(member.email(), None).await?;
        let created = self.repository.members.create(member).await?;
        info!("Registered member {:?}: {}", created.id(), created.full_name());
        Ok(created)
    }

    pub async fn get_member(&self, id: i32) -> AppResult<Member> {
        self.repository.members.get_by_id(id).await
    }

    pub async fn list_members(&self) -> AppResult<Vec<Member>> {
        self.repository.members.find_all().await
    }

    pub async fn update_member(&self, member: &Member) -> AppResult<Member> {
        let id = saved_id(member.id(), "member")?;
        self.repository.members.get_by_id(id).await?;
        self.ensure_member_email_free(member.email(), Some(id)).await?;
        self.repository.members.update(member).await
    }

    /// Remove a member and their loan history; refused while they hold a book
    pub async fn remove_member(&self, id: i32) -> AppResult<()> {
        let member = self.repository.members.get_by_id(id).await?;
        let active = self.repository.loans.count_active_for_member(id).await?;
        if active > 0 {
            return Err(AppError::Conflict(format!(
                "Member {} still has {} active loan(s)",
                member.full_name(),
                active
            )));
        }
        self.repository.members.delete(id).await?;
        info!("Removed member {}: {}", id, member.full_name());
        Ok(())
    }

    async fn ensure_member_email_free(&self, email: &str, owner: Option<i32>) -> AppResult<()> {
        match self.repository.members.find_by_email(email).await? {
            Some(existing) if existing.id() != owner => Err(AppError::Conflict(format!(
                "A member with email '{}' already exists",
                email
            ))),
            _ => Ok(()),
        }
    }
}

fn saved_id(id: Option<i32>, what: &str) -> AppResult<i32> {
    id.ok_or_else(|| AppError::Validation(format!("The {} must be saved first", what)))
}
