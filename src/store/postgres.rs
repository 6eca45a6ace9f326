//! PostgreSQL row store

use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder};
use tokio::sync::Mutex;

use super::{
    AuthorFilter, BookFilter, BookRows, LoanFilter, MemberFilter, RowStore, Store, Tables,
    Transaction,
};
use crate::{
    error::{AppError, AppResult},
    models::{AuthorRow, BookRow, LoanRow, MemberRow},
};

const AUTHOR_COLUMNS: &str = "id, first_name, last_name, email, bio, created_at";
const BOOK_COLUMNS: &str = "id, title, isbn, author_id, publication_year, genre, available, \
                            kind, ebook_format, file_size_mb, created_at";
const MEMBER_COLUMNS: &str = "id, first_name, last_name, email, phone, member_since";
const LOAN_COLUMNS: &str = "id, book_id, member_id, loan_date, due_date, return_date";

enum Conn {
    Pool(Pool<Postgres>),
    Tx(Mutex<Option<sqlx::Transaction<'static, Postgres>>>),
}

fn finished() -> AppError {
    AppError::Internal("Transaction already finished".to_string())
}

fn unsaved(table: &str) -> AppError {
    AppError::Validation(format!("Cannot update unsaved {} row", table))
}

/// Run a query on whichever connection the handle holds
macro_rules! run {
    ($handle:expr, $query:expr, $method:ident) => {
        match &$handle.conn {
            Conn::Pool(pool) => $query.$method(pool).await?,
            Conn::Tx(tx) => {
                let mut guard = tx.lock().await;
                let tx = guard.as_mut().ok_or_else(finished)?;
                $query.$method(&mut **tx).await?
            }
        }
    };
}

/// Either the pool or one open transaction
struct Handle {
    conn: Conn,
}

#[async_trait]
impl RowStore<AuthorRow> for Handle {
    async fn find_by_id(&self, id: i32) -> AppResult<Option<AuthorRow>> {
        let sql = format!("SELECT {} FROM authors WHERE id = $1", AUTHOR_COLUMNS);
        Ok(run!(self, sqlx::query_as::<_, AuthorRow>(&sql).bind(id), fetch_optional))
    }

    async fn find_all(&self, filter: &AuthorFilter) -> AppResult<Vec<AuthorRow>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM authors WHERE TRUE",
            AUTHOR_COLUMNS
        ));
        if let Some(ref email) = filter.email {
            builder.push(" AND LOWER(email) = LOWER(").push_bind(email.clone()).push(")");
        }
        builder.push(" ORDER BY id");

        Ok(run!(self, builder.build_query_as::<AuthorRow>(), fetch_all))
    }

    async fn insert(&self, row: &AuthorRow) -> AppResult<AuthorRow> {
        let sql = format!(
            r#"
            INSERT INTO authors (first_name, last_name, email, bio, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            AUTHOR_COLUMNS
        );
        let query = sqlx::query_as::<_, AuthorRow>(&sql)
            .bind(&row.first_name)
            .bind(&row.last_name)
            .bind(&row.email)
            .bind(&row.bio)
            .bind(row.created_at);
        Ok(run!(self, query, fetch_one))
    }

    async fn update(&self, row: &AuthorRow) -> AppResult<Option<AuthorRow>> {
        let id = row.id.ok_or_else(|| unsaved("authors"))?;
        let sql = format!(
            r#"
            UPDATE authors SET first_name = $1, last_name = $2, email = $3, bio = $4
            WHERE id = $5
            RETURNING {}
            "#,
            AUTHOR_COLUMNS
        );
        let query = sqlx::query_as::<_, AuthorRow>(&sql)
            .bind(&row.first_name)
            .bind(&row.last_name)
            .bind(&row.email)
            .bind(&row.bio)
            .bind(id);
        Ok(run!(self, query, fetch_optional))
    }

    async fn delete(&self, id: i32) -> AppResult<u64> {
        let result = run!(
            self,
            sqlx::query("DELETE FROM authors WHERE id = $1").bind(id),
            execute
        );
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RowStore<BookRow> for Handle {
    async fn find_by_id(&self, id: i32) -> AppResult<Option<BookRow>> {
        let sql = format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS);
        Ok(run!(self, sqlx::query_as::<_, BookRow>(&sql).bind(id), fetch_optional))
    }

    async fn find_all(&self, filter: &BookFilter) -> AppResult<Vec<BookRow>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM books WHERE TRUE", BOOK_COLUMNS));
        if let Some(available) = filter.available {
            builder.push(" AND available = ").push_bind(available);
        }
        if let Some(author_id) = filter.author_id {
            builder.push(" AND author_id = ").push_bind(author_id);
        }
        if let Some(ref isbn) = filter.isbn {
            builder.push(" AND isbn = ").push_bind(isbn.clone());
        }
        builder.push(" ORDER BY id");

        Ok(run!(self, builder.build_query_as::<BookRow>(), fetch_all))
    }

    async fn insert(&self, row: &BookRow) -> AppResult<BookRow> {
        let sql = format!(
            r#"
            INSERT INTO books (
                title, isbn, author_id, publication_year, genre, available,
                kind, ebook_format, file_size_mb, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        );
        let query = sqlx::query_as::<_, BookRow>(&sql)
            .bind(&row.title)
            .bind(&row.isbn)
            .bind(row.author_id)
            .bind(row.publication_year)
            .bind(&row.genre)
            .bind(row.available)
            .bind(&row.kind)
            .bind(&row.ebook_format)
            .bind(row.file_size_mb)
            .bind(row.created_at);
        Ok(run!(self, query, fetch_one))
    }

    async fn update(&self, row: &BookRow) -> AppResult<Option<BookRow>> {
        let id = row.id.ok_or_else(|| unsaved("books"))?;
        let sql = format!(
            r#"
            UPDATE books SET
                title = $1, isbn = $2, author_id = $3, publication_year = $4, genre = $5,
                kind = $6, ebook_format = $7, file_size_mb = $8
            WHERE id = $9
            RETURNING {}
            "#,
            BOOK_COLUMNS
        );
        let query = sqlx::query_as::<_, BookRow>(&sql)
            .bind(&row.title)
            .bind(&row.isbn)
            .bind(row.author_id)
            .bind(row.publication_year)
            .bind(&row.genre)
            .bind(&row.kind)
            .bind(&row.ebook_format)
            .bind(row.file_size_mb)
            .bind(id);
        Ok(run!(self, query, fetch_optional))
    }

    async fn delete(&self, id: i32) -> AppResult<u64> {
        let result = run!(
            self,
            sqlx::query("DELETE FROM books WHERE id = $1").bind(id),
            execute
        );
        Ok(result.rows_affected())
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
        let sql = format!(
            "UPDATE books SET available = $1 WHERE id = $2 AND available = $3 RETURNING {}",
            BOOK_COLUMNS
        );
        let query = sqlx::query_as::<_, BookRow>(&sql)
            .bind(available)
            .bind(id)
            .bind(expected);
        Ok(run!(self, query, fetch_optional))
    }
}

#[async_trait]
impl RowStore<MemberRow> for Handle {
    async fn find_by_id(&self, id: i32) -> AppResult<Option<MemberRow>> {
        let sql = format!("SELECT {} FROM members WHERE id = $1", MEMBER_COLUMNS);
        Ok(run!(self, sqlx::query_as::<_, MemberRow>(&sql).bind(id), fetch_optional))
    }

    async fn find_all(&self, filter: &MemberFilter) -> AppResult<Vec<MemberRow>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM members WHERE TRUE",
            MEMBER_COLUMNS
        ));
        if let Some(ref email) = filter.email {
            builder.push(" AND LOWER(email) = LOWER(").push_bind(email.clone()).push(")");
        }
        builder.push(" ORDER BY id");

        Ok(run!(self, builder.build_query_as::<MemberRow>(), fetch_all))
    }

    async fn insert(&self, row: &MemberRow) -> AppResult<MemberRow> {
        let sql = format!(
            r#"
            INSERT INTO members (first_name, last_name, email, phone, member_since)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            MEMBER_COLUMNS
        );
        let query = sqlx::query_as::<_, MemberRow>(&sql)
            .bind(&row.first_name)
            .bind(&row.last_name)
            .bind(&row.email)
            .bind(&row.phone)
            .bind(row.member_since);
        Ok(run!(self, query, fetch_one))
    }

    async fn update(&self, row: &MemberRow) -> AppResult<Option<MemberRow>> {
        let id = row.id.ok_or_else(|| unsaved("members"))?;
        let sql = format!(
            r#"
            UPDATE members SET first_name = $1, last_name = $2, email = $3, phone = $4
            WHERE id = $5
            RETURNING {}
            "#,
            MEMBER_COLUMNS
        );
        let query = sqlx::query_as::<_, MemberRow>(&sql)
            .bind(&row.first_name)
            .bind(&row.last_name)
            .bind(&row.email)
            .bind(&row.phone)
            .bind(id);
        Ok(run!(self, query, fetch_optional))
    }

    async fn delete(&self, id: i32) -> AppResult<u64> {
        let result = run!(
            self,
            sqlx::query("DELETE FROM members WHERE id = $1").bind(id),
            execute
        );
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RowStore<LoanRow> for Handle {
    async fn find_by_id(&self, id: i32) -> AppResult<Option<LoanRow>> {
        let sql = format!("SELECT {} FROM loans WHERE id = $1", LOAN_COLUMNS);
        Ok(run!(self, sqlx::query_as::<_, LoanRow>(&sql).bind(id), fetch_optional))
    }

    async fn find_all(&self, filter: &LoanFilter) -> AppResult<Vec<LoanRow>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM loans WHERE TRUE", LOAN_COLUMNS));
        match filter.active {
            Some(true) => {
                builder.push(" AND return_date IS NULL");
            }
            Some(false) => {
                builder.push(" AND return_date IS NOT NULL");
            }
            None => {}
        }
        if let Some(book_id) = filter.book_id {
            builder.push(" AND book_id = ").push_bind(book_id);
        }
        if let Some(member_id) = filter.member_id {
            builder.push(" AND member_id = ").push_bind(member_id);
        }
        builder.push(" ORDER BY id");

        Ok(run!(self, builder.build_query_as::<LoanRow>(), fetch_all))
    }

    async fn insert(&self, row: &LoanRow) -> AppResult<LoanRow> {
        let sql = format!(
            r#"
            INSERT INTO loans (book_id, member_id, loan_date, due_date, return_date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            LOAN_COLUMNS
        );
        let query = sqlx::query_as::<_, LoanRow>(&sql)
            .bind(row.book_id)
            .bind(row.member_id)
            .bind(row.loan_date)
            .bind(row.due_date)
            .bind(row.return_date);
        Ok(run!(self, query, fetch_one))
    }

    async fn update(&self, row: &LoanRow) -> AppResult<Option<LoanRow>> {
        let id = row.id.ok_or_else(|| unsaved("loans"))?;
        let sql = format!(
            "UPDATE loans SET return_date = $1 WHERE id = $2 RETURNING {}",
            LOAN_COLUMNS
        );
        let query = sqlx::query_as::<_, LoanRow>(&sql)
            .bind(row.return_date)
            .bind(id);
        Ok(run!(self, query, fetch_optional))
    }

    async fn delete(&self, id: i32) -> AppResult<u64> {
        let result = run!(
            self,
            sqlx::query("DELETE FROM loans WHERE id = $1").bind(id),
            execute
        );
        Ok(result.rows_affected())
    }
}

/// PostgreSQL store over a connection pool
pub struct PgStore {
    handle: Handle,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            handle: Handle {
                conn: Conn::Pool(pool),
            },
        }
    }

    /// Apply the schema migrations shipped with the crate
    pub async fn migrate(&self) -> AppResult<()> {
        let Conn::Pool(ref pool) = self.handle.conn else {
            return Err(AppError::Internal("Store has no pool".to_string()));
        };
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))
    }
}

impl Tables for PgStore {
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
impl Store for PgStore {
    fn tables(&self) -> &dyn Tables {
        self
    }

    async fn begin(&self) -> AppResult<Box<dyn Transaction>> {
        let Conn::Pool(ref pool) = self.handle.conn else {
            return Err(AppError::Internal("Store has no pool".to_string()));
        };
        let tx = pool.begin().await?;
        Ok(Box::new(PgTransaction {
            handle: Handle {
                conn: Conn::Tx(Mutex::new(Some(tx))),
            },
        }))
    }
}

/// Open PostgreSQL transaction; rolled back by sqlx when dropped uncommitted
pub struct PgTransaction {
    handle: Handle,
}

impl PgTransaction {
    async fn take(&self) -> AppResult<sqlx::Transaction<'static, Postgres>> {
        match &self.handle.conn {
            Conn::Tx(tx) => tx.lock().await.take().ok_or_else(finished),
            Conn::Pool(_) => Err(finished()),
        }
    }
}

impl Tables for PgTransaction {
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
impl Transaction for PgTransaction {
    fn tables(&self) -> &dyn Tables {
        self
    }

    async fn commit(&mut self) -> AppResult<()> {
        self.take().await?.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> AppResult<()> {
        self.take().await?.rollback().await?;
        Ok(())
    }
}
