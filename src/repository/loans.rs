//! Loans repository
//!
//! A loan is rebuilt with its book (and that book's author) and its member.
//! Listings batch all three look-ups by distinct id.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use async_trait::async_trait;

use super::{
    books::BooksRepository, fetch_distinct, members::MembersRepository, EntityRepository,
};
use crate::{
    error::{AppError, AppResult},
    models::{Book, Loan, LoanRow, Member},
    store::{LoanFilter, RowStore, Store, Tables},
};

#[derive(Clone)]
pub struct LoansRepository {
    store: Arc<dyn Store>,
    books: BooksRepository,
    members: MembersRepository,
}

impl LoansRepository {
    pub fn new(store: Arc<dyn Store>, books: BooksRepository, members: MembersRepository) -> Self {
        Self {
            store,
            books,
            members,
        }
    }

    /// Loans matching a filter, hydrated in one batch
    pub async fn find_where(&self, filter: &LoanFilter) -> AppResult<Vec<Loan>> {
        self.find_where_in(self.store.tables(), filter).await
    }

    pub async fn find_where_in(&self, tables: &dyn Tables, filter: &LoanFilter) -> AppResult<Vec<Loan>> {
        let rows = tables.loans().find_all(filter).await?;
        self.hydrate_all(tables, rows).await
    }

    /// Loans not yet returned
    pub async fn find_active(&self) -> AppResult<Vec<Loan>> {
        self.find_where(&LoanFilter {
            active: Some(true),
            ..Default::default()
        })
        .await
    }

    pub async fn find_by_member(&self, member_id: i32) -> AppResult<Vec<Loan>> {
        self.find_where(&LoanFilter {
            member_id: Some(member_id),
            ..Default::default()
        })
        .await
    }

    pub async fn find_active_by_member(&self, member_id: i32) -> AppResult<Vec<Loan>> {
        self.find_where(&LoanFilter {
            active: Some(true),
            member_id: Some(member_id),
            ..Default::default()
        })
        .await
    }

    pub async fn find_by_book(&self, book_id: i32) -> AppResult<Vec<Loan>> {
        self.find_where(&LoanFilter {
            book_id: Some(book_id),
            ..Default::default()
        })
        .await
    }

    /// Number of open loans on a book, without hydrating them
    pub async fn count_active_for_book(&self, book_id: i32) -> AppResult<usize> {
        let filter = LoanFilter {
            active: Some(true),
            book_id: Some(book_id),
            ..Default::default()
        };
        Ok(self.store.loans().find_all(&filter).await?.len())
    }

    /// Number of open loans held by a member, without hydrating them
    pub async fn count_active_for_member(&self, member_id: i32) -> AppResult<usize> {
        let filter = LoanFilter {
            active: Some(true),
            member_id: Some(member_id),
            ..Default::default()
        };
        Ok(self.store.loans().find_all(&filter).await?.len())
    }

    async fn load_books(
        &self,
        tables: &dyn Tables,
        ids: BTreeSet<i32>,
    ) -> AppResult<HashMap<i32, Book>> {
        let rows = fetch_distinct(tables.books().as_rows(), ids).await?;
        let books = self.books.hydrate_all(tables, rows).await?;
        Ok(books
            .into_iter()
            .filter_map(|book| book.id().map(|id| (id, book)))
            .collect())
    }
}

#[async_trait]
impl EntityRepository<Loan> for LoansRepository {
    type Row = LoanRow;

    const KIND: &'static str = "Loan";

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    fn rows<'t>(&self, tables: &'t dyn Tables) -> &'t dyn RowStore<LoanRow> {
        tables.loans()
    }

    fn entity_id(loan: &Loan) -> Option<i32> {
        loan.id()
    }

    fn to_row(loan: &Loan) -> AppResult<LoanRow> {
        loan.to_row()
    }

    async fn hydrate(&self, tables: &dyn Tables, row: LoanRow) -> AppResult<Loan> {
        let book_row = tables
            .books()
            .find_by_id(row.book_id)
            .await?
            .ok_or_else(|| AppError::missing_reference("Book", row.book_id, "loan", row.id))?;
        let book = self.books.hydrate(tables, book_row).await?;

        let member_row = tables
            .members()
            .find_by_id(row.member_id)
            .await?
            .ok_or_else(|| AppError::missing_reference("Member", row.member_id, "loan", row.id))?;
        let member = Member::from_row(member_row)?;

        Loan::from_row(row, book, member)
    }

    async fn hydrate_all(&self, tables: &dyn Tables, rows: Vec<LoanRow>) -> AppResult<Vec<Loan>> {
        let book_ids: BTreeSet<i32> = rows.iter().map(|row| row.book_id).collect();
        let member_ids: BTreeSet<i32> = rows.iter().map(|row| row.member_id).collect();

        let books = self.load_books(tables, book_ids).await?;
        let members = self.members.load_many(tables, member_ids).await?;
        tracing::debug!(
            "Hydrating {} loans with {} books and {} members",
            rows.len(),
            books.len(),
            members.len()
        );

        let mut loans = Vec::with_capacity(rows.len());
        for row in rows {
            let (Some(book), Some(member)) = (books.get(&row.book_id), members.get(&row.member_id))
            else {
                tracing::warn!(
                    "Skipping loan {:?}: book {} or member {} not found",
                    row.id,
                    row.book_id,
                    row.member_id
                );
                continue;
            };
            loans.push(Loan::from_row(row, book.clone(), member.clone())?);
        }
        Ok(loans)
    }
}
