//! Repository layer: rows in, hydrated entities out

pub mod authors;
pub mod books;
pub mod loans;
pub mod members;

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    store::{MemoryStore, PgStore, RowStore, Store, StoredRow, Tables, Transaction},
};

/// Main repository struct holding the store and one repository per entity
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn Store>,
    pub authors: authors::AuthorsRepository,
    pub books: books::BooksRepository,
    pub members: members::MembersRepository,
    pub loans: loans::LoansRepository,
}

impl Repository {
    /// Create a new repository over the given store
    pub fn new(store: Arc<dyn Store>) -> Self {
        let authors = authors::AuthorsRepository::new(store.clone());
        let books = books::BooksRepository::new(store.clone(), authors.clone());
        let members = members::MembersRepository::new(store.clone());
        let loans = loans::LoansRepository::new(store.clone(), books.clone(), members.clone());

        Self {
            store,
            authors,
            books,
            members,
            loans,
        }
    }

    /// Repository backed by PostgreSQL
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self::new(Arc::new(PgStore::new(pool)))
    }

    /// Repository backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Open a transaction on the underlying store
    pub async fn begin(&self) -> AppResult<Box<dyn Transaction>> {
        self.store.begin().await
    }
}

/// Mapping between one entity type and its table.
///
/// Implementors supply the row conversion and hydration; the CRUD operations
/// come for free. Every operation has an `*_in` variant taking the [`Tables`]
/// to run against, so the same code works inside a transaction.
#[async_trait]
pub trait EntityRepository<E>: Send + Sync
where
    E: Send + Sync + 'static,
{
    type Row: StoredRow;

    /// Entity name used in error messages
    const KIND: &'static str;

    fn store(&self) -> &dyn Store;

    fn rows<'t>(&self, tables: &'t dyn Tables) -> &'t dyn RowStore<Self::Row>;

    fn entity_id(entity: &E) -> Option<i32>;

    fn to_row(entity: &E) -> AppResult<Self::Row>;

    /// Rebuild one entity, failing when a referenced row is missing
    async fn hydrate(&self, tables: &dyn Tables, row: Self::Row) -> AppResult<E>;

    /// Rebuild many entities, dropping rows whose references are missing
    async fn hydrate_all(&self, tables: &dyn Tables, rows: Vec<Self::Row>) -> AppResult<Vec<E>>;

    async fn find_by_id(&self, id: i32) -> AppResult<Option<E>> {
        self.find_by_id_in(self.store().tables(), id).await
    }

    async fn find_by_id_in(&self, tables: &dyn Tables, id: i32) -> AppResult<Option<E>> {
        match self.rows(tables).find_by_id(id).await? {
            Some(row) => Ok(Some(self.hydrate(tables, row).await?)),
            None => Ok(None),
        }
    }

    /// Like `find_by_id`, with a `NotFound` error instead of `None`
    async fn get_by_id(&self, id: i32) -> AppResult<E> {
        self.get_by_id_in(self.store().tables(), id).await
    }

    async fn get_by_id_in(&self, tables: &dyn Tables, id: i32) -> AppResult<E> {
        self.find_by_id_in(tables, id)
            .await?
            .ok_or_else(|| AppError::not_found(Self::KIND, id))
    }

    async fn find_all(&self) -> AppResult<Vec<E>> {
        self.find_all_in(self.store().tables()).await
    }

    async fn find_all_in(&self, tables: &dyn Tables) -> AppResult<Vec<E>> {
        let filter: <Self::Row as StoredRow>::Filter = Default::default();
        let rows = self.rows(tables).find_all(&filter).await?;
        self.hydrate_all(tables, rows).await
    }

    /// Persist a transient entity and return it with its assigned id
    async fn create(&self, entity: &E) -> AppResult<E> {
        self.create_in(self.store().tables(), entity).await
    }

    async fn create_in(&self, tables: &dyn Tables, entity: &E) -> AppResult<E> {
        let row = Self::to_row(entity)?;
        let saved = self.rows(tables).insert(&row).await?;
        self.hydrate(tables, saved).await
    }

    async fn update(&self, entity: &E) -> AppResult<E> {
        self.update_in(self.store().tables(), entity).await
    }

    async fn update_in(&self, tables: &dyn Tables, entity: &E) -> AppResult<E> {
        let id = Self::entity_id(entity).ok_or_else(|| {
            AppError::Validation(format!("Cannot update a {} that was never saved", Self::KIND))
        })?;
        let row = Self::to_row(entity)?;
        let saved = self
            .rows(tables)
            .update(&row)
            .await?
            .ok_or_else(|| AppError::not_found(Self::KIND, id))?;
        self.hydrate(tables, saved).await
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        self.delete_in(self.store().tables(), id).await
    }

    async fn delete_in(&self, tables: &dyn Tables, id: i32) -> AppResult<()> {
        match self.rows(tables).delete(id).await? {
            0 => Err(AppError::not_found(Self::KIND, id)),
            _ => Ok(()),
        }
    }
}

/// Fetch each distinct id once, skipping ids with no row
pub(crate) async fn fetch_distinct<R: StoredRow>(
    rows: &dyn RowStore<R>,
    ids: BTreeSet<i32>,
) -> AppResult<Vec<R>> {
    let mut found = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(row) = rows.find_by_id(id).await? {
            found.push(row);
        }
    }
    Ok(found)
}
