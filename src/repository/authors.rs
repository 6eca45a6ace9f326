//! Authors repository

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use super::{fetch_distinct, EntityRepository};
use crate::{
    error::AppResult,
    models::{Author, AuthorRow},
    store::{AuthorFilter, RowStore, Store, Tables},
};

#[derive(Clone)]
pub struct AuthorsRepository {
    store: Arc<dyn Store>,
}

impl AuthorsRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Case-insensitive lookup by email
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<Author>> {
        let filter = AuthorFilter {
            email: Some(email.trim().to_string()),
        };
        let rows = self.store.authors().find_all(&filter).await?;
        rows.into_iter().next().map(Author::from_row).transpose()
    }

    /// Load authors by id, each id fetched once; missing ids are absent from the map
    pub(crate) async fn load_many(
        &self,
        tables: &dyn Tables,
        ids: impl IntoIterator<Item = i32> + Send,
    ) -> AppResult<HashMap<i32, Author>> {
        let rows = fetch_distinct(tables.authors(), ids.into_iter().collect()).await?;
        let mut authors = HashMap::with_capacity(rows.len());
        for row in rows {
            let author = Author::from_row(row)?;
            if let Some(id) = author.id() {
                authors.insert(id, author);
            }
        }
        Ok(authors)
    }
}

#[async_trait]
impl EntityRepository<Author> for AuthorsRepository {
    type Row = AuthorRow;

    const KIND: &'static str = "Author";

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    fn rows<'t>(&self, tables: &'t dyn Tables) -> &'t dyn RowStore<AuthorRow> {
        tables.authors()
    }

    fn entity_id(author: &Author) -> Option<i32> {
        author.id()
    }

    fn to_row(author: &Author) -> AppResult<AuthorRow> {
        Ok(author.to_row())
    }

    async fn hydrate(&self, _tables: &dyn Tables, row: AuthorRow) -> AppResult<Author> {
        Author::from_row(row)
    }

    async fn hydrate_all(&self, _tables: &dyn Tables, rows: Vec<AuthorRow>) -> AppResult<Vec<Author>> {
        rows.into_iter().map(Author::from_row).collect()
    }
}
