//! Members repository

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use super::{fetch_distinct, EntityRepository};
use crate::{
    error::AppResult,
    models::{Member, MemberRow},
    store::{MemberFilter, RowStore, Store, Tables},
};

#[derive(Clone)]
pub struct MembersRepository {
    store: Arc<dyn Store>,
}

impl MembersRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Case-insensitive lookup by email
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<Member>> {
        let filter = MemberFilter {
            email: Some(email.trim().to_string()),
        };
        let rows = self.store.members().find_all(&filter).await?;
        rows.into_iter().next().map(Member::from_row).transpose()
    }

    pub(crate) async fn load_many(
        &self,
        tables: &dyn Tables,
        ids: impl IntoIterator<Item = i32> + Send,
    ) -> AppResult<HashMap<i32, Member>> {
        let rows = fetch_distinct(tables.members(), ids.into_iter().collect()).await?;
        let mut members = HashMap::with_capacity(rows.len());
        for row in rows {
            let member = Member::from_row(row)?;
            if let Some(id) = member.id() {
                members.insert(id, member);
            }
        }
        Ok(members)
    }
}

#[async_trait]
impl EntityRepository<Member> for MembersRepository {
    type Row = MemberRow;

    const KIND: &'static str = "Member";

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    fn rows<'t>(&self, tables: &'t dyn Tables) -> &'t dyn RowStore<MemberRow> {
        tables.members()
    }

    fn entity_id(member: &Member) -> Option<i32> {
        member.id()
    }

    fn to_row(member: &Member) -> AppResult<MemberRow> {
        Ok(member.to_row())
    }

    async fn hydrate(&self, _tables: &dyn Tables, row: MemberRow) -> AppResult<Member> {
        Member::from_row(row)
    }

    async fn hydrate_all(&self, _tables: &dyn Tables, rows: Vec<MemberRow>) -> AppResult<Vec<Member>> {
        rows.into_iter().map(Member::from_row).collect()
    }
}
