//! Library member model

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::{from_millis, now_millis, optional_text, required_text, to_millis, valid_email};
use crate::error::AppResult;

/// Member row as persisted in the `members` table
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct MemberRow {
    pub id: Option<i32>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub member_since: i64,
}

/// Member entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    id: Option<i32>,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    member_since: DateTime<Utc>,
}

impl Member {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> AppResult<Self> {
        Ok(Self {
            id: None,
            first_name: required_text("First name", first_name)?,
            last_name: required_text("Last name", last_name)?,
            email: valid_email(email)?,
            phone: None,
            member_since: now_millis(),
        })
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = optional_text(Some(phone.into()));
        self
    }

    pub fn id(&self) -> Option<i32> {
        self.id
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn member_since(&self) -> DateTime<Utc> {
        self.member_since
    }

    pub fn set_first_name(&mut self, first_name: impl Into<String>) -> AppResult<()> {
        self.first_name = required_text("First name", first_name)?;
        Ok(())
    }

    pub fn set_last_name(&mut self, last_name: impl Into<String>) -> AppResult<()> {
        self.last_name = required_text("Last name", last_name)?;
        Ok(())
    }

    pub fn set_email(&mut self, email: impl Into<String>) -> AppResult<()> {
        self.email = valid_email(email)?;
        Ok(())
    }

    pub fn set_phone(&mut self, phone: Option<String>) {
        self.phone = optional_text(phone);
    }

    pub fn to_row(&self) -> MemberRow {
        MemberRow {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            member_since: to_millis(self.member_since),
        }
    }

    pub fn from_row(row: MemberRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            member_since: from_millis(row.member_since)?,
        })
    }
}

impl std::fmt::Display for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.full_name(), self.email)
    }
}
