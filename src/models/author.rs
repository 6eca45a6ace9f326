//! Author model and related types

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::{from_millis, now_millis, optional_text, required_text, to_millis, valid_email};
use crate::error::AppResult;

/// Author row as persisted in the `authors` table
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AuthorRow {
    pub id: Option<i32>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub bio: Option<String>,
    pub created_at: i64,
}

/// Author entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    id: Option<i32>,
    first_name: String,
    last_name: String,
    email: String,
    bio: Option<String>,
    created_at: DateTime<Utc>,
}

impl Author {
    /// Create a transient author (no id until persisted)
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
            bio: None,
            created_at: now_millis(),
        })
    }

    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = optional_text(Some(bio.into()));
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

    pub fn bio(&self) -> Option<&str> {
        self.bio.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
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

    pub fn set_bio(&mut self, bio: Option<String>) {
        self.bio = optional_text(bio);
    }

    pub fn to_row(&self) -> AuthorRow {
        AuthorRow {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            bio: self.bio.clone(),
            created_at: to_millis(self.created_at),
        }
    }

    pub fn from_row(row: AuthorRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            bio: row.bio,
            created_at: from_millis(row.created_at)?,
        })
    }
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.full_name(), self.email)
    }
}
