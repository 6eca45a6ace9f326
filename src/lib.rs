//! Elidune Lending
//!
//! The lending core of the Elidune library system: authors, books and
//! e-books, members and loans, with overdue tracking and fines. Entities are
//! persisted through a row store (PostgreSQL or in-memory) and rebuilt into
//! full object graphs by the repository layer.

pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod store;

pub use config::{AppConfig, LoanPolicy};
pub use error::{AppError, AppResult, ErrorKind};
pub use repository::{EntityRepository, Repository};
pub use services::Services;
