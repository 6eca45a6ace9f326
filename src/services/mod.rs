//! Business logic services

pub mod library;
pub mod loans;

use crate::{config::LoanPolicy, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub library: library::LibraryService,
    pub loans: loans::LoansService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, policy: LoanPolicy) -> Self {
        Self {
            library: library::LibraryService::new(repository.clone()),
            loans: loans::LoansService::new(repository, policy),
        }
    }
}
