//! Loan lifecycle through the loan service

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use elidune_lending::{
    config::LoanPolicy,
    models::LoanStatus,
    repository::Repository,
    store::MemoryStore,
    AppError, ErrorKind, Services,
};
use rust_decimal::Decimal;

use crate::common::{add_author, add_book, add_member, services};

async fn library_with_one_book() -> (Services, i32, i32) {
    let services = services(&MemoryStore::new());
    let author = add_author(&services, "Frank", "Herbert", "frank@dune.org").await;
    let book = add_book(&services, "Dune", "0441013597", &author).await;
    let member = add_member(&services, "John", "john@example.com").await;
    (services, book.id().unwrap(), member.id().unwrap())
}

#[tokio::test]
async fn test_borrow_takes_book_off_the_shelf() {
    let (services, book_id, member_id) = library_with_one_book().await;

    let loan = services.loans.borrow_book(book_id, member_id).await.unwrap();

    assert!(loan.id().is_some());
    assert!(loan.is_active());
    assert!(!loan.book().is_available());
    assert_eq!(loan.member().id(), Some(member_id));
    assert_eq!(loan.due_date() - loan.loan_date(), Duration::days(14));
    assert_eq!(loan.status(), LoanStatus::Active);

    let book = services.library.get_book(book_id).await.unwrap();
    assert!(!book.is_available());
    assert!(services.library.list_available_books().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_borrow_uses_configured_duration() {
    let store = MemoryStore::new();
    let policy = LoanPolicy {
        duration_days: 21,
        daily_fine: Decimal::ONE,
    };
    let services = Services::new(Repository::new(Arc::new(store)), policy);
    let author = add_author(&services, "Frank", "Herbert", "frank@dune.org").await;
    let book = add_book(&services, "Dune", "0441013597", &author).await;
    let member = add_member(&services, "John", "john@example.com").await;

    let loan = services
        .loans
        .borrow_book(book.id().unwrap(), member.id().unwrap())
        .await
        .unwrap();
    assert_eq!(loan.due_date() - loan.loan_date(), Duration::days(21));
}

#[tokio::test]
async fn test_borrow_unavailable_book_changes_nothing() {
    let (services, book_id, member_id) = library_with_one_book().await;
    let other = add_member(&services, "Jane", "jane@example.com").await;
    services.loans.borrow_book(book_id, member_id).await.unwrap();

    let err = services
        .loans
        .borrow_book(book_id, other.id().unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains("not available for borrowing"));
    assert_eq!(services.loans.get_active_loans().await.unwrap().len(), 1);
    assert!(services
        .loans
        .get_member_loans(other.id().unwrap())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_borrow_reports_which_entity_is_missing() {
    let (services, book_id, member_id) = library_with_one_book().await;

    let err = services.loans.borrow_book(99, member_id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { kind: "Book", id: 99 }));

    let err = services.loans.borrow_book(book_id, 77).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { kind: "Member", id: 77 }));

    assert!(services.library.get_book(book_id).await.unwrap().is_available());
}

#[tokio::test]
async fn test_return_puts_book_back() {
    let (services, book_id, member_id) = library_with_one_book().await;
    let loan = services.loans.borrow_book(book_id, member_id).await.unwrap();

    let returned = services.loans.return_book(loan.id().unwrap()).await.unwrap();

    assert!(returned.is_returned());
    assert!(returned.book().is_available());
    assert_eq!(returned.status(), LoanStatus::Returned);
    assert!(services.library.get_book(book_id).await.unwrap().is_available());
    assert!(services.loans.get_active_loans().await.unwrap().is_empty());

    // The book can go out again
    services.loans.borrow_book(book_id, member_id).await.unwrap();
    assert_eq!(services.loans.get_book_loans(book_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_return_twice_is_a_conflict() {
    let (services, book_id, member_id) = library_with_one_book().await;
    let loan = services.loans.borrow_book(book_id, member_id).await.unwrap();
    let loan_id = loan.id().unwrap();

    let first = services.loans.return_book(loan_id).await.unwrap();
    let err = services.loans.return_book(loan_id).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains("already been returned"));
    let stored = services.loans.get_loan(loan_id).await.unwrap();
    assert_eq!(stored.return_date(), first.return_date());
}

#[tokio::test]
async fn test_return_unknown_loan() {
    let (services, _, _) = library_with_one_book().await;
    let err = services.loans.return_book(42).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { kind: "Loan", id: 42 }));
}

#[tokio::test]
async fn test_overdue_loans_and_fines() {
    let (services, book_id, member_id) = library_with_one_book().await;
    let author = services.library.list_authors().await.unwrap().remove(0);
    let second = add_book(&services, "Children of Dune", "0441104029", &author).await;

    let loan_date = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    let now = loan_date + Duration::days(19);
    let late = services
        .loans
        .borrow_book_on(book_id, member_id, loan_date)
        .await
        .unwrap();
    services
        .loans
        .borrow_book_on(second.id().unwrap(), member_id, now - Duration::days(2))
        .await
        .unwrap();

    let overdue = services.loans.get_overdue_loans_at(now).await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id(), late.id());
    assert_eq!(overdue[0].status_at(now).to_string(), "Overdue ($2.50 fine)");

    let half = Decimal::new(50, 2);
    assert_eq!(
        services.loans.calculate_total_fines_at(Some(half), now).await.unwrap(),
        Decimal::new(250, 2)
    );
    assert_eq!(
        services.loans.calculate_total_fines_at(None, now).await.unwrap(),
        Decimal::new(250, 2)
    );
    assert_eq!(
        services
            .loans
            .calculate_total_fines_at(Some(Decimal::ONE), now)
            .await
            .unwrap(),
        Decimal::from(5)
    );
    // Per-loan report line at a configured rate agrees with the total
    assert_eq!(overdue[0].days_overdue_at(now), 5);
    assert_eq!(
        overdue[0].calculate_fine_at(Decimal::ONE, now).unwrap(),
        Decimal::from(5)
    );
}

#[tokio::test]
async fn test_returned_loans_are_not_overdue() {
    let (services, book_id, member_id) = library_with_one_book().await;
    let loan_date = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    let loan = services
        .loans
        .borrow_book_on(book_id, member_id, loan_date)
        .await
        .unwrap();
    services.loans.return_book(loan.id().unwrap()).await.unwrap();

    let later = loan_date + Duration::days(60);
    assert!(services.loans.get_overdue_loans_at(later).await.unwrap().is_empty());
    assert_eq!(
        services.loans.calculate_total_fines_at(None, later).await.unwrap(),
        Decimal::ZERO
    );
}

#[tokio::test]
async fn test_member_loan_listings() {
    let (services, book_id, member_id) = library_with_one_book().await;
    let loan = services.loans.borrow_book(book_id, member_id).await.unwrap();
    services.loans.return_book(loan.id().unwrap()).await.unwrap();
    services.loans.borrow_book(book_id, member_id).await.unwrap();

    let history = services.loans.get_member_loans(member_id).await.unwrap();
    assert_eq!(history.len(), 2);
    let active = services.loans.get_member_active_loans(member_id).await.unwrap();
    assert_eq!(active.len(), 1);
    assert!(active[0].is_active());

    let err = services.loans.get_member_loans(500).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = services.loans.get_book_loans(500).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_borrows_only_one_wins() {
    let (services, book_id, first) = library_with_one_book().await;
    let second = add_member(&services, "Jane", "jane@example.com").await.id().unwrap();

    let a = {
        let services = services.clone();
        tokio::spawn(async move { services.loans.borrow_book(book_id, first).await })
    };
    let b = {
        let services = services.clone();
        tokio::spawn(async move { services.loans.borrow_book(book_id, second).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(loser.kind(), ErrorKind::Conflict);
    assert_eq!(services.loans.get_active_loans().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_out_of_range_fine_rate_is_rejected() {
    let (services, book_id, member_id) = library_with_one_book().await;
    let loan_date = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    services
        .loans
        .borrow_book_on(book_id, member_id, loan_date)
        .await
        .unwrap();
    let now = loan_date + Duration::days(17);

    let err = services
        .loans
        .calculate_total_fines_at(Some(Decimal::MAX), now)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = services
        .loans
        .calculate_total_fines_at(Some(Decimal::new(-1, 0)), now)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_borrow_with_invalid_duration_writes_nothing() {
    let policy = LoanPolicy {
        duration_days: 0,
        daily_fine: Decimal::ONE,
    };
    let services = Services::new(Repository::new(Arc::new(MemoryStore::new())), policy);
    let author = add_author(&services, "Frank", "Herbert", "frank@dune.org").await;
    let book = add_book(&services, "Dune", "0441013597", &author).await;
    let member = add_member(&services, "John", "john@example.com").await;

    let err = services
        .loans
        .borrow_book(book.id().unwrap(), member.id().unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(services.library.get_book(book.id().unwrap()).await.unwrap().is_available());
    assert!(services.loans.get_active_loans().await.unwrap().is_empty());
}
