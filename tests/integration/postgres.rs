//! PostgreSQL store round trips

use chrono::{Duration, Utc};
use elidune_lending::{
    config::LoanPolicy,
    models::{Author, Book, Member},
    repository::Repository,
    store::PgStore,
    ErrorKind, Services,
};
use sqlx::postgres::PgPoolOptions;

/// Connect, migrate, and return services plus a suffix unique to this run
async fn connect() -> (Services, String) {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to database");

    let store = PgStore::new(pool);
    store.migrate().await.expect("Failed to run migrations");

    let suffix = Utc::now().timestamp_micros().to_string();
    let services = Services::new(
        Repository::new(std::sync::Arc::new(store)),
        LoanPolicy::default(),
    );
    (services, suffix)
}

fn isbn(suffix: &str, n: u32) -> String {
    format!("{}{}", suffix, n)
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_postgres_round_trip() {
    let (services, suffix) = connect().await;

    let author = Author::new("Frank", "Herbert", format!("frank{}@dune.org", suffix))
        .unwrap()
        .with_bio("Created Arrakis");
    let author = services.library.add_author(&author).await.unwrap();
    assert_eq!(
        services.library.get_author(author.id().unwrap()).await.unwrap(),
        author
    );

    let book = Book::new_ebook("Dune", isbn(&suffix, 1), author.clone(), "epub", 2.5)
        .unwrap()
        .with_publication_year(1965);
    let book = services.library.add_book(&book).await.unwrap();
    assert_eq!(services.library.get_book(book.id().unwrap()).await.unwrap(), book);

    let member = Member::new("John", "Doe", format!("john{}@example.com", suffix)).unwrap();
    let member = services.library.register_member(&member).await.unwrap();

    let loan = services
        .loans
        .borrow_book(book.id().unwrap(), member.id().unwrap())
        .await
        .unwrap();
    assert_eq!(loan.due_date() - loan.loan_date(), Duration::days(14));
    assert_eq!(services.loans.get_loan(loan.id().unwrap()).await.unwrap(), loan);

    let returned = services.loans.return_book(loan.id().unwrap()).await.unwrap();
    assert!(returned.book().is_available());

    services.library.remove_author(author.id().unwrap()).await.unwrap();
    let err = services.loans.get_loan(loan.id().unwrap()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
#[ignore]
async fn test_postgres_unique_and_unavailable() {
    let (services, suffix) = connect().await;

    let email = format!("a{}@b.com", suffix);
    services
        .library
        .register_member(&Member::new("John", "Doe", email.clone()).unwrap())
        .await
        .unwrap();
    let err = services
        .library
        .register_member(&Member::new("Jane", "Doe", email.to_uppercase()).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let author = Author::new("Ursula", "Le Guin", format!("ursula{}@earthsea.org", suffix)).unwrap();
    let author = services.library.add_author(&author).await.unwrap();
    let book = Book::new("The Dispossessed", isbn(&suffix, 2), author.clone()).unwrap();
    let book = services.library.add_book(&book).await.unwrap();

    let first = Member::new("A", "Reader", format!("first{}@example.com", suffix)).unwrap();
    let first = services.library.register_member(&first).await.unwrap();
    let second = Member::new("B", "Reader", format!("second{}@example.com", suffix)).unwrap();
    let second = services.library.register_member(&second).await.unwrap();

    services
        .loans
        .borrow_book(book.id().unwrap(), first.id().unwrap())
        .await
        .unwrap();
    let err = services
        .loans
        .borrow_book(book.id().unwrap(), second.id().unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(
        services
            .loans
            .get_book_loans(book.id().unwrap())
            .await
            .unwrap()
            .len(),
        1
    );

    services.library.remove_author(author.id().unwrap()).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_postgres_lists_in_insertion_order() {
    let (services, suffix) = connect().await;

    let author = Author::new("Iain", "Banks", format!("iain{}@culture.org", suffix)).unwrap();
    let author = services.library.add_author(&author).await.unwrap();
    for (n, title) in [(3, "Use of Weapons"), (4, "Consider Phlebas")] {
        let book = Book::new(title, isbn(&suffix, n), author.clone()).unwrap();
        services.library.add_book(&book).await.unwrap();
    }

    let books = services
        .library
        .list_books_by_author(author.id().unwrap())
        .await
        .unwrap();
    let titles: Vec<_> = books.iter().map(|b| b.title()).collect();
    assert_eq!(titles, ["Use of Weapons", "Consider Phlebas"]);

    services.library.remove_author(author.id().unwrap()).await.unwrap();
}
