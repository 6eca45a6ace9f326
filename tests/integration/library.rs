//! Catalog and membership rules

use elidune_lending::{
    models::{Author, Book, BookKind, Member},
    store::MemoryStore,
    AppError, ErrorKind,
};

use crate::common::{add_author, add_book, add_member, services};

#[tokio::test]
async fn test_duplicate_member_email_is_rejected() {
    let services = services(&MemoryStore::new());
    add_member(&services, "John", "a@b.com").await;

    let twin = Member::new("Jane", "Doe", "a@b.com").unwrap();
    let err = services.library.register_member(&twin).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains("a@b.com"));

    // Email comparison ignores case
    let shouting = Member::new("Jane", "Doe", "A@B.com").unwrap();
    let err = services.library.register_member(&shouting).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert_eq!(services.library.list_members().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_author_email_is_rejected() {
    let services = services(&MemoryStore::new());
    add_author(&services, "Frank", "Herbert", "frank@dune.org").await;

    let copy = Author::new("Brian", "Herbert", "frank@dune.org").unwrap();
    let err = services.library.add_author(&copy).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_created_entities_round_trip() {
    let services = services(&MemoryStore::new());
    let author = Author::new("Ursula", "Le Guin", "ursula@earthsea.org")
        .unwrap()
        .with_bio("Wrote Earthsea");
    let author = services.library.add_author(&author).await.unwrap();
    assert_eq!(services.library.get_author(author.id().unwrap()).await.unwrap(), author);

    let ebook = Book::new_ebook("A Wizard of Earthsea", "9780547773742", author.clone(), "epub", 1.5)
        .unwrap()
        .with_publication_year(1968)
        .with_genre("Fantasy");
    let ebook = services.library.add_book(&ebook).await.unwrap();
    let loaded = services.library.get_book(ebook.id().unwrap()).await.unwrap();
    assert_eq!(loaded, ebook);
    assert_eq!(loaded.author(), &author);
    assert!(matches!(loaded.kind(), BookKind::EBook(details) if details.format == "EPUB"));
    assert!(loaded.info().ends_with("- EBook (EPUB, 1.5 MB)"));

    let member = Member::new("Ged", "Sparrowhawk", "ged@roke.org")
        .unwrap()
        .with_phone("555-0100");
    let member = services.library.register_member(&member).await.unwrap();
    assert_eq!(services.library.get_member(member.id().unwrap()).await.unwrap(), member);
}

#[tokio::test]
async fn test_add_book_requires_existing_author() {
    let services = services(&MemoryStore::new());

    let transient = Author::new("Frank", "Herbert", "frank@dune.org").unwrap();
    let book = Book::new("Dune", "0441013597", transient).unwrap();
    let err = services.library.add_book(&book).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let author = add_author(&services, "Frank", "Herbert", "frank@dune.org").await;
    services.library.remove_author(author.id().unwrap()).await.unwrap();
    let book = Book::new("Dune", "0441013597", author).unwrap();
    let err = services.library.add_book(&book).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { kind: "Author", .. }));
}

#[tokio::test]
async fn test_duplicate_isbn_is_rejected() {
    let services = services(&MemoryStore::new());
    let author = add_author(&services, "Frank", "Herbert", "frank@dune.org").await;
    add_book(&services, "Dune", "0441013597", &author).await;

    let copy = Book::new("Dune (copy)", "0441013597", author).unwrap();
    let err = services.library.add_book(&copy).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_find_and_list_books() {
    let services = services(&MemoryStore::new());
    let herbert = add_author(&services, "Frank", "Herbert", "frank@dune.org").await;
    let le_guin = add_author(&services, "Ursula", "Le Guin", "ursula@earthsea.org").await;
    let dune = add_book(&services, "Dune", "0441013597", &herbert).await;
    add_book(&services, "The Dispossessed", "0061054887", &le_guin).await;
    let member = add_member(&services, "John", "john@example.com").await;

    let found = services.library.find_book_by_isbn("0441013597").await.unwrap();
    assert_eq!(found.as_ref().and_then(|b| b.id()), dune.id());
    assert!(services.library.find_book_by_isbn("0000000000").await.unwrap().is_none());

    let by_herbert = services
        .library
        .list_books_by_author(herbert.id().unwrap())
        .await
        .unwrap();
    assert_eq!(by_herbert.len(), 1);
    assert_eq!(by_herbert[0].title(), "Dune");
    let err = services.library.list_books_by_author(999).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    services
        .loans
        .borrow_book(dune.id().unwrap(), member.id().unwrap())
        .await
        .unwrap();
    let available = services.library.list_available_books().await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].title(), "The Dispossessed");
    assert_eq!(services.library.list_books().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_update_book_leaves_availability_alone() {
    let services = services(&MemoryStore::new());
    let author = add_author(&services, "Frank", "Herbert", "frank@dune.org").await;
    let book = add_book(&services, "Dune", "0441013597", &author).await;
    let member = add_member(&services, "John", "john@example.com").await;

    // Stale copy fetched while the book was still on the shelf
    let mut stale = services.library.get_book(book.id().unwrap()).await.unwrap();
    services
        .loans
        .borrow_book(book.id().unwrap(), member.id().unwrap())
        .await
        .unwrap();

    stale.set_title("Dune (50th anniversary)").unwrap();
    let updated = services.library.update_book(&stale).await.unwrap();
    assert_eq!(updated.title(), "Dune (50th anniversary)");
    assert!(!updated.is_available());
}

#[tokio::test]
async fn test_update_author_checks_email_against_others() {
    let services = services(&MemoryStore::new());
    let mut frank = add_author(&services, "Frank", "Herbert", "frank@dune.org").await;
    add_author(&services, "Brian", "Herbert", "brian@dune.org").await;

    frank.set_bio(Some("Created Arrakis".to_string()));
    let updated = services.library.update_author(&frank).await.unwrap();
    assert_eq!(updated.id(), frank.id());
    assert_eq!(updated.bio(), Some("Created Arrakis"));

    frank.set_email("brian@dune.org").unwrap();
    let err = services.library.update_author(&frank).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let transient = Author::new("New", "Author", "new@example.com").unwrap();
    let err = services.library.update_author(&transient).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_update_member() {
    let services = services(&MemoryStore::new());
    let mut member = add_member(&services, "John", "john@example.com").await;
    add_member(&services, "Jane", "jane@example.com").await;

    member.set_phone(Some("555-0199".to_string()));
    let updated = services.library.update_member(&member).await.unwrap();
    assert_eq!(updated.phone(), Some("555-0199"));
    assert_eq!(updated.member_since(), member.member_since());

    member.set_email("JANE@example.com").unwrap();
    let err = services.library.update_member(&member).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_remove_book_refused_while_on_loan() {
    let services = services(&MemoryStore::new());
    let author = add_author(&services, "Frank", "Herbert", "frank@dune.org").await;
    let book = add_book(&services, "Dune", "0441013597", &author).await;
    let member = add_member(&services, "John", "john@example.com").await;
    let book_id = book.id().unwrap();
    let loan = services
        .loans
        .borrow_book(book_id, member.id().unwrap())
        .await
        .unwrap();

    let err = services.library.remove_book(book_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    services.loans.return_book(loan.id().unwrap()).await.unwrap();
    services.library.remove_book(book_id).await.unwrap();

    let err = services.library.get_book(book_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = services.loans.get_loan(loan.id().unwrap()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_remove_member_refused_with_active_loans() {
    let services = services(&MemoryStore::new());
    let author = add_author(&services, "Frank", "Herbert", "frank@dune.org").await;
    let book = add_book(&services, "Dune", "0441013597", &author).await;
    let member = add_member(&services, "John", "john@example.com").await;
    let member_id = member.id().unwrap();
    let loan = services
        .loans
        .borrow_book(book.id().unwrap(), member_id)
        .await
        .unwrap();

    let err = services.library.remove_member(member_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    services.loans.return_book(loan.id().unwrap()).await.unwrap();
    services.library.remove_member(member_id).await.unwrap();
    assert!(services.library.list_members().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_author_takes_books_along() {
    let services = services(&MemoryStore::new());
    let author = add_author(&services, "Frank", "Herbert", "frank@dune.org").await;
    add_book(&services, "Dune", "0441013597", &author).await;
    add_book(&services, "Dune Messiah", "0441172695", &author).await;

    services.library.remove_author(author.id().unwrap()).await.unwrap();

    assert!(services.library.list_books().await.unwrap().is_empty());
    let err = services.library.remove_author(author.id().unwrap()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { kind: "Author", .. }));
}

#[tokio::test]
async fn test_listings_follow_insertion_order() {
    let services = services(&MemoryStore::new());
    let le_guin = add_author(&services, "Ursula", "Le Guin", "ursula@earthsea.org").await;
    let banks = add_author(&services, "Iain", "Banks", "iain@culture.org").await;
    add_book(&services, "The Dispossessed", "0061054887", &le_guin).await;
    add_book(&services, "Consider Phlebas", "0316005371", &banks).await;

    let authors = services.library.list_authors().await.unwrap();
    let names: Vec<_> = authors.iter().map(|a| a.last_name()).collect();
    assert_eq!(names, ["Le Guin", "Banks"]);

    let books = services.library.list_books().await.unwrap();
    let titles: Vec<_> = books.iter().map(|b| b.title()).collect();
    assert_eq!(titles, ["The Dispossessed", "Consider Phlebas"]);
}
