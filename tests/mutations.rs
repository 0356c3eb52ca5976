mod support;

use bytes::Bytes;
use shelfmark::application::books::{
    CreateBook, DeleteBook, GetAllBooks, GetBookById, PublishFailurePolicy, TOPIC_BOOK_CREATED,
    TOPIC_BOOK_DELETED, TOPIC_BOOK_UPDATED, UpdateBook, UploadBookCover,
};
use shelfmark::application::error::AppError;
use shelfmark::application::pipeline::OperationContext;
use shelfmark::application::ports::BlobStorage;
use support::Harness;
use uuid::Uuid;

fn clean_architecture() -> CreateBook {
    CreateBook {
        title: "Clean Architecture".to_string(),
        author: "Robert C. Martin".to_string(),
        isbn: "9780134494166".to_string(),
        published_year: 2017,
    }
}

fn book_keys(id: Uuid) -> Vec<String> {
    vec![format!("books:{id}"), "books:all".to_string()]
}

async fn create(harness: &Harness) -> Uuid {
    harness
        .catalog
        .send(&clean_architecture(), &OperationContext::detached())
        .await
        .expect("create book")
}

#[tokio::test]
async fn created_book_is_readable_without_cover() {
    let harness = Harness::default();
    let id = create(&harness).await;

    let book = harness
        .catalog
        .send(&GetBookById { id }, &OperationContext::detached())
        .await
        .expect("query")
        .expect("book exists");

    assert_eq!(book.id, id);
    assert_eq!(book.title, "Clean Architecture");
    assert_eq!(book.published_year, 2017);
    assert_eq!(book.cover_image_url, None);

    let json = serde_json::to_value(&book).expect("json");
    assert!(json["coverImageUrl"].is_null());
    assert_eq!(json["publishedYear"], 2017);
}

#[tokio::test]
async fn create_invalidates_both_keys_and_publishes() {
    let harness = Harness::default();
    let id = create(&harness).await;

    let mut removed = harness.store.calls_of("remove");
    removed.sort();
    let mut expected = book_keys(id);
    expected.sort();
    assert_eq!(removed, expected);

    let sent = harness.publisher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, TOPIC_BOOK_CREATED);
    assert_eq!(sent[0].1["bookId"], id.to_string());
    assert_eq!(sent[0].1["title"], "Clean Architecture");
    assert_eq!(harness.telemetry.events(), vec!["BookCreated"]);
}

#[tokio::test]
async fn duplicate_isbn_is_a_conflict_and_announces_nothing() {
    let harness = Harness::default();
    let ctx = OperationContext::detached();
    let first = create(&harness).await;
    harness.store.clear();

    let err = harness
        .catalog
        .send(&clean_architecture(), &ctx)
        .await
        .expect_err("duplicate isbn");
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(err.status_code().as_u16(), 409);

    let other = harness
        .catalog
        .send(
            &CreateBook {
                title: "The Clean Coder".to_string(),
                author: "Robert C. Martin".to_string(),
                isbn: "9780137081073".to_string(),
                published_year: 2011,
            },
            &ctx,
        )
        .await
        .expect("distinct isbn");
    harness.store.clear();

    let err = harness
        .catalog
        .send(
            &UpdateBook {
                id: other,
                title: "The Clean Coder".to_string(),
                author: "Robert C. Martin".to_string(),
                isbn: "9780134494166".to_string(),
                published_year: 2011,
            },
            &ctx,
        )
        .await
        .expect_err("isbn taken by another book");
    assert!(matches!(err, AppError::Conflict(_)));

    assert!(harness.store.calls_of("remove").is_empty());
    assert_eq!(
        harness.publisher.topics(),
        vec![TOPIC_BOOK_CREATED, TOPIC_BOOK_CREATED]
    );
    let books = harness.catalog.send(&GetAllBooks, &ctx).await.expect("list");
    assert_eq!(books.len(), 2);
    assert!(books.iter().any(|book| book.id == first));
}

#[tokio::test]
async fn repeated_list_within_ttl_skips_the_repository() {
    let harness = Harness::default();
    let ctx = OperationContext::detached();
    let first = create(&harness).await;
    let second = harness
        .catalog
        .send(
            &CreateBook {
                title: "Domain-Driven Design".to_string(),
                author: "Eric Evans".to_string(),
                isbn: "0321125215".to_string(),
                published_year: 2003,
            },
            &ctx,
        )
        .await
        .expect("create second book");

    let listed = harness.catalog.send(&GetAllBooks, &ctx).await.expect("list");
    let mut ids: Vec<Uuid> = listed.iter().map(|book| book.id).collect();
    ids.sort();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(ids, expected);
    assert_eq!(harness.books.lists(), 1);

    let again = harness.catalog.send(&GetAllBooks, &ctx).await.expect("list");
    assert_eq!(again, listed);
    assert_eq!(harness.books.lists(), 1);
}

#[tokio::test]
async fn cached_list_is_refreshed_after_update() {
    let harness = Harness::default();
    let ctx = OperationContext::detached();
    let id = create(&harness).await;

    let before = harness.catalog.send(&GetAllBooks, &ctx).await.expect("list");
    assert_eq!(before[0].title, "Clean Architecture");
    // Second read is a hit.
    harness.catalog.send(&GetAllBooks, &ctx).await.expect("list");
    assert_eq!(harness.store.calls_of("set"), vec!["books:all"]);

    harness.store.clear();
    let updated = harness
        .catalog
        .send(
            &UpdateBook {
                id,
                title: "Clean Architecture, 2nd ed.".to_string(),
                author: "Robert C. Martin".to_string(),
                isbn: "9780134494166".to_string(),
                published_year: 2018,
            },
            &ctx,
        )
        .await
        .expect("update");
    assert!(updated);
    assert_eq!(harness.store.calls_of("remove").len(), 2);

    let after = harness.catalog.send(&GetAllBooks, &ctx).await.expect("list");
    assert_eq!(after[0].title, "Clean Architecture, 2nd ed.");
    assert_eq!(after[0].published_year, 2018);
    assert_eq!(
        harness.publisher.topics(),
        vec![TOPIC_BOOK_CREATED, TOPIC_BOOK_UPDATED]
    );
}

#[tokio::test]
async fn missing_book_mutations_touch_nothing() {
    let harness = Harness::default();
    let ctx = OperationContext::detached();
    let id = Uuid::new_v4();

    let deleted = harness
        .catalog
        .send(&DeleteBook { id }, &ctx)
        .await
        .expect("delete");
    assert!(!deleted);

    let updated = harness
        .catalog
        .send(
            &UpdateBook {
                id,
                title: "Ghost".to_string(),
                author: "Nobody".to_string(),
                isbn: "0134494164".to_string(),
                published_year: 2000,
            },
            &ctx,
        )
        .await
        .expect("update");
    assert!(!updated);

    assert!(harness.store.calls_of("remove").is_empty());
    assert!(harness.publisher.topics().is_empty());
    assert!(harness.telemetry.events().is_empty());
}

#[tokio::test]
async fn delete_removes_book_and_its_cache_entries() {
    let harness = Harness::default();
    let ctx = OperationContext::detached();
    let id = create(&harness).await;
    harness
        .catalog
        .send(&GetBookById { id }, &ctx)
        .await
        .expect("warm cache");
    harness.store.clear();

    assert!(harness.catalog.send(&DeleteBook { id }, &ctx).await.expect("delete"));

    let mut removed = harness.store.calls_of("remove");
    removed.sort();
    let mut expected = book_keys(id);
    expected.sort();
    assert_eq!(removed, expected);
    assert!(
        harness
            .catalog
            .send(&GetBookById { id }, &ctx)
            .await
            .expect("query")
            .is_none()
    );
    assert_eq!(
        harness.publisher.topics(),
        vec![TOPIC_BOOK_CREATED, TOPIC_BOOK_DELETED]
    );
}

#[tokio::test]
async fn failed_publish_is_reported_but_change_is_kept() {
    let harness = Harness::new(PublishFailurePolicy::Fail);
    harness.publisher.fail(true);
    let ctx = OperationContext::detached();

    let result = harness.catalog.send(&clean_architecture(), &ctx).await;
    let Err(err) = result else {
        panic!("publish failure should surface");
    };
    assert!(matches!(err, AppError::Publish { topic, .. } if topic == TOPIC_BOOK_CREATED));
    assert_eq!(err.status_code().as_u16(), 502);
    assert_eq!(harness.telemetry.exceptions(), 1);
    assert!(harness.telemetry.events().is_empty());

    let books = harness.catalog.send(&GetAllBooks, &ctx).await.expect("list");
    assert_eq!(books.len(), 1);
    assert_eq!(harness.store.calls_of("remove").len(), 2);
}

#[tokio::test]
async fn warn_policy_swallows_publish_failures() {
    let harness = Harness::new(PublishFailurePolicy::Warn);
    harness.publisher.fail(true);

    let id = create(&harness).await;
    assert!(!id.is_nil());
    assert_eq!(harness.telemetry.exceptions(), 1);
    assert_eq!(harness.telemetry.events(), vec!["BookCreated"]);
}

#[tokio::test]
async fn cache_outage_does_not_block_mutations() {
    let harness = Harness::default();
    harness.store.fail(true);
    let ctx = OperationContext::detached();

    let id = create(&harness).await;
    let book = harness
        .catalog
        .send(&GetBookById { id }, &ctx)
        .await
        .expect("query")
        .expect("book exists");
    assert_eq!(book.id, id);
}

#[tokio::test]
async fn uploaded_cover_is_stored_and_linked() {
    let harness = Harness::default();
    let ctx = OperationContext::detached();
    let id = create(&harness).await;
    harness.store.clear();

    let url = harness
        .catalog
        .send(
            &UploadBookCover {
                book_id: id,
                file_name: "front.png".to_string(),
                content_type: "image/png".to_string(),
                data: Bytes::from_static(b"\x89PNG fake"),
            },
            &ctx,
        )
        .await
        .expect("upload")
        .expect("book exists");

    assert_eq!(url, format!("/covers/{id}.png"));
    assert_eq!(harness.store.calls_of("remove").len(), 2);
    assert_eq!(
        harness.telemetry.metrics(),
        vec![("cover_upload_bytes".to_string(), 9.0)]
    );

    let stored = harness
        .blobs
        .download(&format!("{id}.png"))
        .await
        .expect("download")
        .expect("blob exists");
    assert_eq!(stored.data, Bytes::from_static(b"\x89PNG fake"));
    assert_eq!(stored.content_type, "image/png");

    let book = harness
        .catalog
        .send(&GetBookById { id }, &ctx)
        .await
        .expect("query")
        .expect("book exists");
    assert_eq!(book.cover_image_url.as_deref(), Some(url.as_str()));
}

#[tokio::test]
async fn cover_for_missing_book_is_not_stored() {
    let harness = Harness::default();
    let id = Uuid::new_v4();

    let url = harness
        .catalog
        .send(
            &UploadBookCover {
                book_id: id,
                file_name: "front.png".to_string(),
                content_type: "image/png".to_string(),
                data: Bytes::from_static(b"png"),
            },
            &OperationContext::detached(),
        )
        .await
        .expect("upload");

    assert!(url.is_none());
    assert!(
        harness
            .blobs
            .download(&format!("{id}.png"))
            .await
            .expect("download")
            .is_none()
    );
}
