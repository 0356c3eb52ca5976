//! Book mutations.
//!
//! Each handler loads or builds the book, commits the change together with
//! cache invalidation, then notifies downstream. A missing book is reported
//! as data (`false` / `None`) and touches neither cache nor publisher.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::pipeline::{Handler, Operation, OperationContext};
use crate::application::ports::BlobStorage;
use crate::application::repos::{BooksRepo, RepoError};
use crate::domain::books::{Book, BookDetails};
use crate::util::clock::Clock;

use super::{
    BookCreatedEvent, BookDeletedEvent, BookEffects, BookUpdatedEvent, TOPIC_BOOK_CREATED,
    TOPIC_BOOK_DELETED, TOPIC_BOOK_UPDATED,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub published_year: i32,
}

impl CreateBook {
    fn details(&self) -> BookDetails {
        BookDetails {
            title: self.title.clone(),
            author: self.author.clone(),
            isbn: self.isbn.clone(),
            published_year: self.published_year,
        }
    }
}

impl Operation for CreateBook {
    type Output = Uuid;
    const NAME: &'static str = "CreateBook";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBook {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub published_year: i32,
}

impl UpdateBook {
    fn details(&self) -> BookDetails {
        BookDetails {
            title: self.title.clone(),
            author: self.author.clone(),
            isbn: self.isbn.clone(),
            published_year: self.published_year,
        }
    }
}

impl Operation for UpdateBook {
    /// `false` when the book does not exist.
    type Output = bool;
    const NAME: &'static str = "UpdateBook";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBook {
    pub id: Uuid,
}

impl Operation for DeleteBook {
    /// `false` when the book does not exist.
    type Output = bool;
    const NAME: &'static str = "DeleteBook";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadBookCover {
    pub book_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    #[serde(skip)]
    pub data: Bytes,
}

impl UploadBookCover {
    /// Blob name for this cover: the book id plus the uploaded file's extension.
    pub fn blob_name(&self) -> String {
        let extension = Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .or_else(|| {
                mime_guess::get_mime_extensions_str(&self.content_type)
                    .and_then(|candidates| candidates.first())
                    .map(|ext| ext.to_string())
            });
        match extension {
            Some(ext) => format!("{}.{ext}", self.book_id),
            None => self.book_id.to_string(),
        }
    }
}

impl Operation for UploadBookCover {
    /// Public URL of the stored cover, `None` when the book does not exist.
    type Output = Option<String>;
    const NAME: &'static str = "UploadBookCover";
}

pub struct CreateBookHandler {
    books: Arc<dyn BooksRepo>,
    effects: BookEffects,
    clock: Arc<dyn Clock>,
}

impl CreateBookHandler {
    pub fn new(books: Arc<dyn BooksRepo>, effects: BookEffects, clock: Arc<dyn Clock>) -> Self {
        Self {
            books,
            effects,
            clock,
        }
    }
}

#[async_trait]
impl Handler<CreateBook> for CreateBookHandler {
    async fn handle(&self, op: &CreateBook, ctx: &OperationContext) -> Result<Uuid, AppError> {
        ctx.ensure_active()?;
        let book = Book::create(op.details(), self.clock.now());
        let id = book.id();

        let repo = Arc::clone(&self.books);
        let record = book.clone();
        self.effects
            .commit(id, async move { repo.add(&record).await })
            .await?;

        let event = BookCreatedEvent {
            book_id: id,
            title: book.title().to_string(),
            author: book.author().to_string(),
            isbn: book.isbn().to_string(),
            published_year: book.published_year(),
            created_at: book.created_at(),
            occurred_at: self.clock.now(),
        };
        self.effects.announce(TOPIC_BOOK_CREATED, &event).await?;

        self.effects.track(
            "BookCreated",
            &[
                ("BookId", id.to_string()),
                ("Title", book.title().to_string()),
                ("Author", book.author().to_string()),
            ],
        );

        Ok(id)
    }
}

pub struct UpdateBookHandler {
    books: Arc<dyn BooksRepo>,
    effects: BookEffects,
    clock: Arc<dyn Clock>,
}

impl UpdateBookHandler {
    pub fn new(books: Arc<dyn BooksRepo>, effects: BookEffects, clock: Arc<dyn Clock>) -> Self {
        Self {
            books,
            effects,
            clock,
        }
    }
}

#[async_trait]
impl Handler<UpdateBook> for UpdateBookHandler {
    async fn handle(&self, op: &UpdateBook, ctx: &OperationContext) -> Result<bool, AppError> {
        let existing = ctx
            .run(async { self.books.find_by_id(op.id).await.map_err(AppError::from) })
            .await?;
        let Some(mut book) = existing else {
            return Ok(false);
        };

        let now = self.clock.now();
        book.update(op.details(), now);

        let repo = Arc::clone(&self.books);
        let record = book.clone();
        match self
            .effects
            .commit(book.id(), async move { repo.update(&record).await })
            .await
        {
            Ok(()) => {}
            Err(AppError::NotFound) => return Ok(false),
            Err(err) => return Err(err),
        }

        let event = BookUpdatedEvent {
            book_id: book.id(),
            title: book.title().to_string(),
            author: book.author().to_string(),
            isbn: book.isbn().to_string(),
            published_year: book.published_year(),
            updated_at: now,
            occurred_at: self.clock.now(),
        };
        self.effects.announce(TOPIC_BOOK_UPDATED, &event).await?;

        self.effects.track(
            "BookUpdated",
            &[
                ("BookId", book.id().to_string()),
                ("Title", book.title().to_string()),
            ],
        );

        Ok(true)
    }
}

pub struct DeleteBookHandler {
    books: Arc<dyn BooksRepo>,
    effects: BookEffects,
    clock: Arc<dyn Clock>,
}

impl DeleteBookHandler {
    pub fn new(books: Arc<dyn BooksRepo>, effects: BookEffects, clock: Arc<dyn Clock>) -> Self {
        Self {
            books,
            effects,
            clock,
        }
    }
}

#[async_trait]
impl Handler<DeleteBook> for DeleteBookHandler {
    async fn handle(&self, op: &DeleteBook, ctx: &OperationContext) -> Result<bool, AppError> {
        let existing = ctx
            .run(async { self.books.find_by_id(op.id).await.map_err(AppError::from) })
            .await?;
        if existing.is_none() {
            return Ok(false);
        }

        let repo = Arc::clone(&self.books);
        let id = op.id;
        let persist = async move {
            if repo.delete(id).await? {
                Ok(())
            } else {
                Err(RepoError::NotFound)
            }
        };
        match self.effects.commit(id, persist).await {
            Ok(()) => {}
            Err(AppError::NotFound) => return Ok(false),
            Err(err) => return Err(err),
        }

        let event = BookDeletedEvent {
            book_id: id,
            occurred_at: self.clock.now(),
        };
        self.effects.announce(TOPIC_BOOK_DELETED, &event).await?;

        self.effects
            .track("BookDeleted", &[("BookId", id.to_string())]);

        Ok(true)
    }
}

pub struct UploadBookCoverHandler {
    books: Arc<dyn BooksRepo>,
    blobs: Arc<dyn BlobStorage>,
    effects: BookEffects,
    clock: Arc<dyn Clock>,
}

impl UploadBookCoverHandler {
    pub fn new(
        books: Arc<dyn BooksRepo>,
        blobs: Arc<dyn BlobStorage>,
        effects: BookEffects,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            books,
            blobs,
            effects,
            clock,
        }
    }
}

#[async_trait]
impl Handler<UploadBookCover> for UploadBookCoverHandler {
    async fn handle(
        &self,
        op: &UploadBookCover,
        ctx: &OperationContext,
    ) -> Result<Option<String>, AppError> {
        let existing = ctx
            .run(async { self.books.find_by_id(op.book_id).await.map_err(AppError::from) })
            .await?;
        let Some(mut book) = existing else {
            return Ok(None);
        };

        let blob_name = op.blob_name();
        let url = ctx
            .run(async {
                self.blobs
                    .upload(&blob_name, &op.content_type, op.data.clone())
                    .await
                    .map_err(AppError::from)
            })
            .await?;

        book.set_cover_image(url.clone(), self.clock.now());

        let repo = Arc::clone(&self.books);
        let record = book.clone();
        match self
            .effects
            .commit(book.id(), async move { repo.update(&record).await })
            .await
        {
            Ok(()) => {}
            Err(AppError::NotFound) => return Ok(None),
            Err(err) => return Err(err),
        }

        self.effects.track(
            "BookCoverUploaded",
            &[
                ("BookId", book.id().to_string()),
                ("Size", op.data.len().to_string()),
            ],
        );
        self.effects
            .measure("cover_upload_bytes", op.data.len() as f64);

        Ok(Some(url))
    }
}
