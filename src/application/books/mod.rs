//! Catalog operations on books.

pub mod commands;
pub mod queries;
pub mod validators;

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::ports::{MessagePublisher, TelemetrySink};
use crate::application::repos::RepoError;
use crate::cache::{ResilientCache, keys};
use crate::domain::books::Book;

pub use commands::{CreateBook, DeleteBook, UpdateBook, UploadBookCover};
pub use queries::{GetAllBooks, GetBookById};

pub const TOPIC_BOOK_CREATED: &str = "book-created";
pub const TOPIC_BOOK_UPDATED: &str = "book-updated";
pub const TOPIC_BOOK_DELETED: &str = "book-deleted";

/// Read model returned by queries and cached as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookResponse {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub published_year: i32,
    pub cover_image_url: Option<String>,
}

impl From<&Book> for BookResponse {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id(),
            title: book.title().to_string(),
            author: book.author().to_string(),
            isbn: book.isbn().to_string(),
            published_year: book.published_year(),
            cover_image_url: book.cover_image_url().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookCreatedEvent {
    pub book_id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub published_year: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookUpdatedEvent {
    pub book_id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub published_year: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDeletedEvent {
    pub book_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
}

/// What a mutation does when its change notification cannot be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishFailurePolicy {
    /// Report the failure to the caller; the change itself stays committed.
    #[default]
    Fail,
    /// Log and report success.
    Warn,
}

/// Side effects shared by every book mutation.
#[derive(Clone)]
pub struct BookEffects {
    cache: ResilientCache,
    publisher: Arc<dyn MessagePublisher>,
    telemetry: Arc<dyn TelemetrySink>,
    on_publish_failure: PublishFailurePolicy,
}

impl BookEffects {
    pub fn new(
        cache: ResilientCache,
        publisher: Arc<dyn MessagePublisher>,
        telemetry: Arc<dyn TelemetrySink>,
        on_publish_failure: PublishFailurePolicy,
    ) -> Self {
        Self {
            cache,
            publisher,
            telemetry,
            on_publish_failure,
        }
    }

    /// Persist a change and evict every key it makes stale.
    ///
    /// Runs as a detached task so a caller going away cannot split the write
    /// from its invalidation. Nothing is evicted if persisting fails.
    pub async fn commit<F>(&self, book_id: Uuid, persist: F) -> Result<(), AppError>
    where
        F: Future<Output = Result<(), RepoError>> + Send + 'static,
    {
        let cache = self.cache.clone();
        let task = tokio::spawn(async move {
            persist.await?;
            let stale = keys::book_dependents(book_id);
            join_all(stale.iter().map(|key| cache.remove(key))).await;
            Ok::<(), RepoError>(())
        });

        match task.await {
            Ok(result) => result.map_err(AppError::from),
            Err(err) => Err(AppError::unexpected(format!(
                "book {book_id} mutation task aborted: {err}"
            ))),
        }
    }

    /// Deliver a change notification according to the configured policy.
    pub async fn announce<E: Serialize>(&self, topic: &'static str, event: &E) -> Result<(), AppError> {
        let payload = serde_json::to_value(event)
            .map_err(|err| AppError::unexpected(format!("encode `{topic}` event: {err}")))?;

        match self.publisher.publish(topic, &payload).await {
            Ok(()) => {
                info!(topic, "change notification published");
                Ok(())
            }
            Err(err) => {
                self.telemetry
                    .track_exception(&err, &[("Topic", topic.to_string())]);
                match self.on_publish_failure {
                    PublishFailurePolicy::Fail => Err(AppError::Publish { topic, source: err }),
                    PublishFailurePolicy::Warn => {
                        warn!(topic, error = %err, "change notification dropped");
                        Ok(())
                    }
                }
            }
        }
    }

    pub fn track(&self, name: &str, properties: &[(&str, String)]) {
        self.telemetry.track_event(name, properties);
    }

    pub fn measure(&self, name: &str, value: f64) {
        self.telemetry.track_metric(name, value);
    }
}
