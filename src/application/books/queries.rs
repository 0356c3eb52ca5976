//! Book reads. Both queries are cacheable.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::pipeline::{Cacheable, Handler, Operation, OperationContext};
use crate::application::repos::BooksRepo;
use crate::cache::{CacheKey, keys};

use super::BookResponse;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetAllBooks;

impl Operation for GetAllBooks {
    type Output = Vec<BookResponse>;
    const NAME: &'static str = "GetAllBooks";
}

impl Cacheable for GetAllBooks {
    fn cache_key(&self) -> CacheKey {
        keys::all_books()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBookById {
    pub id: Uuid,
}

impl Operation for GetBookById {
    type Output = Option<BookResponse>;
    const NAME: &'static str = "GetBookById";
}

impl Cacheable for GetBookById {
    fn cache_key(&self) -> CacheKey {
        keys::book(self.id)
    }

    // Absent books are not cached.
    fn should_cache(&self, output: &Option<BookResponse>) -> bool {
        output.is_some()
    }
}

pub struct GetAllBooksHandler {
    books: Arc<dyn BooksRepo>,
}

impl GetAllBooksHandler {
    pub fn new(books: Arc<dyn BooksRepo>) -> Self {
        Self { books }
    }
}

#[async_trait]
impl Handler<GetAllBooks> for GetAllBooksHandler {
    async fn handle(
        &self,
        _op: &GetAllBooks,
        ctx: &OperationContext,
    ) -> Result<Vec<BookResponse>, AppError> {
        let books = ctx
            .run(async { self.books.list().await.map_err(AppError::from) })
            .await?;
        Ok(books.iter().map(BookResponse::from).collect())
    }
}

pub struct GetBookByIdHandler {
    books: Arc<dyn BooksRepo>,
}

impl GetBookByIdHandler {
    pub fn new(books: Arc<dyn BooksRepo>) -> Self {
        Self { books }
    }
}

#[async_trait]
impl Handler<GetBookById> for GetBookByIdHandler {
    async fn handle(
        &self,
        op: &GetBookById,
        ctx: &OperationContext,
    ) -> Result<Option<BookResponse>, AppError> {
        let book = ctx
            .run(async { self.books.find_by_id(op.id).await.map_err(AppError::from) })
            .await?;
        Ok(book.as_ref().map(BookResponse::from))
    }
}
