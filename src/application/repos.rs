//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::books::Book;
use crate::domain::users::User;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[async_trait]
pub trait BooksRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Book>, RepoError>;

    /// All books, newest first.
    async fn list(&self) -> Result<Vec<Book>, RepoError>;

    async fn add(&self, book: &Book) -> Result<(), RepoError>;

    /// Persist changes to an existing book. Fails with `NotFound` if it is gone.
    async fn update(&self, book: &Book) -> Result<(), RepoError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError>;

    /// Lookup by normalized (lower-case) email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;

    async fn exists(&self, email: &str) -> Result<bool, RepoError>;

    async fn add(&self, user: &User) -> Result<(), RepoError>;
}
