//! In-process repositories used when no database is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::repos::{BooksRepo, RepoError, UsersRepo};
use crate::domain::books::Book;
use crate::domain::users::User;

#[derive(Default)]
pub struct InMemoryRepositories {
    books: RwLock<HashMap<Uuid, Book>>,
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BooksRepo for InMemoryRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Book>, RepoError> {
        Ok(self.books.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Book>, RepoError> {
        let mut books: Vec<Book> = self.books.read().await.values().cloned().collect();
        books.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.id().cmp(&b.id()))
        });
        Ok(books)
    }

    async fn add(&self, book: &Book) -> Result<(), RepoError> {
        let mut books = self.books.write().await;
        if books.contains_key(&book.id()) {
            return Err(RepoError::Duplicate {
                constraint: "books_pkey".to_string(),
            });
        }
        ensure_unique_isbn(&books, book)?;
        books.insert(book.id(), book.clone());
        Ok(())
    }

    async fn update(&self, book: &Book) -> Result<(), RepoError> {
        let mut books = self.books.write().await;
        if books.contains_key(&book.id()) {
            ensure_unique_isbn(&books, book)?;
        }
        match books.get_mut(&book.id()) {
            Some(slot) => {
                *slot = book.clone();
                Ok(())
            }
            None => Err(RepoError::NotFound),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
        Ok(self.books.write().await.remove(&id).is_some())
    }
}

fn ensure_unique_isbn(books: &HashMap<Uuid, Book>, book: &Book) -> Result<(), RepoError> {
    let taken = books
        .values()
        .any(|other| other.id() != book.id() && other.isbn() == book.isbn());
    if taken {
        return Err(RepoError::Duplicate {
            constraint: "books_isbn_key".to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl UsersRepo for InMemoryRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn exists(&self, email: &str) -> Result<bool, RepoError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .any(|user| user.email == email))
    }

    async fn add(&self, user: &User) -> Result<(), RepoError> {
        let mut users = self.users.write().await;
        if users.values().any(|existing| existing.email == user.email) {
            return Err(RepoError::Duplicate {
                constraint: "users_email_key".to_string(),
            });
        }
        users.insert(user.id, user.clone());
        Ok(())
    }
}
