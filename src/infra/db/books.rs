use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{BooksRepo, RepoError},
    domain::books::{Book, BookDetails, BookSnapshot},
};

use super::{PostgresRepositories, map_sqlx_error};

const BOOK_COLUMNS: &str =
    "id, title, author, isbn, published_year, cover_image_url, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct BookRow {
    id: Uuid,
    title: String,
    author: String,
    isbn: String,
    published_year: i32,
    cover_image_url: Option<String>,
    created_at: OffsetDateTime,
    updated_at: Option<OffsetDateTime>,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Book::restore(BookSnapshot {
            id: row.id,
            details: BookDetails {
                title: row.title,
                author: row.author,
                isbn: row.isbn,
                published_year: row.published_year,
            },
            cover_image_url: row.cover_image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl BooksRepo for PostgresRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Book>, RepoError> {
        let row = sqlx::query_as::<_, BookRow>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Book::from))
    }

    async fn list(&self) -> Result<Vec<Book>, RepoError> {
        let rows = sqlx::query_as::<_, BookRow>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY created_at DESC, id"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Book::from).collect())
    }

    async fn add(&self, book: &Book) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO books
                (id, title, author, isbn, published_year, cover_image_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(book.id())
        .bind(book.title())
        .bind(book.author())
        .bind(book.isbn())
        .bind(book.published_year())
        .bind(book.cover_image_url())
        .bind(book.created_at())
        .bind(book.updated_at())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update(&self, book: &Book) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET title = $2,
                author = $3,
                isbn = $4,
                published_year = $5,
                cover_image_url = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(book.id())
        .bind(book.title())
        .bind(book.author())
        .bind(book.isbn())
        .bind(book.published_year())
        .bind(book.cover_image_url())
        .bind(book.updated_at())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
