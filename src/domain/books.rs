//! The book aggregate.
//!
//! Fields are private: a book changes only through [`Book::update`] and
//! [`Book::set_cover_image`], both of which stamp `updated_at`.

use time::OffsetDateTime;
use uuid::Uuid;

/// Editable descriptive fields shared by create and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookDetails {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub published_year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    id: Uuid,
    details: BookDetails,
    cover_image_url: Option<String>,
    created_at: OffsetDateTime,
    updated_at: Option<OffsetDateTime>,
}

/// Stored shape of a book, used by repositories to rebuild the aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSnapshot {
    pub id: Uuid,
    pub details: BookDetails,
    pub cover_image_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: Option<OffsetDateTime>,
}

impl Book {
    /// New book with a fresh identifier and no cover.
    pub fn create(details: BookDetails, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            details,
            cover_image_url: None,
            created_at: now,
            updated_at: None,
        }
    }

    pub fn restore(snapshot: BookSnapshot) -> Self {
        Self {
            id: snapshot.id,
            details: snapshot.details,
            cover_image_url: snapshot.cover_image_url,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        }
    }

    pub fn update(&mut self, details: BookDetails, now: OffsetDateTime) {
        self.details = details;
        self.updated_at = Some(now);
    }

    pub fn set_cover_image(&mut self, url: impl Into<String>, now: OffsetDateTime) {
        self.cover_image_url = Some(url.into());
        self.updated_at = Some(now);
    }

    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            id: self.id,
            details: self.details.clone(),
            cover_image_url: self.cover_image_url.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.details.title
    }

    pub fn author(&self) -> &str {
        &self.details.author
    }

    pub fn isbn(&self) -> &str {
        &self.details.isbn
    }

    pub fn published_year(&self) -> i32 {
        self.details.published_year
    }

    pub fn details(&self) -> &BookDetails {
        &self.details
    }

    pub fn cover_image_url(&self) -> Option<&str> {
        self.cover_image_url.as_deref()
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<OffsetDateTime> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn details(title: &str) -> BookDetails {
        BookDetails {
            title: title.to_string(),
            author: "Robert C. Martin".to_string(),
            isbn: "9780134494166".to_string(),
            published_year: 2017,
        }
    }

    #[test]
    fn create_starts_without_cover_or_update_stamp() {
        let book = Book::create(details("Clean Architecture"), datetime!(2024-01-01 0:00 UTC));
        assert_eq!(book.cover_image_url(), None);
        assert_eq!(book.updated_at(), None);
        assert!(!book.id().is_nil());
    }

    #[test]
    fn update_replaces_details_and_stamps_time() {
        let mut book = Book::create(details("Draft"), datetime!(2024-01-01 0:00 UTC));
        let id = book.id();
        book.update(details("Clean Architecture"), datetime!(2024-02-01 0:00 UTC));

        assert_eq!(book.id(), id);
        assert_eq!(book.title(), "Clean Architecture");
        assert_eq!(book.updated_at(), Some(datetime!(2024-02-01 0:00 UTC)));
    }

    #[test]
    fn cover_is_recorded_and_survives_snapshot() {
        let mut book = Book::create(details("Clean Architecture"), datetime!(2024-01-01 0:00 UTC));
        book.set_cover_image("/covers/abc.png", datetime!(2024-03-01 0:00 UTC));

        let restored = Book::restore(book.snapshot());
        assert_eq!(restored, book);
        assert_eq!(restored.cover_image_url(), Some("/covers/abc.png"));
    }
}
