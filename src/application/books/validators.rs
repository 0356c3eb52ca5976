//! Rule sets for book commands.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::application::pipeline::validation::{Rules, ValidationFailure, Validator};
use crate::util::bytes::format_bytes;
use crate::util::clock::Clock;

use super::commands::{CreateBook, UpdateBook, UploadBookCover};

pub const TITLE_MAX_CHARS: usize = 200;
pub const AUTHOR_MAX_CHARS: usize = 100;
pub const ISBN_MAX_CHARS: usize = 20;
pub const EARLIEST_PUBLISHED_YEAR: i32 = 1450;
pub const COVER_CONTENT_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

static ISBN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{10}|\d{13}|[\d-]{13,17})$").expect("ISBN pattern is valid")
});

fn book_rules(
    rules: &mut Rules,
    title: &str,
    author: &str,
    isbn: &str,
    published_year: i32,
    current_year: i32,
) {
    rules
        .required("Title", title, "Title is required")
        .max_chars(
            "Title",
            title,
            TITLE_MAX_CHARS,
            format!("Title must not exceed {TITLE_MAX_CHARS} characters"),
        )
        .required("Author", author, "Author is required")
        .max_chars(
            "Author",
            author,
            AUTHOR_MAX_CHARS,
            format!("Author must not exceed {AUTHOR_MAX_CHARS} characters"),
        )
        .required("ISBN", isbn, "ISBN is required")
        .max_chars(
            "ISBN",
            isbn,
            ISBN_MAX_CHARS,
            format!("ISBN must not exceed {ISBN_MAX_CHARS} characters"),
        );

    if !isbn.is_empty() {
        rules.check(
            "ISBN",
            ISBN_PATTERN.is_match(isbn),
            "ISBN must be a valid format (10 or 13 digits)",
        );
    }

    rules.check(
        "PublishedYear",
        (EARLIEST_PUBLISHED_YEAR..=current_year).contains(&published_year),
        format!("Published year must be between {EARLIEST_PUBLISHED_YEAR} and {current_year}"),
    );
}

pub struct CreateBookValidator {
    clock: Arc<dyn Clock>,
}

impl CreateBookValidator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Validator<CreateBook> for CreateBookValidator {
    fn validate(&self, op: &CreateBook) -> Vec<ValidationFailure> {
        let mut rules = Rules::new();
        book_rules(
            &mut rules,
            &op.title,
            &op.author,
            &op.isbn,
            op.published_year,
            self.clock.current_year(),
        );
        rules.finish()
    }
}

pub struct UpdateBookValidator {
    clock: Arc<dyn Clock>,
}

impl UpdateBookValidator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Validator<UpdateBook> for UpdateBookValidator {
    fn validate(&self, op: &UpdateBook) -> Vec<ValidationFailure> {
        let mut rules = Rules::new();
        rules.check("Id", !op.id.is_nil(), "Book ID is required");
        book_rules(
            &mut rules,
            &op.title,
            &op.author,
            &op.isbn,
            op.published_year,
            self.clock.current_year(),
        );
        rules.finish()
    }
}

pub struct UploadBookCoverValidator {
    max_bytes: u64,
}

impl UploadBookCoverValidator {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

impl Validator<UploadBookCover> for UploadBookCoverValidator {
    fn validate(&self, op: &UploadBookCover) -> Vec<ValidationFailure> {
        let content_type = op.content_type.to_ascii_lowercase();
        let mut rules = Rules::new();
        rules
            .check("File", !op.data.is_empty(), "No file uploaded")
            .check(
                "ContentType",
                COVER_CONTENT_TYPES.contains(&content_type.as_str()),
                "Invalid file type. Allowed: JPEG, PNG, GIF, WebP",
            )
            .check(
                "File",
                op.data.len() as u64 <= self.max_bytes,
                format!("File size exceeds {} limit", format_bytes(self.max_bytes)),
            );
        rules.finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use time::macros::datetime;
    use uuid::Uuid;

    use crate::util::clock::ManualClock;

    use super::*;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(datetime!(2025-06-15 12:00 UTC)))
    }

    fn create(isbn: &str, year: i32) -> CreateBook {
        CreateBook {
            title: "Clean Architecture".to_string(),
            author: "Robert C. Martin".to_string(),
            isbn: isbn.to_string(),
            published_year: year,
        }
    }

    fn fields(failures: &[ValidationFailure]) -> Vec<&str> {
        failures.iter().map(|f| f.field.as_str()).collect()
    }

    #[test]
    fn valid_command_passes() {
        let validator = CreateBookValidator::new(clock());
        assert!(validator.validate(&create("9780134494166", 2017)).is_empty());
    }

    #[test]
    fn accepted_isbn_shapes() {
        let validator = CreateBookValidator::new(clock());
        for isbn in ["9780134494166", "0134494164", "978-0-13-449416-6"] {
            assert!(
                validator.validate(&create(isbn, 2017)).is_empty(),
                "{isbn} should be accepted"
            );
        }
    }

    #[test]
    fn rejected_isbn_shapes() {
        let validator = CreateBookValidator::new(clock());
        for isbn in ["123", "abcdefghij", "12345678901234567890", "97801344941"] {
            let failures = validator.validate(&create(isbn, 2017));
            assert!(fields(&failures).contains(&"ISBN"), "{isbn} should be rejected");
        }
    }

    #[test]
    fn empty_isbn_reports_required_only() {
        let failures = CreateBookValidator::new(clock()).validate(&create("", 2017));
        assert_eq!(failures, vec![ValidationFailure::new("ISBN", "ISBN is required")]);
    }

    #[test]
    fn published_year_boundaries() {
        let validator = CreateBookValidator::new(clock());
        assert!(!validator.validate(&create("9780134494166", 1449)).is_empty());
        assert!(validator.validate(&create("9780134494166", 1450)).is_empty());
        assert!(validator.validate(&create("9780134494166", 2025)).is_empty());

        let failures = validator.validate(&create("9780134494166", 2026));
        assert_eq!(
            failures,
            vec![ValidationFailure::new(
                "PublishedYear",
                "Published year must be between 1450 and 2025"
            )]
        );
    }

    #[test]
    fn length_limits_are_inclusive() {
        let validator = CreateBookValidator::new(clock());
        let mut op = create("9780134494166", 2017);
        op.title = "t".repeat(200);
        op.author = "a".repeat(100);
        assert!(validator.validate(&op).is_empty());

        op.title.push('t');
        op.author.push('a');
        let failures = validator.validate(&op);
        assert_eq!(fields(&failures), vec!["Title", "Author"]);
        assert!(failures[0].message.contains("200"));
        assert!(failures[1].message.contains("100"));
    }

    #[test]
    fn update_requires_id() {
        let validator = UpdateBookValidator::new(clock());
        let op = UpdateBook {
            id: Uuid::nil(),
            title: "Clean Architecture".to_string(),
            author: "Robert C. Martin".to_string(),
            isbn: "9780134494166".to_string(),
            published_year: 2017,
        };
        assert_eq!(
            validator.validate(&op),
            vec![ValidationFailure::new("Id", "Book ID is required")]
        );
    }

    #[test]
    fn cover_type_and_size_are_checked() {
        let validator = UploadBookCoverValidator::new(4);
        let mut op = UploadBookCover {
            book_id: Uuid::new_v4(),
            file_name: "cover.bmp".to_string(),
            content_type: "image/bmp".to_string(),
            data: Bytes::from_static(b"12345"),
        };
        let failures = validator.validate(&op);
        assert_eq!(fields(&failures), vec!["ContentType", "File"]);

        op.content_type = "IMAGE/PNG".to_string();
        op.data = Bytes::from_static(b"1234");
        assert!(validator.validate(&op).is_empty());

        op.data = Bytes::new();
        assert_eq!(fields(&validator.validate(&op)), vec!["File"]);
    }
}
