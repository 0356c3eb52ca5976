use std::collections::BTreeMap;
use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::application::pipeline::validation::ValidationFailure;
use crate::application::ports::{BlobError, PublishError, TokenError};
use crate::application::repos::RepoError;
use crate::{domain::error::DomainError, infra::error::InfraError};

/// Diagnostic chain attached to error responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(RepoError),
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<ValidationFailure>),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden")]
    Forbidden,
    #[error("resource not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("failed to publish `{topic}`")]
    Publish {
        topic: &'static str,
        #[source]
        source: PublishError,
    },
    #[error(transparent)]
    Storage(#[from] BlobError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("operation cancelled")]
    Cancelled,
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

fn summarize(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{}: {}", failure.field, failure.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => AppError::NotFound,
            RepoError::Duplicate { constraint } if constraint == "books_isbn_key" => {
                AppError::Conflict("a book with this ISBN already exists".to_string())
            }
            RepoError::Duplicate { constraint } => {
                AppError::Conflict(format!("duplicate record ({constraint})"))
            }
            other => AppError::Repo(other),
        }
    }
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Domain(DomainError::Validation { .. }) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Repo(RepoError::InvalidInput { .. }) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::Token(TokenError::Invalid(_)) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Token(TokenError::Expired) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound | AppError::Repo(RepoError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::Repo(RepoError::Duplicate { .. }) => {
                StatusCode::CONFLICT
            }
            AppError::Publish { .. } => StatusCode::BAD_GATEWAY,
            AppError::Cancelled
            | AppError::Repo(RepoError::Timeout)
            | AppError::Infra(InfraError::Database { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Domain(DomainError::Invariant { .. })
            | AppError::Infra(_)
            | AppError::Repo(RepoError::Persistence(_))
            | AppError::Storage(_)
            | AppError::Token(TokenError::Issue(_))
            | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "validation_failed",
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::FORBIDDEN => "forbidden",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::CONFLICT => "conflict",
            StatusCode::BAD_GATEWAY => "publish_failed",
            StatusCode::SERVICE_UNAVAILABLE => "unavailable",
            _ => "internal_error",
        }
    }

    /// Message safe to show to clients; internals stay in the error report.
    pub fn presentation_message(&self) -> String {
        match self {
            AppError::Validation(_) => "One or more validation errors occurred".to_string(),
            AppError::Domain(DomainError::Validation { message }) => message.clone(),
            AppError::Repo(RepoError::InvalidInput { message }) => message.clone(),
            AppError::Unauthorized(message) => message.clone(),
            AppError::Token(TokenError::Expired) => "Token has expired".to_string(),
            AppError::Token(TokenError::Invalid(_)) => "Invalid token".to_string(),
            AppError::Forbidden => "Insufficient permissions".to_string(),
            AppError::NotFound | AppError::Repo(RepoError::NotFound) => {
                "Resource not found".to_string()
            }
            AppError::Conflict(message) => message.clone(),
            AppError::Repo(RepoError::Duplicate { .. }) => "Duplicate record".to_string(),
            AppError::Publish { .. } => {
                "The change was saved but downstream notification failed".to_string()
            }
            AppError::Cancelled => "Request was cancelled".to_string(),
            AppError::Repo(RepoError::Timeout) | AppError::Infra(InfraError::Database { .. }) => {
                "Service temporarily unavailable".to_string()
            }
            _ => "An unexpected error occurred".to_string(),
        }
    }

    /// Validation failures grouped by field, in field order.
    pub fn field_errors(&self) -> Option<BTreeMap<String, Vec<String>>> {
        let AppError::Validation(failures) = self else {
            return None;
        };
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for failure in failures {
            grouped
                .entry(failure.field.clone())
                .or_default()
                .push(failure.message.clone());
        }
        Some(grouped)
    }

    /// Outcomes a client can cause; logged as warnings rather than errors.
    pub fn is_expected(&self) -> bool {
        self.status_code().is_client_error()
    }
}
