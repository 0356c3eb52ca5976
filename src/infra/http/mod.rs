//! HTTP surface over the catalog pipelines.

mod accounts;
mod auth;
mod books;
mod error;
mod middleware;

pub use error::{ApiError, ApiErrorBody, ApiErrorMessage};
pub use middleware::{REQUEST_ID_HEADER, RequestContext};

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::application::catalog::Catalog;
use crate::application::error::ErrorReport;
use crate::application::ports::{BlobStorage, TokenIssuer};
use crate::infra::db::PostgresRepositories;

/// Multipart framing on top of the cover payload itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct HttpState {
    pub catalog: Arc<Catalog>,
    pub tokens: Arc<dyn TokenIssuer>,
    pub blobs: Arc<dyn BlobStorage>,
    pub db: Option<PostgresRepositories>,
    pub max_cover_bytes: u64,
}

pub fn build_router(state: HttpState) -> Router {
    let upload_limit = usize::try_from(state.max_cover_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/books",
            get(books::list_books).post(books::create_book),
        )
        .route(
            "/api/books/{id}",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route(
            "/api/books/{id}/cover",
            post(books::upload_cover).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/covers/{name}", get(books::download_cover))
        .route("/api/auth/register", post(accounts::register))
        .route("/api/auth/register-admin", post(accounts::register_admin))
        .route("/api/auth/login", post(accounts::login))
        .route("/api/auth/me", get(accounts::me))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

async fn health(State(state): State<HttpState>) -> Response {
    let Some(db) = state.db.as_ref() else {
        return StatusCode::NO_CONTENT.into_response();
    };
    match db.health_check().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
