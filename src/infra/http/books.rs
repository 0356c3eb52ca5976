//! Book endpoints.

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::books::{
    BookResponse, CreateBook, DeleteBook, GetAllBooks, GetBookById, UpdateBook, UploadBookCover,
};
use crate::application::error::AppError;
use crate::application::pipeline::OperationContext;

use super::HttpState;
use super::auth::{AdminUser, AuthUser};
use super::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBook {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub published_year: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverUploaded {
    pub image_url: String,
}

pub async fn list_books(State(state): State<HttpState>) -> Result<Json<Vec<BookResponse>>, ApiError> {
    let (_guard, ctx) = OperationContext::scoped();
    let books = state.catalog.send(&GetAllBooks, &ctx).await?;
    Ok(Json(books))
}

pub async fn get_book(
    State(state): State<HttpState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookResponse>, ApiError> {
    let (_guard, ctx) = OperationContext::scoped();
    match state.catalog.send(&GetBookById { id }, &ctx).await? {
        Some(book) => Ok(Json(book)),
        None => Err(ApiError::not_found(format!("Book with ID {id} not found"))),
    }
}

pub async fn create_book(
    State(state): State<HttpState>,
    _admin: AdminUser,
    Json(command): Json<CreateBook>,
) -> Result<Response, ApiError> {
    let (_guard, ctx) = OperationContext::scoped();
    let id = state.catalog.send(&command, &ctx).await?;

    let mut response = (StatusCode::CREATED, Json(CreatedBook { id })).into_response();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/books/{id}")) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

pub async fn update_book(
    State(state): State<HttpState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateBookRequest>,
) -> Result<StatusCode, ApiError> {
    if body.id.is_some_and(|body_id| body_id != id) {
        return Err(ApiError::bad_request("ID mismatch"));
    }

    let command = UpdateBook {
        id,
        title: body.title,
        author: body.author,
        isbn: body.isbn,
        published_year: body.published_year,
    };
    let (_guard, ctx) = OperationContext::scoped();
    if state.catalog.send(&command, &ctx).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("Book with ID {id} not found")))
    }
}

pub async fn delete_book(
    State(state): State<HttpState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let (_guard, ctx) = OperationContext::scoped();
    if state.catalog.send(&DeleteBook { id }, &ctx).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("Book with ID {id} not found")))
    }
}

pub async fn upload_cover(
    State(state): State<HttpState>,
    _caller: AuthUser,
    Path(book_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<CoverUploaded>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(format!("invalid multipart payload: {err}")))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|err| ApiError::bad_request(format!("failed to read upload: {err}")))?;
            upload = Some(UploadBookCover {
                book_id,
                file_name,
                content_type,
                data,
            });
            break;
        }
    }

    let command = upload.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
    let (_guard, ctx) = OperationContext::scoped();
    match state.catalog.send(&command, &ctx).await? {
        Some(image_url) => Ok(Json(CoverUploaded { image_url })),
        None => Err(ApiError::not_found(format!("Book with ID {book_id} not found"))),
    }
}

pub async fn download_cover(
    State(state): State<HttpState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let blob = state
        .blobs
        .download(&name)
        .await
        .map_err(|err| ApiError::from(AppError::from(err)))?
        .ok_or_else(|| ApiError::not_found("Cover not found"))?;

    let mut response = blob.data.into_response();
    if let Ok(content_type) = HeaderValue::from_str(&blob.content_type) {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }
    Ok(response)
}
