//! Registration, login and identity endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::auth::{
    CurrentUserResponse, GetCurrentUser, Login, RegisterAdmin, RegisterUser, RegisteredUser,
    Registration,
};
use crate::application::pipeline::OperationContext;

use super::HttpState;
use super::auth::{AdminUser, AuthUser};
use super::error::ApiError;

/// Login result as sent to the client, token included.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginTokenResponse {
    pub token: String,
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

pub async fn register(
    State(state): State<HttpState>,
    Json(registration): Json<Registration>,
) -> Result<(StatusCode, Json<RegisteredUser>), ApiError> {
    let (_guard, ctx) = OperationContext::scoped();
    let user = state
        .catalog
        .send(&RegisterUser(registration), &ctx)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn register_admin(
    State(state): State<HttpState>,
    _admin: AdminUser,
    Json(registration): Json<Registration>,
) -> Result<(StatusCode, Json<RegisteredUser>), ApiError> {
    let (_guard, ctx) = OperationContext::scoped();
    let user = state
        .catalog
        .send(&RegisterAdmin(registration), &ctx)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<HttpState>,
    Json(command): Json<Login>,
) -> Result<Json<LoginTokenResponse>, ApiError> {
    let (_guard, ctx) = OperationContext::scoped();
    let session = state.catalog.send(&command, &ctx).await?;
    Ok(Json(LoginTokenResponse {
        token: session.token,
        user_id: session.user_id,
        email: session.email,
        full_name: session.full_name,
        expires_at: session.expires_at,
    }))
}

pub async fn me(
    State(state): State<HttpState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<CurrentUserResponse>, ApiError> {
    let (_guard, ctx) = OperationContext::scoped();
    let query = GetCurrentUser {
        user_id: principal.user_id,
    };
    state
        .catalog
        .send(&query, &ctx)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))
}
