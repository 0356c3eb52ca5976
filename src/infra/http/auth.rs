use axum::extract::FromRequestParts;
use axum::http::{HeaderValue, header::AUTHORIZATION, request::Parts};

use crate::application::error::AppError;
use crate::application::ports::Principal;

use super::HttpState;
use super::error::ApiError;

/// Caller identified by a valid bearer token; rejects with 401 otherwise.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

impl FromRequestParts<HttpState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &HttpState) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts.headers.get(AUTHORIZATION))
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        let principal = state
            .tokens
            .verify(token)
            .map_err(|err| ApiError::from(AppError::from(err)))?;
        Ok(Self(principal))
    }
}

/// An [`AuthUser`] holding the admin role; rejects with 403 otherwise.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Principal);

impl FromRequestParts<HttpState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &HttpState) -> Result<Self, Self::Rejection> {
        let AuthUser(principal) = AuthUser::from_request_parts(parts, state).await?;
        if principal.is_admin() {
            Ok(Self(principal))
        } else {
            Err(ApiError::forbidden())
        }
    }
}

fn extract_token(header: Option<&HeaderValue>) -> Option<&str> {
    let raw = header?.to_str().ok()?;
    let bearer = raw
        .strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))?;
    let bearer = bearer.trim();
    (!bearer.is_empty()).then_some(bearer)
}
