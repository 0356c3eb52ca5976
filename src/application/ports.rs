//! Outbound ports: the collaborators operations talk to besides repositories.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::users::{Role, User};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("message broker rejected `{topic}`: {reason}")]
    Rejected { topic: String, reason: String },
    #[error("message broker unreachable: {0}")]
    Transport(String),
}

/// Sends integration events to whatever sits downstream of the catalog.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &Value) -> Result<(), PublishError>;
}

/// Business telemetry, separate from tracing output.
pub trait TelemetrySink: Send + Sync {
    fn track_event(&self, name: &str, properties: &[(&str, String)]);

    fn track_metric(&self, name: &str, value: f64);

    fn track_exception(&self, error: &(dyn std::error::Error + 'static), properties: &[(&str, String)]);
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid blob name `{0}`")]
    InvalidName(String),
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub content_type: String,
    pub data: Bytes,
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store `data` under `name`, replacing any previous blob, and return its public URL.
    async fn upload(&self, name: &str, content_type: &str, data: Bytes) -> Result<String, BlobError>;

    async fn download(&self, name: &str) -> Result<Option<StoredBlob>, BlobError>;
}

#[derive(Debug, Error)]
#[error("password could not be hashed: {0}")]
pub struct HashError(pub String);

/// Slow, salted password hashing. Calls block; run them off the async runtime.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, HashError>;

    fn verify(&self, password: &str, encoded: &str) -> bool;
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is invalid: {0}")]
    Invalid(String),
    #[error("token has expired")]
    Expired,
    #[error("token could not be issued: {0}")]
    Issue(String),
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// Identity carried by a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user: &User) -> Result<IssuedToken, TokenError>;

    fn verify(&self, token: &str) -> Result<Principal, TokenError>;
}
