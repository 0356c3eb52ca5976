use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::pipeline::{Handler, Operation, OperationContext};
use crate::application::ports::{PasswordHasher, TokenIssuer};
use crate::application::repos::UsersRepo;
use crate::domain::users::{Role, User, normalize_email};
use crate::util::clock::Clock;

use super::{EMAIL_TAKEN, INVALID_CREDENTIALS};

/// Sign-up details shared by user and admin registration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegisterUser(pub Registration);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegisterAdmin(pub Registration);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUser {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

impl Operation for RegisterUser {
    type Output = RegisteredUser;
    const NAME: &'static str = "RegisterUser";
}

impl Operation for RegisterAdmin {
    type Output = RegisteredUser;
    const NAME: &'static str = "RegisterAdmin";
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Login {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Login")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Serialized form omits the token so it never reaches debug logs.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(skip)]
    pub token: String,
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Operation for Login {
    type Output = LoginResponse;
    const NAME: &'static str = "Login";
}

pub struct RegisterHandler {
    users: Arc<dyn UsersRepo>,
    hasher: Arc<dyn PasswordHasher>,
    clock: Arc<dyn Clock>,
}

impl RegisterHandler {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        hasher: Arc<dyn PasswordHasher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            hasher,
            clock,
        }
    }

    async fn register(
        &self,
        registration: &Registration,
        role: Role,
        ctx: &OperationContext,
    ) -> Result<RegisteredUser, AppError> {
        let email = normalize_email(&registration.email);
        let taken = ctx
            .run(async { self.users.exists(&email).await.map_err(AppError::from) })
            .await?;
        if taken {
            return Err(AppError::Conflict(EMAIL_TAKEN.to_string()));
        }

        let hasher = Arc::clone(&self.hasher);
        let password = registration.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|err| AppError::unexpected(format!("password hashing task failed: {err}")))?
            .map_err(|err| AppError::unexpected(err.to_string()))?;

        let user = User::register(
            &email,
            password_hash,
            registration.first_name.trim(),
            registration.last_name.trim(),
            role,
            self.clock.now(),
        );
        ctx.run(async { self.users.add(&user).await.map_err(AppError::from) })
            .await
            .map_err(|err| match err {
                AppError::Conflict(_) => AppError::Conflict(EMAIL_TAKEN.to_string()),
                other => other,
            })?;

        Ok(RegisteredUser {
            user_id: user.id,
            email: user.email.clone(),
            full_name: user.full_name(),
            role: user.role,
        })
    }
}

#[async_trait]
impl Handler<RegisterUser> for RegisterHandler {
    async fn handle(
        &self,
        op: &RegisterUser,
        ctx: &OperationContext,
    ) -> Result<RegisteredUser, AppError> {
        self.register(&op.0, Role::User, ctx).await
    }
}

#[async_trait]
impl Handler<RegisterAdmin> for RegisterHandler {
    async fn handle(
        &self,
        op: &RegisterAdmin,
        ctx: &OperationContext,
    ) -> Result<RegisteredUser, AppError> {
        self.register(&op.0, Role::Admin, ctx).await
    }
}

pub struct LoginHandler {
    users: Arc<dyn UsersRepo>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenIssuer>,
}

impl LoginHandler {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
        }
    }
}

#[async_trait]
impl Handler<Login> for LoginHandler {
    async fn handle(&self, op: &Login, ctx: &OperationContext) -> Result<LoginResponse, AppError> {
        let email = normalize_email(&op.email);
        let user = ctx
            .run(async { self.users.find_by_email(&email).await.map_err(AppError::from) })
            .await?;

        let Some(user) = user else {
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        };
        let hasher = Arc::clone(&self.hasher);
        let password = op.password.clone();
        let encoded = user.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || hasher.verify(&password, &encoded))
            .await
            .map_err(|err| AppError::unexpected(format!("password check task failed: {err}")))?;
        if !verified {
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        }

        let issued = self.tokens.issue(&user)?;
        Ok(LoginResponse {
            token: issued.token,
            user_id: user.id,
            email: user.email.clone(),
            full_name: user.full_name(),
            expires_at: issued.expires_at,
        })
    }
}
