use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::pipeline::{Handler, Operation, OperationContext};
use crate::application::repos::UsersRepo;
use crate::domain::users::Role;

/// Profile of the caller identified by a verified token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCurrentUser {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUserResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub role: Role,
}

impl Operation for GetCurrentUser {
    /// `None` when the account behind the token no longer exists.
    type Output = Option<CurrentUserResponse>;
    const NAME: &'static str = "GetCurrentUser";
}

pub struct GetCurrentUserHandler {
    users: Arc<dyn UsersRepo>,
}

impl GetCurrentUserHandler {
    pub fn new(users: Arc<dyn UsersRepo>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Handler<GetCurrentUser> for GetCurrentUserHandler {
    async fn handle(
        &self,
        op: &GetCurrentUser,
        ctx: &OperationContext,
    ) -> Result<Option<CurrentUserResponse>, AppError> {
        let user = ctx
            .run(async { self.users.find_by_id(op.user_id).await.map_err(AppError::from) })
            .await?;
        Ok(user.map(|user| CurrentUserResponse {
            id: user.id,
            full_name: user.full_name(),
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
        }))
    }
}
