pub mod health;
pub mod login;
pub mod me;
pub mod refresh;
pub mod register;

// shared by the register and login handlers
use crate::auth::{AuthError, AuthSession, PublicUser, ValidationResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthResponse {
    pub success: bool,
    pub user: PublicUser,
    pub token: String,
}

impl From<AuthSession> for AuthResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            success: true,
            user: session.user,
            token: session.token,
        }
    }
}

/// Body that is missing or not JSON at all; field-level problems are
/// reported by the coordinator instead.
pub(crate) fn unreadable_body() -> AuthError {
    let mut result = ValidationResult::new();
    result.push("Request body must be a JSON object");
    AuthError::Validation(result)
}
