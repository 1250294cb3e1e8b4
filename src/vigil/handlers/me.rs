//! Profile of the authenticated caller. Mounted behind `require_auth`.

use crate::auth::{error::ErrorBody, AuthError, AuthenticatedIdentity, Coordinator, PublicUser};
use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MeResponse {
    pub success: bool,
    pub user: PublicUser,
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses (
        (status = 200, description = "Authenticated user profile", body = MeResponse),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(
    identity: AuthenticatedIdentity,
    coordinator: Extension<Arc<Coordinator>>,
) -> Result<Json<MeResponse>, AuthError> {
    let user = coordinator.profile(&identity).await?;
    Ok(Json(MeResponse {
        success: true,
        user,
    }))
}
