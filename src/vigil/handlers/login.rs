use crate::auth::{error::ErrorBody, AuthError, Coordinator};
use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use super::{unreadable_body, AuthResponse};

#[derive(ToSchema, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Authenticated", body = AuthResponse, content_type = "application/json"),
        (status = 400, description = "Missing fields", body = ErrorBody),
        (status = 401, description = "Invalid email or password", body = ErrorBody),
        (status = 500, description = "Internal error", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    coordinator: Extension<Arc<Coordinator>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<AuthResponse>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(unreadable_body());
    };

    let session = coordinator.login(&request.email, &request.password).await?;

    Ok(Json(session.into()))
}
