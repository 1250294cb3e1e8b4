use crate::auth::{error::ErrorBody, AuthError, Coordinator};
use axum::{extract::Extension, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use super::{unreadable_body, AuthResponse};

// Missing fields deserialize as empty so they surface as validation errors.
#[derive(ToSchema, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses (
        (status = 201, description = "Account created", body = AuthResponse, content_type = "application/json"),
        (status = 400, description = "Invalid fields or weak password", body = ErrorBody),
        (status = 409, description = "Username or email already registered", body = ErrorBody),
        (status = 500, description = "Internal error", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn register(
    coordinator: Extension<Arc<Coordinator>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    let Some(Json(request)) = payload else {
        return Err(unreadable_body());
    };

    let session = coordinator
        .register(&request.username, &request.email, &request.password)
        .await?;

    Ok((StatusCode::CREATED, Json(session.into())))
}
