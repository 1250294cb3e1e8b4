use crate::auth::{error::ErrorBody, AuthError, Coordinator, SessionTokenService};
use axum::{
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshResponse {
    pub success: bool,
    pub token: String,
}

/// Exchange a still-valid bearer token for a new one.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    responses (
        (status = 200, description = "Token re-issued with a fresh expiry", body = RefreshResponse),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn refresh(
    coordinator: Extension<Arc<Coordinator>>,
    headers: HeaderMap,
) -> Result<Json<RefreshResponse>, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let token =
        SessionTokenService::extract_from_header(header).ok_or(AuthError::MissingToken)?;

    let token = coordinator.refresh(token)?;

    Ok(Json(RefreshResponse {
        success: true,
        token,
    }))
}
