//! Bearer-token gate for protected routes.
//!
//! A request moves `NoToken -> Verifying -> Authenticated | Rejected`. The
//! specific verification failure is logged here and never reaches the client.

use axum::{
    async_trait,
    extract::{Extension, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use utoipa::ToSchema;

use super::{
    error::AuthError,
    token::{SessionTokenService, TokenClaims},
};

/// Identity attached to a request that passed the gate.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub username: String,
    pub email: String,
}

impl From<TokenClaims> for AuthenticatedIdentity {
    fn from(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.identity.user_id,
            username: claims.identity.username,
            email: claims.identity.email,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    MissingToken,
    InvalidOrExpiredToken,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateState {
    NoToken,
    Verifying,
    Authenticated(AuthenticatedIdentity),
    Rejected(RejectReason),
}

impl GateState {
    /// Advance one step. `Authenticated` and `Rejected` are terminal.
    fn step(self, header: Option<&str>, tokens: &SessionTokenService) -> Self {
        match self {
            Self::NoToken => {
                if SessionTokenService::extract_from_header(header).is_some() {
                    Self::Verifying
                } else {
                    Self::Rejected(RejectReason::MissingToken)
                }
            }
            Self::Verifying => {
                let Some(token) = SessionTokenService::extract_from_header(header) else {
                    return Self::Rejected(RejectReason::MissingToken);
                };
                match tokens.verify(token) {
                    Ok(claims) => Self::Authenticated(claims.into()),
                    Err(err) => {
                        warn!(reason = err.kind(), "Rejected bearer token");
                        Self::Rejected(RejectReason::InvalidOrExpiredToken)
                    }
                }
            }
            terminal => terminal,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authenticated(_) | Self::Rejected(_))
    }
}

#[derive(Clone, Debug)]
pub struct AuthorizationGate {
    tokens: Arc<SessionTokenService>,
}

impl AuthorizationGate {
    #[must_use]
    pub fn new(tokens: Arc<SessionTokenService>) -> Self {
        Self { tokens }
    }

    /// Run the state machine to completion for an `Authorization` header value.
    #[must_use]
    pub fn evaluate(&self, header: Option<&str>) -> GateState {
        let mut state = GateState::NoToken;
        while !state.is_terminal() {
            state = state.step(header, &self.tokens);
        }
        state
    }

    /// Same as [`Self::evaluate`], mapped onto the client-facing error.
    ///
    /// # Errors
    /// `AuthError::MissingToken` when no usable bearer token was presented,
    /// `AuthError::InvalidToken` when it failed verification.
    pub fn authenticate(&self, header: Option<&str>) -> Result<AuthenticatedIdentity, AuthError> {
        match self.evaluate(header) {
            GateState::Authenticated(identity) => Ok(identity),
            GateState::Rejected(RejectReason::InvalidOrExpiredToken) => Err(AuthError::InvalidToken),
            GateState::Rejected(RejectReason::MissingToken)
            | GateState::NoToken
            | GateState::Verifying => Err(AuthError::MissingToken),
        }
    }
}

/// Middleware for `axum::middleware::from_fn`; expects the gate as an
/// `Extension<Arc<AuthorizationGate>>`. Handlers behind it read the caller
/// through the [`AuthenticatedIdentity`] extractor.
///
/// # Errors
/// Responds 401 with `MISSING_TOKEN` or `INVALID_TOKEN`.
pub async fn require_auth(
    Extension(gate): Extension<Arc<AuthorizationGate>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let identity = gate.authenticate(header)?;
    debug!(user_id = %identity.user_id, "Request authenticated");

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(AuthError::MissingToken)
    }
}
