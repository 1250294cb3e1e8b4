//! Error taxonomy for the auth core and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::{password::HashError, token::TokenError, validation::ValidationResult};

pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";
pub const MISSING_TOKEN_MESSAGE: &str = "Authentication required";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicateField {
    Username,
    Email,
}

impl DuplicateField {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Username => "DUPLICATE_USERNAME",
            Self::Email => "DUPLICATE_EMAIL",
        }
    }

    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Username => "Username is already taken",
            Self::Email => "Email is already registered",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed")]
    Validation(ValidationResult),
    #[error("{} already exists", .0.code())]
    Duplicate(DuplicateField),
    /// Unknown account or wrong password; never tells which.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("missing bearer token")]
    MissingToken,
    /// Expired, malformed or badly signed token. The cause is logged where it
    /// was detected and stays server-side.
    #[error("invalid token")]
    InvalidToken,
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Duplicate(_) => StatusCode::CONFLICT,
            Self::InvalidCredentials | Self::MissingToken | Self::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            Self::Configuration(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Duplicate(field) => field.code(),
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::MissingToken => "MISSING_TOKEN",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Configuration(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Client-facing body; never includes internal causes.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        let message = match self {
            Self::Validation(_) => "Validation failed",
            Self::Duplicate(field) => field.message(),
            Self::InvalidCredentials => INVALID_CREDENTIALS_MESSAGE,
            Self::MissingToken => MISSING_TOKEN_MESSAGE,
            Self::InvalidToken => INVALID_TOKEN_MESSAGE,
            Self::Configuration(_) | Self::Internal(_) => INTERNAL_ERROR_MESSAGE,
        };
        let errors = match self {
            Self::Validation(result) => Some(result.errors.clone()),
            _ => None,
        };
        ErrorBody {
            success: false,
            message: message.to_string(),
            error: self.code().to_string(),
            errors,
        }
    }
}

impl From<HashError> for AuthError {
    fn from(err: HashError) -> Self {
        match err {
            HashError::WeakConfiguration(_) | HashError::InvalidCost(_) => {
                Self::Configuration(err.to_string())
            }
            HashError::EmptyInput => {
                let mut result = ValidationResult::new();
                result.push("Password is required");
                Self::Validation(result)
            }
            HashError::Bcrypt(_) | HashError::Task(_) => Self::Internal(err.into()),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed | TokenError::InvalidSignature | TokenError::Expired => {
                Self::InvalidToken
            }
            TokenError::WeakConfiguration | TokenError::InvalidTtl(_) => {
                Self::Configuration(err.to_string())
            }
            TokenError::InvalidPayload(_) | TokenError::Encode(_) => Self::Internal(err.into()),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
