//! Field validation shared by password-strength checks and registration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 30;
pub const EMAIL_MAX_LEN: usize = 254;

/// Outcome of a validation pass; collects every violation, in check order.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    #[must_use]
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn push(&mut self, error: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(error.into());
    }

    /// Record `error` unless `ok` holds.
    pub fn check(&mut self, ok: bool, error: &str) {
        if !ok {
            self.push(error);
        }
    }
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Usernames are ASCII letters, digits and underscores.
#[must_use]
pub fn valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_]+$").is_ok_and(|regex| regex.is_match(username))
}

/// Check the shape of registration fields. Uniqueness is not considered here
/// and password strength is left to the hasher.
#[must_use]
pub fn validate_registration(username: &str, email: &str, password: &str) -> ValidationResult {
    let mut result = ValidationResult::new();

    let username_len = username.chars().count();
    if username.is_empty() {
        result.push("Username is required");
    } else {
        result.check(
            (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&username_len),
            "Username must be between 3 and 30 characters",
        );
        result.check(
            valid_username(username),
            "Username may only contain letters, numbers and underscores",
        );
    }

    if email.is_empty() {
        result.push("Email is required");
    } else {
        result.check(email.len() <= EMAIL_MAX_LEN, "Email is too long");
        result.check(valid_email(email), "Email format is invalid");
    }

    result.check(!password.is_empty(), "Password is required");

    result
}

/// Login only needs both fields present and a plausible email.
#[must_use]
pub fn validate_login(email: &str, password: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    if email.is_empty() {
        result.push("Email is required");
    } else {
        result.check(valid_email(email), "Email format is invalid");
    }
    result.check(!password.is_empty(), "Password is required");
    result
}
