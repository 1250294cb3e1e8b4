//! Adaptive one-way password hashing (bcrypt) and password-strength rules.

use thiserror::Error;
use tracing::{debug, instrument};

use super::validation::ValidationResult;

/// Hard floor for the bcrypt cost factor.
pub const MIN_COST: u32 = 10;
/// Upper bound accepted by bcrypt.
pub const MAX_COST: u32 = 31;
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("password must not be empty")]
    EmptyInput,
    #[error("cost factor {0} is below the minimum of {MIN_COST}")]
    WeakConfiguration(u32),
    #[error("cost factor {0} is above the maximum of {MAX_COST}")]
    InvalidCost(u32),
    #[error("bcrypt error")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("hashing task failed")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Clone, Copy, Debug)]
pub struct CredentialHasher {
    cost: u32,
}

impl CredentialHasher {
    /// Build a hasher with the given bcrypt cost factor.
    ///
    /// # Errors
    /// Returns `HashError::WeakConfiguration` if `cost` is below [`MIN_COST`]
    /// and `HashError::InvalidCost` if it is above [`MAX_COST`].
    pub fn new(cost: u32) -> Result<Self, HashError> {
        if cost < MIN_COST {
            return Err(HashError::WeakConfiguration(cost));
        }
        if cost > MAX_COST {
            return Err(HashError::InvalidCost(cost));
        }
        Ok(Self { cost })
    }

    #[must_use]
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password with a fresh random salt.
    ///
    /// # Errors
    /// Returns `HashError::EmptyInput` for an empty password.
    pub fn hash(&self, password: &str) -> Result<String, HashError> {
        if password.is_empty() {
            return Err(HashError::EmptyInput);
        }
        Ok(bcrypt::hash(password, self.cost)?)
    }

    /// Check a password against a stored hash. Malformed hashes never match.
    #[must_use]
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match bcrypt::verify(password, hash) {
            Ok(matches) => matches,
            Err(err) => {
                debug!("Rejecting malformed password hash: {err}");
                false
            }
        }
    }

    /// Hash on the blocking pool so the runtime keeps serving other requests.
    ///
    /// # Errors
    /// Same as [`Self::hash`], plus `HashError::Task` if the worker panicked.
    #[instrument(skip_all, fields(cost = self.cost))]
    pub async fn hash_blocking(&self, password: &str) -> Result<String, HashError> {
        let hasher = *self;
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password)).await?
    }

    /// Verify on the blocking pool. A failed worker counts as a mismatch.
    #[instrument(skip_all)]
    pub async fn verify_blocking(&self, password: &str, hash: &str) -> bool {
        let hasher = *self;
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .unwrap_or(false)
    }

    /// Report every strength rule the password breaks.
    #[must_use]
    pub fn validate_strength(password: &str) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.check(
            password.chars().count() >= MIN_PASSWORD_LEN,
            "Password must be at least 8 characters long",
        );
        result.check(
            password.chars().any(char::is_uppercase),
            "Password must contain at least one uppercase letter",
        );
        result.check(
            password.chars().any(char::is_lowercase),
            "Password must contain at least one lowercase letter",
        );
        result.check(
            password.chars().any(|c| c.is_ascii_digit()),
            "Password must contain at least one number",
        );
        result.check(
            password
                .chars()
                .any(|c| !c.is_alphanumeric() && !c.is_whitespace()),
            "Password must contain at least one special character",
        );
        result
    }
}
