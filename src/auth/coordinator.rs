//! Registration and login orchestration.
//!
//! Flow Overview: validate input, check uniqueness (username before email),
//! hash, insert, then issue a session token. Login collapses "no such user"
//! and "wrong password" into one error and spends a bcrypt verification on
//! both paths.

use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::{
    error::{AuthError, DuplicateField},
    gate::AuthenticatedIdentity,
    password::CredentialHasher,
    store::{NewUser, PublicUser, StoreError, UserRow, UserStore},
    token::{SessionClaims, SessionTokenService},
    validation::{normalize_email, validate_login, validate_registration},
};

// Verified against when the email is unknown so both login failures cost the same.
const TIMING_EQUALIZER_PASSWORD: &str = "vigil-timing-equalizer";

/// Successful register/login result.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: PublicUser,
    pub token: String,
}

pub struct Coordinator {
    hasher: CredentialHasher,
    tokens: Arc<SessionTokenService>,
    store: Arc<dyn UserStore>,
    equalizer_hash: String,
}

impl Coordinator {
    /// Build the coordinator. Hashes the timing-equalizer password up front so
    /// no login pays for it.
    ///
    /// # Errors
    /// Returns `AuthError::Internal` if the equalizer hash cannot be computed.
    pub async fn new(
        hasher: CredentialHasher,
        tokens: Arc<SessionTokenService>,
        store: Arc<dyn UserStore>,
    ) -> Result<Self, AuthError> {
        let equalizer_hash = hasher.hash_blocking(TIMING_EQUALIZER_PASSWORD).await?;
        Ok(Self {
            hasher,
            tokens,
            store,
            equalizer_hash,
        })
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<SessionTokenService> {
        &self.tokens
    }

    /// Create an account and return it with a fresh session token.
    ///
    /// # Errors
    /// - `AuthError::Validation` for bad field formats or a weak password,
    /// - `AuthError::Duplicate` when the username (checked first) or email is taken,
    /// - `AuthError::Internal` when the store fails.
    #[instrument(skip(self, email, password))]
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let username = username.trim();
        let email = normalize_email(email);

        let fields = validate_registration(username, &email, password);
        if !fields.is_valid {
            return Err(AuthError::Validation(fields));
        }
        let strength = CredentialHasher::validate_strength(password);
        if !strength.is_valid {
            return Err(AuthError::Validation(strength));
        }

        // Not atomic with the insert; the insert's unique violation is the backstop.
        if self
            .store
            .find_by_username(username)
            .await
            .map_err(|err| store_failure("lookup username", err))?
            .is_some()
        {
            return Err(AuthError::Duplicate(DuplicateField::Username));
        }
        if self
            .store
            .find_by_email(&email)
            .await
            .map_err(|err| store_failure("lookup email", err))?
            .is_some()
        {
            return Err(AuthError::Duplicate(DuplicateField::Email));
        }

        let password_hash = self.hasher.hash_blocking(password).await?;
        let new_user = NewUser {
            username: username.to_string(),
            email,
            password_hash,
        };

        let row = match self.store.insert(&new_user).await {
            Ok(row) => row,
            Err(StoreError::UniqueViolation { field }) => {
                let field = match field {
                    Some(field) => field,
                    None => self.recheck_duplicate(&new_user).await?,
                };
                warn!(field = field.code(), "registration lost a uniqueness race");
                return Err(AuthError::Duplicate(field));
            }
            Err(err) => return Err(store_failure("insert user", err)),
        };

        let token = self.issue_for(&row)?;
        info!(user_id = %row.id, "user registered");

        Ok(AuthSession {
            user: PublicUser::from(&row),
            token,
        })
    }

    /// Authenticate by email and password.
    ///
    /// # Errors
    /// - `AuthError::Validation` when a field is missing,
    /// - `AuthError::InvalidCredentials` for an unknown email or a wrong password,
    /// - `AuthError::Internal` when the store fails.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email);
        let fields = validate_login(&email, password);
        if !fields.is_valid {
            return Err(AuthError::Validation(fields));
        }

        let user = self
            .store
            .find_by_email(&email)
            .await
            .map_err(|err| store_failure("lookup email", err))?;

        let Some(user) = user else {
            let _ = self
                .hasher
                .verify_blocking(password, &self.equalizer_hash)
                .await;
            info!(reason = "unknown_account", "login rejected");
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .hasher
            .verify_blocking(password, &user.password_hash)
            .await
        {
            info!(reason = "password_mismatch", "login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.issue_for(&user)?;
        info!(user_id = %user.id, "user logged in");

        Ok(AuthSession {
            user: PublicUser::from(&user),
            token,
        })
    }

    /// Re-issue a valid token with a fresh expiry.
    ///
    /// # Errors
    /// `AuthError::InvalidToken` when the presented token is expired or invalid.
    pub fn refresh(&self, token: &str) -> Result<String, AuthError> {
        self.tokens.refresh(token).map_err(|err| {
            info!(reason = err.kind(), "token refresh rejected");
            AuthError::from(err)
        })
    }

    /// Current profile for a caller that passed the gate.
    ///
    /// # Errors
    /// `AuthError::InvalidToken` when the account behind the token no longer
    /// matches, `AuthError::Internal` when the store fails.
    pub async fn profile(&self, identity: &AuthenticatedIdentity) -> Result<PublicUser, AuthError> {
        let user = self
            .store
            .find_by_username(&identity.username)
            .await
            .map_err(|err| store_failure("lookup username", err))?;
        match user {
            Some(user) if user.id.to_string() == identity.user_id => Ok(PublicUser::from(&user)),
            _ => {
                warn!(user_id = %identity.user_id, "Token subject has no matching account");
                Err(AuthError::InvalidToken)
            }
        }
    }

    fn issue_for(&self, user: &UserRow) -> Result<String, AuthError> {
        let claims = SessionClaims::new(user.id.to_string(), &user.username, &user.email);
        Ok(self.tokens.issue(&claims, None)?)
    }

    /// The store reported a unique violation without naming the constraint;
    /// look again in the same order as the pre-check.
    async fn recheck_duplicate(&self, user: &NewUser) -> Result<DuplicateField, AuthError> {
        let taken = self
            .store
            .find_by_username(&user.username)
            .await
            .map_err(|err| store_failure("recheck username", err))?;
        Ok(if taken.is_some() {
            DuplicateField::Username
        } else {
            DuplicateField::Email
        })
    }
}

fn store_failure(operation: &str, err: StoreError) -> AuthError {
    error!(operation, "User store failure: {err:?}");
    AuthError::Internal(anyhow::Error::new(err).context(format!("user store {operation}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        store::{MemoryUserStore, StoreFuture},
        token::{ManualClock, TokenConfig},
    };
    use anyhow::{anyhow, Result};
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn tokens() -> Result<Arc<SessionTokenService>> {
        Ok(Arc::new(SessionTokenService::new(
            TokenConfig::new(SecretString::from(SECRET.to_string())),
            Arc::new(ManualClock::new(1_700_000_000_000)),
        )?))
    }

    async fn coordinator_with(store: Arc<dyn UserStore>) -> Result<Coordinator> {
        Ok(Coordinator::new(CredentialHasher::new(10)?, tokens()?, store).await?)
    }

    async fn coordinator() -> Result<(Coordinator, Arc<MemoryUserStore>)> {
        let store = Arc::new(MemoryUserStore::new());
        Ok((coordinator_with(store.clone()).await?, store))
    }

    /// Hides the first `hidden` lookups, simulating a concurrent registration
    /// that lands between the pre-check and the insert.
    struct RacyStore {
        inner: MemoryUserStore,
        hidden: AtomicUsize,
        name_constraint: bool,
    }

    impl RacyStore {
        fn hide(&self) -> bool {
            self.hidden
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl UserStore for RacyStore {
        fn find_by_username<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<UserRow>> {
            if self.hide() {
                return Box::pin(async { Ok(None) });
            }
            self.inner.find_by_username(username)
        }

        fn find_by_email<'a>(&'a self, email: &'a str) -> StoreFuture<'a, Option<UserRow>> {
            if self.hide() {
                return Box::pin(async { Ok(None) });
            }
            self.inner.find_by_email(email)
        }

        fn insert<'a>(&'a self, user: &'a NewUser) -> StoreFuture<'a, UserRow> {
            let name_constraint = self.name_constraint;
            Box::pin(async move {
                match self.inner.insert(user).await {
                    Err(StoreError::UniqueViolation { .. }) if !name_constraint => {
                        Err(StoreError::UniqueViolation { field: None })
                    }
                    other => other,
                }
            })
        }
    }

    struct FailingStore;

    impl UserStore for FailingStore {
        fn find_by_username<'a>(&'a self, _username: &'a str) -> StoreFuture<'a, Option<UserRow>> {
            Box::pin(async { Err(StoreError::Database(sqlx::Error::PoolTimedOut)) })
        }

        fn find_by_email<'a>(&'a self, _email: &'a str) -> StoreFuture<'a, Option<UserRow>> {
            Box::pin(async { Err(StoreError::Database(sqlx::Error::PoolTimedOut)) })
        }

        fn insert<'a>(&'a self, _user: &'a NewUser) -> StoreFuture<'a, UserRow> {
            Box::pin(async { Err(StoreError::Database(sqlx::Error::PoolTimedOut)) })
        }
    }

    #[tokio::test]
    async fn register_issues_token_for_new_user() -> Result<()> {
        let (coordinator, store) = coordinator().await?;
        let session = coordinator.register("bob", "Bob@X.com", "Secure#1").await?;

        assert_eq!(session.user.username, "bob");
        assert_eq!(session.user.email, "bob@x.com");
        let claims = coordinator.tokens().verify(&session.token)?;
        assert_eq!(claims.identity.user_id, session.user.id.to_string());
        assert_eq!(claims.identity.email, "bob@x.com");

        let stored = store
            .find_by_username("bob")
            .await?
            .ok_or_else(|| anyhow!("user not stored"))?;
        assert_ne!(stored.password_hash, "Secure#1");
        assert!(!stored.password_hash.contains("Secure#1"));
        Ok(())
    }

    #[tokio::test]
    async fn username_is_checked_before_email() -> Result<()> {
        let (coordinator, _) = coordinator().await?;
        coordinator.register("bob", "bob@x.com", "Secure#1").await?;

        let both = coordinator.register("bob", "bob@x.com", "Secure#1").await;
        assert!(matches!(
            both,
            Err(AuthError::Duplicate(DuplicateField::Username))
        ));
        let email_only = coordinator.register("robert", "bob@x.com", "Secure#1").await;
        assert!(matches!(
            email_only,
            Err(AuthError::Duplicate(DuplicateField::Email))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn insert_race_maps_to_duplicate() -> Result<()> {
        let store = Arc::new(RacyStore {
            inner: MemoryUserStore::new(),
            hidden: AtomicUsize::new(0),
            name_constraint: true,
        });
        let coordinator = coordinator_with(store.clone()).await?;
        coordinator.register("bob", "bob@x.com", "Secure#1").await?;

        store.hidden.store(2, Ordering::SeqCst);
        let result = coordinator.register("bob", "bob@x.com", "Secure#1").await;
        assert!(matches!(
            result,
            Err(AuthError::Duplicate(DuplicateField::Username))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn unnamed_constraint_is_rechecked_in_check_order() -> Result<()> {
        let store = Arc::new(RacyStore {
            inner: MemoryUserStore::new(),
            hidden: AtomicUsize::new(0),
            name_constraint: false,
        });
        let coordinator = coordinator_with(store.clone()).await?;
        coordinator.register("bob", "bob@x.com", "Secure#1").await?;

        store.hidden.store(2, Ordering::SeqCst);
        let result = coordinator.register("bob", "other@x.com", "Secure#1").await;
        assert!(matches!(
            result,
            Err(AuthError::Duplicate(DuplicateField::Username))
        ));

        store.hidden.store(2, Ordering::SeqCst);
        let result = coordinator.register("robert", "bob@x.com", "Secure#1").await;
        assert!(matches!(
            result,
            Err(AuthError::Duplicate(DuplicateField::Email))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_fields_are_reported_together() -> Result<()> {
        let (coordinator, store) = coordinator().await?;
        let result = coordinator.register("b", "nope", "Secure#1").await;
        let Err(AuthError::Validation(errors)) = result else {
            return Err(anyhow!("expected validation error"));
        };
        assert_eq!(errors.errors.len(), 2);

        let result = coordinator.register("bob", "bob@x.com", "weak").await;
        let Err(AuthError::Validation(errors)) = result else {
            return Err(anyhow!("expected validation error"));
        };
        assert_eq!(errors.errors.len(), 4);
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn login_returns_session() -> Result<()> {
        let (coordinator, _) = coordinator().await?;
        let registered = coordinator.register("bob", "bob@x.com", "Secure#1").await?;
        let session = coordinator.login(" BOB@x.com ", "Secure#1").await?;
        assert_eq!(session.user.id, registered.user.id);
        let claims = coordinator.tokens().verify(&session.token)?;
        assert_eq!(claims.identity.username, "bob");
        Ok(())
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() -> Result<()> {
        let (coordinator, _) = coordinator().await?;
        coordinator.register("bob", "bob@x.com", "Secure#1").await?;

        let unknown = coordinator.login("nouser@x.com", "anything").await;
        let wrong = coordinator.login("bob@x.com", "wrongpass").await;
        let (Err(unknown), Err(wrong)) = (unknown, wrong) else {
            return Err(anyhow!("expected both logins to fail"));
        };
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.status(), wrong.status());
        assert_eq!(unknown.body(), wrong.body());
        assert_eq!(unknown.body().message, "Invalid email or password");
        Ok(())
    }

    #[tokio::test]
    async fn equalizer_hash_is_ready_before_first_login() -> Result<()> {
        let (coordinator, _) = coordinator().await?;
        assert!(coordinator.equalizer_hash.starts_with("$2"));
        assert!(coordinator
            .hasher
            .verify(TIMING_EQUALIZER_PASSWORD, &coordinator.equalizer_hash));
        Ok(())
    }

    #[tokio::test]
    async fn store_failures_are_internal() -> Result<()> {
        let coordinator = coordinator_with(Arc::new(FailingStore)).await?;
        let result = coordinator.register("bob", "bob@x.com", "Secure#1").await;
        assert!(matches!(result, Err(AuthError::Internal(_))));
        let result = coordinator.login("bob@x.com", "Secure#1").await;
        assert!(matches!(result, Err(AuthError::Internal(_))));
        Ok(())
    }

    #[tokio::test]
    async fn profile_requires_matching_account() -> Result<()> {
        let (coordinator, _) = coordinator().await?;
        let session = coordinator.register("bob", "bob@x.com", "Secure#1").await?;
        let identity = AuthenticatedIdentity {
            user_id: session.user.id.to_string(),
            username: "bob".to_string(),
            email: "bob@x.com".to_string(),
        };
        assert_eq!(coordinator.profile(&identity).await?, session.user);

        let stale = AuthenticatedIdentity {
            user_id: "someone-else".to_string(),
            ..identity
        };
        assert!(matches!(
            coordinator.profile(&stale).await,
            Err(AuthError::InvalidToken)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_rejects_garbage() -> Result<()> {
        let (coordinator, _) = coordinator().await?;
        let session = coordinator.register("bob", "bob@x.com", "Secure#1").await?;
        let refreshed = coordinator.refresh(&session.token)?;
        assert!(coordinator.tokens().verify(&refreshed).is_ok());
        assert!(matches!(
            coordinator.refresh("a.b.c"),
            Err(AuthError::InvalidToken)
        ));
        Ok(())
    }
}
