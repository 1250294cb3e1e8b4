//! User persistence contract consumed by the coordinator, with a `PostgreSQL`
//! adapter and an in-memory adapter.

use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::{fmt, future::Future, pin::Pin};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info_span, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::DuplicateField;

const UNIQUE_VIOLATION: &str = "23505";

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert hit a unique constraint; `field` is set when the constraint is known.
    #[error("unique constraint violated")]
    UniqueViolation { field: Option<DuplicateField> },
    #[error("database error")]
    Database(#[from] sqlx::Error),
}

/// Stored user, including the credential hash.
#[derive(Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub reputation: i32,
    pub created_at_unix: i64,
    pub password_hash: String,
}

impl fmt::Debug for UserRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRow")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("reputation", &self.reputation)
            .field("created_at_unix", &self.created_at_unix)
            .finish_non_exhaustive()
    }
}

/// User fields safe to return to clients.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub reputation: i32,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

impl From<&UserRow> for PublicUser {
    fn from(row: &UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username.clone(),
            email: row.email.clone(),
            reputation: row.reputation,
            created_at: row.created_at_unix,
        }
    }
}

#[derive(Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Lookups and insert used by registration and login. The three calls are
/// independent; implementations are not expected to share a transaction.
pub trait UserStore: Send + Sync {
    fn find_by_username<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<UserRow>>;
    fn find_by_email<'a>(&'a self, email: &'a str) -> StoreFuture<'a, Option<UserRow>>;
    fn insert<'a>(&'a self, user: &'a NewUser) -> StoreFuture<'a, UserRow>;
}

const SELECT_BY_USERNAME: &str = r"
    SELECT id, username, email, reputation,
           EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix, password_hash
    FROM users
    WHERE username = $1
";

const SELECT_BY_EMAIL: &str = r"
    SELECT id, username, email, reputation,
           EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix, password_hash
    FROM users
    WHERE email = $1
";

const INSERT_USER: &str = r"
    INSERT INTO users (username, email, password_hash)
    VALUES ($1, $2, $3)
    RETURNING id, username, email, reputation,
              EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix, password_hash
";

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_one_by(&self, query: &'static str, value: &str) -> Result<Option<UserRow>, StoreError> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn insert_user(&self, user: &NewUser) -> Result<UserRow, StoreError> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = INSERT_USER
        );
        let result = sqlx::query(INSERT_USER)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(row) => Ok(user_from_row(&row)?),
            Err(err) if is_unique_violation(&err) => Err(StoreError::UniqueViolation {
                field: duplicate_field_from_constraint(violated_constraint(&err)),
            }),
            Err(err) => Err(err.into()),
        }
    }
}

impl UserStore for PgUserStore {
    fn find_by_username<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<UserRow>> {
        Box::pin(self.fetch_one_by(SELECT_BY_USERNAME, username))
    }

    fn find_by_email<'a>(&'a self, email: &'a str) -> StoreFuture<'a, Option<UserRow>> {
        Box::pin(self.fetch_one_by(SELECT_BY_EMAIL, email))
    }

    fn insert<'a>(&'a self, user: &'a NewUser) -> StoreFuture<'a, UserRow> {
        Box::pin(self.insert_user(user))
    }
}

fn user_from_row(row: &PgRow) -> Result<UserRow, sqlx::Error> {
    Ok(UserRow {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        reputation: row.try_get("reputation")?,
        created_at_unix: row.try_get("created_at_unix")?,
        password_hash: row.try_get("password_hash")?,
    })
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| code.as_ref() == UNIQUE_VIOLATION),
        _ => false,
    }
}

fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}

/// Map a constraint name (`users_username_key`, `users_email_key`) to its field.
pub(crate) fn duplicate_field_from_constraint(constraint: Option<&str>) -> Option<DuplicateField> {
    let constraint = constraint?;
    if constraint.contains("username") {
        Some(DuplicateField::Username)
    } else if constraint.contains("email") {
        Some(DuplicateField::Email)
    } else {
        None
    }
}

/// Process-local store, used by tests and local runs without a database.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<UserRow>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

impl UserStore for MemoryUserStore {
    fn find_by_username<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<UserRow>> {
        Box::pin(async move {
            let users = self.users.read().await;
            Ok(users.iter().find(|user| user.username == username).cloned())
        })
    }

    fn find_by_email<'a>(&'a self, email: &'a str) -> StoreFuture<'a, Option<UserRow>> {
        Box::pin(async move {
            let users = self.users.read().await;
            Ok(users.iter().find(|user| user.email == email).cloned())
        })
    }

    fn insert<'a>(&'a self, user: &'a NewUser) -> StoreFuture<'a, UserRow> {
        Box::pin(async move {
            let mut users = self.users.write().await;
            // Same constraint order as the SQL schema.
            if users.iter().any(|existing| existing.username == user.username) {
                return Err(StoreError::UniqueViolation {
                    field: Some(DuplicateField::Username),
                });
            }
            if users.iter().any(|existing| existing.email == user.email) {
                return Err(StoreError::UniqueViolation {
                    field: Some(DuplicateField::Email),
                });
            }

            let created_at_unix = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |elapsed| {
                    i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
                });
            let row = UserRow {
                id: Uuid::new_v4(),
                username: user.username.clone(),
                email: user.email.clone(),
                reputation: 0,
                created_at_unix,
                password_hash: user.password_hash.clone(),
            };
            users.push(row.clone());
            Ok(row)
        })
    }
}
