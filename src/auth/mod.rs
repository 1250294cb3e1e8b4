//! Authentication and session-security core.
//!
//! Leaves first: [`password`] hashes credentials, [`token`] signs and verifies
//! session tokens, [`gate`] protects routes with a bearer token, and
//! [`coordinator`] ties them together for registration and login on top of a
//! [`store::UserStore`].

pub mod coordinator;
pub mod error;
pub mod gate;
pub mod password;
pub mod store;
pub mod token;
pub mod validation;

pub use coordinator::{AuthSession, Coordinator};
pub use error::{AuthError, DuplicateField};
pub use gate::{AuthenticatedIdentity, AuthorizationGate, GateState, RejectReason};
pub use password::{CredentialHasher, HashError, MIN_COST};
pub use store::{MemoryUserStore, NewUser, PgUserStore, PublicUser, StoreError, UserRow, UserStore};
pub use token::{
    Clock, ManualClock, NumericDate, SessionClaims, SessionTokenService, SystemClock, TokenClaims,
    TokenConfig, TokenError, parse_ttl,
};
pub use validation::ValidationResult;
