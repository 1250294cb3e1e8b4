//! # Vigil (Authentication & Session Security)
//!
//! `vigil` is the authentication core of the intel-sharing platform. It hashes
//! credentials, issues and verifies signed session tokens, gates write
//! operations behind a bearer token, and coordinates registration and login.
//!
//! ## Session Tokens
//!
//! Tokens are stateless `HS256` JWTs (`header.payload.signature`, base64url)
//! carrying `{userId, username, email, iat, exp, iss, aud}`. The verifier pins
//! the algorithm, issuer and audience. There is no server-side revocation: a
//! token stays valid until it expires, logout only clears the client copy.
//!
//! ## Enumeration Prevention
//!
//! Login failures collapse "no such user" and "wrong password" into a single
//! `INVALID_CREDENTIALS` response. Token failures (expired, malformed, bad
//! signature) collapse into `INVALID_TOKEN` for the client and are only
//! distinguished in server-side logs.
//!
//! ## Registration Races
//!
//! Uniqueness pre-checks and the insert are separate store operations. A
//! unique violation raised by the insert is remapped to the same duplicate
//! error the pre-check would have produced.

pub mod auth;
pub mod cli;
pub mod vigil;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
