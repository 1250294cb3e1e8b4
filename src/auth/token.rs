//! Signed, time-bounded session tokens (`HS256` JWT).
//!
//! Wire format: `base64url(header).base64url(payload).base64url(signature)`,
//! unpadded. The header is always `{"alg":"HS256","typ":"JWT"}` and the
//! verifier rejects anything else. `iat`/`exp` are JWT NumericDates kept at
//! millisecond precision, so `exp` is always strictly greater than `iat`.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::Sha256;
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";
pub const MIN_SECRET_LEN: usize = 32;
pub const DEFAULT_ISSUER: &str = "vigil";
pub const DEFAULT_AUDIENCE: &str = "vigil-users";
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const RESERVED_CLAIMS: [&str; 7] = ["userId", "username", "email", "iat", "exp", "iss", "aud"];

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token payload: {0}")]
    InvalidPayload(String),
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("signing secret must be at least {MIN_SECRET_LEN} characters")]
    WeakConfiguration,
    #[error("invalid ttl: {0}")]
    InvalidTtl(String),
    #[error("failed to encode token")]
    Encode(#[from] serde_json::Error),
}

impl TokenError {
    /// Coarse classification, safe to log.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Malformed => "malformed",
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "expired",
            Self::WeakConfiguration => "weak_configuration",
            Self::InvalidTtl(_) => "invalid_ttl",
            Self::Encode(_) => "encode",
        }
    }
}

/// Source of "now" for issuing and expiry checks.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_unix_millis(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
            })
    }
}

/// Settable clock for tests and tooling.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_millis: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub fn new(now_unix_millis: i64) -> Self {
        Self {
            now_millis: AtomicI64::new(now_unix_millis),
        }
    }

    pub fn set(&self, now_unix_millis: i64) {
        self.now_millis.store(now_unix_millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now_millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix_millis(&self) -> i64 {
        self.now_millis.load(Ordering::SeqCst)
    }
}

/// Point in time carried in `iat`/`exp`.
///
/// Whole seconds are written as integers and anything finer as a fractional
/// NumericDate (`1700000000.001`), which RFC 7519 allows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NumericDate(i64);

impl NumericDate {
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    #[must_use]
    pub const fn unix_millis(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn unix_seconds(self) -> i64 {
        self.0.div_euclid(1000)
    }
}

impl Serialize for NumericDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 % 1000 == 0 {
            serializer.serialize_i64(self.unix_seconds())
        } else {
            #[allow(clippy::cast_precision_loss)]
            let seconds = self.0 as f64 / 1000.0;
            serializer.serialize_f64(seconds)
        }
    }
}

impl<'de> Deserialize<'de> for NumericDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        if !seconds.is_finite() {
            return Err(serde::de::Error::custom("NumericDate must be finite"));
        }
        #[allow(clippy::cast_possible_truncation)]
        let millis = (seconds * 1000.0).round() as i64;
        Ok(Self(millis))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: TOKEN_TYPE.to_string(),
        }
    }
}

/// Identity carried by a session token, plus optional extension claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub username: String,
    pub email: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SessionClaims {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            email: email.into(),
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    fn validate(&self) -> Result<(), TokenError> {
        if self.user_id.trim().is_empty() {
            return Err(TokenError::InvalidPayload("userId is required".to_string()));
        }
        if let Some(name) = self
            .extra
            .keys()
            .find(|name| RESERVED_CLAIMS.contains(&name.as_str()))
        {
            return Err(TokenError::InvalidPayload(format!(
                "claim {name} is reserved"
            )));
        }
        Ok(())
    }
}

/// Claims recovered from a verified token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    #[serde(flatten)]
    pub identity: SessionClaims,
    pub iat: NumericDate,
    pub exp: NumericDate,
    pub iss: String,
    pub aud: String,
}

#[derive(Clone, Debug)]
pub struct TokenConfig {
    secret: SecretString,
    issuer: String,
    audience: String,
    default_ttl: Duration,
}

impl TokenConfig {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            default_ttl: DEFAULT_TTL,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: String) -> Self {
        self.audience = audience;
        self
    }

    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

#[derive(Debug)]
pub struct SessionTokenService {
    config: TokenConfig,
    clock: Arc<dyn Clock>,
}

impl SessionTokenService {
    /// Build the service.
    ///
    /// # Errors
    /// Returns `TokenError::WeakConfiguration` if the secret is shorter than
    /// [`MIN_SECRET_LEN`] characters, `TokenError::InvalidTtl` for a zero default TTL.
    pub fn new(config: TokenConfig, clock: Arc<dyn Clock>) -> Result<Self, TokenError> {
        if config.secret.expose_secret().chars().count() < MIN_SECRET_LEN {
            return Err(TokenError::WeakConfiguration);
        }
        if config.default_ttl.is_zero() {
            return Err(TokenError::InvalidTtl("ttl must be positive".to_string()));
        }
        Ok(Self { config, clock })
    }

    /// Same as [`Self::new`] using the wall clock.
    ///
    /// # Errors
    /// See [`Self::new`].
    pub fn with_system_clock(config: TokenConfig) -> Result<Self, TokenError> {
        Self::new(config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Sign `claims` into a token valid for `ttl` (default TTL when `None`).
    ///
    /// # Errors
    /// Returns `TokenError::InvalidPayload` for an empty identity or reserved
    /// extension claims, `TokenError::InvalidTtl` for a zero TTL.
    pub fn issue(&self, claims: &SessionClaims, ttl: Option<Duration>) -> Result<String, TokenError> {
        claims.validate()?;
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        if ttl.is_zero() {
            return Err(TokenError::InvalidTtl("ttl must be positive".to_string()));
        }
        let ttl_millis = i64::try_from(ttl.as_millis())
            .map_err(|_| TokenError::InvalidTtl("ttl is too large".to_string()))?;

        let now_millis = self.clock.now_unix_millis();
        let exp_millis = now_millis
            .checked_add(ttl_millis)
            .ok_or_else(|| TokenError::InvalidTtl("ttl is too large".to_string()))?;

        let payload = TokenClaims {
            identity: claims.clone(),
            iat: NumericDate::from_unix_millis(now_millis),
            exp: NumericDate::from_unix_millis(exp_millis),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let payload_b64 = b64e_json(&payload)?;
        let signing_input = format!("{header_b64}.{payload_b64}");
        let signature_b64 = Base64UrlUnpadded::encode_string(&self.sign(&signing_input)?);

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    /// - `TokenError::Malformed` for a wrong segment count, bad base64url or bad json,
    /// - `TokenError::InvalidSignature` for a MAC mismatch, a non-`HS256`
    ///   header, or an issuer/audience mismatch,
    /// - `TokenError::Expired` once `exp` has passed.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let (header_b64, payload_b64, signature_b64) = split_token(token)?;

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::InvalidSignature);
        }

        let signature =
            Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(format!("{header_b64}.{payload_b64}").as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: TokenClaims = b64d_json(payload_b64)?;
        if claims.iss != self.config.issuer || claims.aud != self.config.audience {
            return Err(TokenError::InvalidSignature);
        }
        if self.has_passed(claims.exp) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Pull the token out of an `Authorization` header value.
    ///
    /// Only `"Bearer <a>.<b>.<c>"` with a single space and no other whitespace
    /// is accepted.
    #[must_use]
    pub fn extract_from_header(header: Option<&str>) -> Option<&str> {
        let token = header?.strip_prefix("Bearer ")?;
        if token.is_empty() || token.chars().any(char::is_whitespace) {
            return None;
        }
        let mut segments = 0;
        for segment in token.split('.') {
            if segment.is_empty() {
                return None;
            }
            segments += 1;
        }
        (segments == 3).then_some(token)
    }

    /// Decode the payload without checking the signature.
    #[must_use]
    pub fn inspect(token: &str) -> Option<TokenClaims> {
        let (_, payload_b64, _) = split_token(token).ok()?;
        b64d_json(payload_b64).ok()
    }

    /// Whether `exp` has passed. Anything unparseable counts as expired.
    #[must_use]
    pub fn is_expired(&self, token: &str) -> bool {
        Self::inspect(token).map_or(true, |claims| self.has_passed(claims.exp))
    }

    /// Re-issue a still-valid token with a fresh expiry, carrying the identity
    /// and extension claims forward.
    ///
    /// # Errors
    /// Any error from [`Self::verify`] or [`Self::issue`].
    pub fn refresh(&self, token: &str) -> Result<String, TokenError> {
        let claims = self.verify(token)?;
        self.issue(&claims.identity, None)
    }

    fn has_passed(&self, exp: NumericDate) -> bool {
        exp.unix_millis() <= self.clock.now_unix_millis()
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.config.secret.expose_secret().as_bytes())
            .map_err(|_| TokenError::WeakConfiguration)
    }

    fn sign(&self, signing_input: &str) -> Result<Vec<u8>, TokenError> {
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Parse a human TTL such as `"1ms"`, `"30s"`, `"15m"`, `"24h"` or `"7d"`.
/// A bare number is seconds.
///
/// # Errors
/// Returns `TokenError::InvalidTtl` for unknown units, non-numeric or zero values.
pub fn parse_ttl(value: &str) -> Result<Duration, TokenError> {
    let value = value.trim().to_lowercase();
    let (number, unit_millis) = if let Some(number) = value.strip_suffix("ms") {
        (number, 1)
    } else if let Some(number) = value.strip_suffix('s') {
        (number, 1000)
    } else if let Some(number) = value.strip_suffix('m') {
        (number, 60 * 1000)
    } else if let Some(number) = value.strip_suffix('h') {
        (number, 60 * 60 * 1000)
    } else if let Some(number) = value.strip_suffix('d') {
        (number, 24 * 60 * 60 * 1000)
    } else {
        (value.as_str(), 1000)
    };

    let millis = number
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(unit_millis))
        .ok_or_else(|| TokenError::InvalidTtl(value.clone()))?;
    if millis == 0 {
        return Err(TokenError::InvalidTtl(value));
    }
    Ok(Duration::from_millis(millis))
}

fn split_token(token: &str) -> Result<(&str, &str, &str), TokenError> {
    let mut parts = token.split('.');
    let header = parts.next().ok_or(TokenError::Malformed)?;
    let payload = parts.next().ok_or(TokenError::Malformed)?;
    let signature = parts.next().ok_or(TokenError::Malformed)?;
    if parts.next().is_some() {
        return Err(TokenError::Malformed);
    }
    Ok((header, payload, signature))
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";
    const OTHER_SECRET: &str = "fedcba9876543210fedcba9876543210";
    // 2023-11-14T22:13:20Z
    const NOW_MILLIS: i64 = 1_700_000_000_000;

    fn service_with(secret: &str, clock: Arc<ManualClock>) -> Result<SessionTokenService> {
        Ok(SessionTokenService::new(
            TokenConfig::new(SecretString::from(secret.to_string())),
            clock,
        )?)
    }

    fn service() -> Result<(SessionTokenService, Arc<ManualClock>)> {
        let clock = Arc::new(ManualClock::new(NOW_MILLIS));
        Ok((service_with(SECRET, clock.clone())?, clock))
    }

    fn bob() -> SessionClaims {
        SessionClaims::new("7f1d6c1e-0000-4000-8000-000000000001", "bob", "bob@x.com")
    }

    #[test]
    fn issue_then_verify_recovers_identity() -> Result<()> {
        let (service, _) = service()?;
        let token = service.issue(&bob(), None)?;
        assert_eq!(token.split('.').count(), 3);

        let claims = service.verify(&token)?;
        assert_eq!(claims.identity.user_id, bob().user_id);
        assert_eq!(claims.identity.username, "bob");
        assert_eq!(claims.identity.email, "bob@x.com");
        assert_eq!(claims.iat.unix_millis(), NOW_MILLIS);
        assert_eq!(claims.exp.unix_seconds(), claims.iat.unix_seconds() + 24 * 60 * 60);
        assert_eq!(claims.iss, DEFAULT_ISSUER);
        assert_eq!(claims.aud, DEFAULT_AUDIENCE);
        Ok(())
    }

    #[test]
    fn payload_uses_wire_claim_names() -> Result<()> {
        let (service, _) = service()?;
        let token = service.issue(&bob(), None)?;
        let segments: Vec<&str> = token.split('.').collect();
        let payload: Value = b64d_json(segments[1])?;
        for name in RESERVED_CLAIMS {
            assert!(payload.get(name).is_some(), "missing claim {name}");
        }
        let header: Value = b64d_json(segments[0])?;
        assert_eq!(header, json!({"alg": "HS256", "typ": "JWT"}));
        Ok(())
    }

    #[test]
    fn foreign_secret_is_invalid_signature() -> Result<()> {
        let clock = Arc::new(ManualClock::new(NOW_MILLIS));
        let issuer = service_with(OTHER_SECRET, clock.clone())?;
        let verifier = service_with(SECRET, clock)?;
        let token = issuer.issue(&bob(), None)?;
        assert!(matches!(
            verifier.verify(&token),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn tampered_payload_is_invalid_signature() -> Result<()> {
        let (service, _) = service()?;
        let token = service.issue(&bob(), None)?;
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = b64e_json(&TokenClaims {
            identity: SessionClaims::new("someone-else", "mallory", "m@x.com"),
            iat: NumericDate::from_unix_millis(NOW_MILLIS),
            exp: NumericDate::from_unix_millis(NOW_MILLIS + 60_000),
            iss: DEFAULT_ISSUER.to_string(),
            aud: DEFAULT_AUDIENCE.to_string(),
        })?;
        parts[1] = forged.as_str();
        assert!(matches!(
            service.verify(&parts.join(".")),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn other_algorithms_are_rejected() -> Result<()> {
        let (service, _) = service()?;
        let token = service.issue(&bob(), None)?;
        let parts: Vec<&str> = token.split('.').collect();
        for alg in ["none", "HS512", "RS256"] {
            let header = b64e_json(&json!({"alg": alg, "typ": "JWT"}))?;
            let signing_input = format!("{header}.{}", parts[1]);
            let signature = Base64UrlUnpadded::encode_string(&service.sign(&signing_input)?);
            let forged = format!("{signing_input}.{signature}");
            assert!(
                matches!(service.verify(&forged), Err(TokenError::InvalidSignature)),
                "alg {alg} was accepted"
            );
        }
        Ok(())
    }

    #[test]
    fn issuer_and_audience_are_pinned() -> Result<()> {
        let clock = Arc::new(ManualClock::new(NOW_MILLIS));
        let config = TokenConfig::new(SecretString::from(SECRET.to_string()));
        let other_issuer = SessionTokenService::new(
            config.clone().with_issuer("someone-else".to_string()),
            clock.clone(),
        )?;
        let other_audience = SessionTokenService::new(
            config.clone().with_audience("other-app".to_string()),
            clock.clone(),
        )?;
        let verifier = SessionTokenService::new(config, clock)?;

        let token = other_issuer.issue(&bob(), None)?;
        assert!(matches!(verifier.verify(&token), Err(TokenError::InvalidSignature)));
        let token = other_audience.issue(&bob(), None)?;
        assert!(matches!(verifier.verify(&token), Err(TokenError::InvalidSignature)));
        Ok(())
    }

    #[test]
    fn malformed_tokens_are_distinct() -> Result<()> {
        let (service, _) = service()?;
        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.@@@.###", "abc.def.ghi"] {
            assert!(
                matches!(service.verify(token), Err(TokenError::Malformed)),
                "token {token:?} was not malformed"
            );
        }
        Ok(())
    }

    #[test]
    fn short_ttl_expires() -> Result<()> {
        let (service, clock) = service()?;
        let token = service.issue(&bob(), Some(parse_ttl("1ms")?))?;
        let claims = service.verify(&token)?;
        assert!(claims.exp > claims.iat);
        assert_eq!(claims.exp.unix_millis() - claims.iat.unix_millis(), 1);
        assert!(!service.is_expired(&token));

        clock.advance(Duration::from_millis(10));
        assert!(matches!(service.verify(&token), Err(TokenError::Expired)));
        assert!(service.is_expired(&token));
        Ok(())
    }

    #[test]
    fn short_ttl_expires_on_the_wall_clock() -> Result<()> {
        let service = SessionTokenService::with_system_clock(TokenConfig::new(
            SecretString::from(SECRET.to_string()),
        ))?;
        let tokens = (0..20)
            .map(|_| service.issue(&bob(), Some(parse_ttl("1ms")?)))
            .collect::<Result<Vec<_>, _>>()?;

        std::thread::sleep(Duration::from_millis(20));
        for token in &tokens {
            assert!(matches!(service.verify(token), Err(TokenError::Expired)));
            assert!(service.is_expired(token));
        }
        Ok(())
    }

    #[test]
    fn sub_second_dates_are_fractional_on_the_wire() -> Result<()> {
        let (service, clock) = service()?;
        clock.advance(Duration::from_millis(250));
        let token = service.issue(&bob(), Some(Duration::from_secs(60)))?;
        let segments: Vec<&str> = token.split('.').collect();
        let payload: Value = b64d_json(segments[1])?;
        assert_eq!(payload["iat"], json!(1_700_000_000.25));
        assert_eq!(payload["exp"], json!(1_700_000_060.25));

        let whole = serde_json::to_value(NumericDate::from_unix_millis(NOW_MILLIS))?;
        assert_eq!(whole, json!(1_700_000_000));
        let parsed: NumericDate = serde_json::from_value(json!(1_700_000_000))?;
        assert_eq!(parsed.unix_millis(), NOW_MILLIS);
        Ok(())
    }

    #[test]
    fn expiry_boundary_is_inclusive() -> Result<()> {
        let (service, clock) = service()?;
        let token = service.issue(&bob(), Some(Duration::from_secs(60)))?;
        clock.advance(Duration::from_millis(59_999));
        assert!(service.verify(&token).is_ok());
        clock.advance(Duration::from_millis(1));
        assert!(matches!(service.verify(&token), Err(TokenError::Expired)));
        Ok(())
    }

    #[test]
    fn garbage_counts_as_expired() -> Result<()> {
        let (service, _) = service()?;
        assert!(service.is_expired("not-a-token"));
        assert!(service.is_expired("a.b.c"));
        assert!(SessionTokenService::inspect("a.b.c").is_none());
        Ok(())
    }

    #[test]
    fn extract_from_header_accepts_only_exact_bearer() {
        assert_eq!(
            SessionTokenService::extract_from_header(Some("Bearer abc.def.ghi")),
            Some("abc.def.ghi")
        );
        for header in [
            "Basic xxx",
            "Bearer a b",
            "bearer abc.def.ghi",
            "Bearer  abc.def.ghi",
            "Bearer abc.def.ghi ",
            "Bearer abc.def",
            "Bearer abc.def.ghi.jkl",
            "Bearer abc..ghi",
            "Bearer ",
            "Bearer",
            "abc.def.ghi",
            "Bearer abc.def.ghi, Bearer abc.def.ghi",
        ] {
            assert_eq!(
                SessionTokenService::extract_from_header(Some(header)),
                None,
                "header {header:?} was accepted"
            );
        }
        assert_eq!(SessionTokenService::extract_from_header(None), None);
    }

    #[test]
    fn weak_secret_is_rejected() {
        let result = SessionTokenService::with_system_clock(TokenConfig::new(SecretString::from(
            "too-short".to_string(),
        )));
        assert!(matches!(result, Err(TokenError::WeakConfiguration)));
    }

    #[test]
    fn invalid_payloads_are_rejected() -> Result<()> {
        let (service, _) = service()?;
        let empty = SessionClaims::new(" ", "bob", "bob@x.com");
        assert!(matches!(
            service.issue(&empty, None),
            Err(TokenError::InvalidPayload(_))
        ));
        let reserved = bob().with_claim("exp", json!(0));
        assert!(matches!(
            service.issue(&reserved, None),
            Err(TokenError::InvalidPayload(_))
        ));
        assert!(matches!(
            service.issue(&bob(), Some(Duration::ZERO)),
            Err(TokenError::InvalidTtl(_))
        ));
        Ok(())
    }

    #[test]
    fn extension_claims_round_trip() -> Result<()> {
        let (service, _) = service()?;
        let claims = bob().with_claim("reputation", json!(42));
        let token = service.issue(&claims, None)?;
        let verified = service.verify(&token)?;
        assert_eq!(verified.identity.extra.get("reputation"), Some(&json!(42)));
        assert_eq!(verified.identity.extra.len(), 1);
        Ok(())
    }

    #[test]
    fn refresh_extends_expiry_and_keeps_identity() -> Result<()> {
        let (service, clock) = service()?;
        let claims = bob().with_claim("role", json!("analyst"));
        let token = service.issue(&claims, Some(Duration::from_secs(60)))?;
        let first = service.verify(&token)?;

        clock.advance(Duration::from_secs(30));
        let refreshed = service.refresh(&token)?;
        let renewed = service.verify(&refreshed)?;

        assert_eq!(renewed.identity, first.identity);
        assert_eq!(renewed.iat.unix_seconds(), first.iat.unix_seconds() + 30);
        assert_eq!(renewed.exp.unix_seconds(), renewed.iat.unix_seconds() + 24 * 60 * 60);
        Ok(())
    }

    #[test]
    fn refresh_rejects_expired_tokens() -> Result<()> {
        let (service, clock) = service()?;
        let token = service.issue(&bob(), Some(Duration::from_secs(1)))?;
        clock.advance(Duration::from_secs(2));
        assert!(matches!(service.refresh(&token), Err(TokenError::Expired)));
        assert!(matches!(
            service.refresh("garbage"),
            Err(TokenError::Malformed)
        ));
        Ok(())
    }

    #[test]
    fn parse_ttl_units() -> Result<()> {
        assert_eq!(parse_ttl("1ms")?, Duration::from_millis(1));
        assert_eq!(parse_ttl("30s")?, Duration::from_secs(30));
        assert_eq!(parse_ttl("15m")?, Duration::from_secs(15 * 60));
        assert_eq!(parse_ttl("24h")?, Duration::from_secs(24 * 60 * 60));
        assert_eq!(parse_ttl(" 7d ")?, Duration::from_secs(7 * 24 * 60 * 60));
        assert_eq!(parse_ttl("60")?, Duration::from_secs(60));
        assert!(matches!(parse_ttl("0s"), Err(TokenError::InvalidTtl(_))));
        assert!(matches!(parse_ttl("soon"), Err(TokenError::InvalidTtl(_))));
        assert!(matches!(parse_ttl("-1h"), Err(TokenError::InvalidTtl(_))));
        Ok(())
    }
}
