//! Session tokens.
//!
//! Tokens are HS256 JWTs. Signature checking is left to `jsonwebtoken`, but
//! expiry is checked here against the `now` the caller passes in, so the
//! caller's clock (not the system clock) decides whether a token is still
//! valid.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use time::{Duration, UtcDateTime};
use tracing::debug;
use uuid::Uuid;

/// Shortest accepted signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Issues and verifies session tokens.
pub trait TokenService: Send + Sync {
    /// Issue a token for `user_id` that expires `ttl` after `now`.
    fn issue(&self, user_id: Uuid, ttl: Duration, now: UtcDateTime) -> Result<String>;

    /// Verify a token's signature and expiry, returning the user it was
    /// issued for.
    fn verify(&self, token: &str, now: UtcDateTime) -> Result<Uuid>;
}

/// Registered claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 JWT implementation of [`TokenService`].
#[derive(Clone)]
pub struct JwtTokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtTokenService").finish_non_exhaustive()
    }
}

impl JwtTokenService {
    /// Fails with [`ErrorKind::Issue`] if the secret is shorter than
    /// [`MIN_SECRET_LEN`] bytes.
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            exn::bail!(ErrorKind::Issue);
        }
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the caller's clock in `verify`.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string(), "sub".to_string()]);
        Ok(Self { encoding: EncodingKey::from_secret(secret), decoding: DecodingKey::from_secret(secret), validation })
    }
}

impl TokenService for JwtTokenService {
    fn issue(&self, user_id: Uuid, ttl: Duration, now: UtcDateTime) -> Result<String> {
        let claims = Claims { sub: user_id.to_string(), iat: now.unix_timestamp(), exp: (now + ttl).unix_timestamp() };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).or_raise(|| ErrorKind::Issue)
    }

    fn verify(&self, token: &str, now: UtcDateTime) -> Result<Uuid> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).or_raise(|| ErrorKind::InvalidToken)?;
        if now.unix_timestamp() >= data.claims.exp {
            debug!(sub = %data.claims.sub, exp = data.claims.exp, "session token expired");
            exn::bail!(ErrorKind::ExpiredToken);
        }
        Uuid::parse_str(&data.claims.sub).or_raise(|| ErrorKind::InvalidToken)
    }
}
