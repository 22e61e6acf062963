//! Password digests.

use crate::error::{ErrorKind, Result};
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordVerifier, Version};
use exn::ResultExt;
use tracing::{debug, warn};

/// One-way password hashing.
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password into a self-describing digest.
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// Check a plaintext password against a digest produced by [`hash`](Self::hash).
    ///
    /// Returns `Ok(false)` for a wrong password. Comparison is constant-time.
    fn verify(&self, digest: &str, plaintext: &str) -> Result<bool>;
}

/// Argon2id hasher producing PHC strings (`$argon2id$v=19$m=...`).
///
/// Verification reads the cost parameters from the digest itself, so digests
/// made with different parameters stay verifiable.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self { params: Params::default() }
    }
}

impl Argon2Hasher {
    /// Custom cost parameters: memory in KiB, iterations, and parallelism.
    ///
    /// Cheap parameters make tests fast; never use them in production.
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None).or_raise(|| ErrorKind::Hashing)?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        use argon2::PasswordHasher as _;
        let salt = SaltString::generate(&mut OsRng);
        let digest = self.argon2().hash_password(plaintext.as_bytes(), &salt).or_raise(|| ErrorKind::Hashing)?;
        Ok(digest.to_string())
    }

    fn verify(&self, digest: &str, plaintext: &str) -> Result<bool> {
        let parsed = PasswordHash::new(digest).or_raise(|| ErrorKind::InvalidDigest)?;
        match self.argon2().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => {
                debug!(algorithm = %parsed.algorithm, "password mismatch");
                Ok(false)
            },
            Err(err) => {
                warn!(algorithm = %parsed.algorithm, error = %err, "digest could not be verified");
                Err(err).or_raise(|| ErrorKind::InvalidDigest)
            },
        }
    }
}
