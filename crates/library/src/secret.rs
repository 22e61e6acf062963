//! Password hashing off the async runtime.
//!
//! Argon2 is deliberately slow, so both directions run on the blocking pool.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::sync::Arc;
use strongbox_auth::PasswordHasher;

pub type HasherHandle = Arc<dyn PasswordHasher + Send + Sync>;

pub(crate) async fn hash(hasher: &HasherHandle, plaintext: &str) -> Result<String> {
    let (hasher, plaintext) = (Arc::clone(hasher), plaintext.to_string());
    tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
        .await
        .or_raise(|| ErrorKind::Auth)?
        .or_raise(|| ErrorKind::Auth)
}

pub(crate) async fn verify(hasher: &HasherHandle, digest: &str, plaintext: &str) -> Result<bool> {
    let (hasher, digest, plaintext) = (Arc::clone(hasher), digest.to_string(), plaintext.to_string());
    tokio::task::spawn_blocking(move || hasher.verify(&digest, &plaintext))
        .await
        .or_raise(|| ErrorKind::Auth)?
        .or_raise(|| ErrorKind::Auth)
}
