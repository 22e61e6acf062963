//! Auth Error Types

use derive_more::{Display, Error};

/// An auth error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed token, bad signature, or claims that don't parse.
    #[display("invalid token")]
    InvalidToken,
    #[display("token expired")]
    ExpiredToken,
    /// Signing failed, or the signing key is unusable.
    #[display("could not issue token")]
    Issue,
    /// Hashing failed, or the hasher was given unusable parameters.
    #[display("password hashing failed")]
    Hashing,
    /// A stored digest is not a valid PHC string.
    #[display("invalid password digest")]
    InvalidDigest,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
