//! Library Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Outcomes that are part of normal operation (an expired
//! share, a missing share password) are not errors; see
//! [`ShareAccess`](crate::ShareAccess).

use derive_more::{Display, Error};
use strongbox_storage::error::{Error as BlobError, ErrorKind as BlobErrorKind};
use strongbox_store::error::{Error as StoreError, ErrorKind as StoreErrorKind};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("not found")]
    NotFound,
    /// Bad credentials, or an attempt to act on another user's document.
    #[display("unauthorized")]
    Unauthorized,
    #[display("already exists")]
    Conflict,
    #[display("validation failed: {_0}")]
    ValidationFailed(#[error(not(source))] String),
    /// The system of record failed.
    #[display("store error")]
    Store,
    /// The blob store failed.
    #[display("blob storage error")]
    Blob,
    /// A bulk cache invalidation failed. Individual cache errors are never
    /// surfaced.
    #[display("cache error")]
    Cache,
    /// Issuing a token or hashing a password failed.
    #[display("authentication backend error")]
    Auth,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store | Self::Blob | Self::Cache)
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::ValidationFailed(reason.into())
    }

    /// Wrap a store error, keeping unique-constraint violations distinct.
    #[track_caller]
    pub(crate) fn store(err: StoreError) -> Error {
        let kind = match &*err {
            StoreErrorKind::Conflict(_) => Self::Conflict,
            _ => Self::Store,
        };
        err.raise(kind)
    }

    /// Wrap a blob store error, keeping a missing blob distinct.
    #[track_caller]
    pub(crate) fn blob(err: BlobError) -> Error {
        let kind = match &*err {
            BlobErrorKind::NotFound(_) => Self::NotFound,
            BlobErrorKind::SizeMismatch { expected, actual } => {
                Self::ValidationFailed(format!("declared size {expected} does not match received {actual} bytes"))
            },
            _ => Self::Blob,
        };
        err.raise(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::invalid("file is empty").to_string(), "validation failed: file is empty");
        assert_eq!(ErrorKind::Unauthorized.to_string(), "unauthorized");
    }

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Store.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::invalid("x").is_retryable());
    }
}
