//! Cache Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Could not reach the backing store (connection refused, timeout).
    #[display("cache connection error")]
    Connection,
    /// The backing store answered with an error.
    #[display("cache command failed: {_0}")]
    Command(#[error(not(source))] &'static str),
    /// Value could not be (de)serialized. Treat as a miss.
    #[display("invalid cached value for key {_0}")]
    InvalidData(#[error(not(source))] String),
    /// Glob pattern could not be compiled.
    #[display("invalid key pattern: {_0}")]
    InvalidPattern(#[error(not(source))] String),
    /// The cache was disabled at startup.
    #[display("cache is disabled")]
    Disabled,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection | Self::Command(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::Command("SCAN").to_string(), "cache command failed: SCAN");
        let invalid = ErrorKind::InvalidData("user:id:1".to_string());
        assert_eq!(invalid.to_string(), "invalid cached value for key user:id:1");
        assert_eq!(ErrorKind::Disabled.to_string(), "cache is disabled");
    }

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Connection.is_retryable());
        assert!(!ErrorKind::InvalidData("k".to_string()).is_retryable());
        assert!(!ErrorKind::Disabled.is_retryable());
    }
}
