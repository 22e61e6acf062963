//! Key validation and security utilities.
//!
//! Blob keys are built from user-controlled input (owner ids, filename
//! extensions), so every backend runs them through [`validate_key`] before
//! touching the filesystem or the network.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a blob key for security and correctness.
/// Ensures that keys don't escape the bucket (no `..` traversal).
///
/// > **Note:** This does **not** normalize backslashes or platform-specific
/// >           weirdness. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized key (components joined with `/`) if valid, or
/// [`InvalidKey`](crate::error::ErrorKind::InvalidKey) if invalid.
///
/// # Examples
///
/// ```
/// use strongbox_storage::validate_key;
/// // Valid keys
/// assert!(validate_key("0b7e/4f1c.pdf").is_ok());
/// assert!(validate_key("a/../file.pdf").is_ok()); // (never leaves the bucket)
/// // Invalid keys
/// assert!(validate_key("../etc/passwd").is_err());
/// assert!(validate_key("a/../../b").is_err());
/// assert!(validate_key("a\0b").is_err());
/// // Keys get resolved
/// assert_eq!(validate_key("wrong/../owner/.//doc.pdf/").unwrap(), "owner/doc.pdf");
/// ```
pub fn validate_key(key: &str) -> Result<String> {
    let mut components = Vec::new();
    for component in Path::new(key).components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls; reject them explicitly.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidKey(key.to_string()));
                }
                let Some(s) = s.to_str() else {
                    exn::bail!(ErrorKind::InvalidKey(key.to_string()));
                };
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidKey(key.to_string()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
        false => Ok(components.join("/")),
    }
}

/// Validates a bucket name.
///
/// Follows the S3 naming rules (3-63 characters of lowercase letters,
/// digits, dots and hyphens, starting and ending with a letter or digit) so
/// that a bucket name that works locally also works against S3.
///
/// ```
/// use strongbox_storage::validate_bucket;
/// assert!(validate_bucket("documents").is_ok());
/// assert!(validate_bucket("Documents").is_err());
/// assert!(validate_bucket("../documents").is_err());
/// ```
pub fn validate_bucket(bucket: &str) -> Result<&str> {
    let valid_length = (3..=63).contains(&bucket.len());
    let valid_chars = bucket.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-');
    let valid_edges = bucket.starts_with(|c: char| c.is_ascii_alphanumeric())
        && bucket.ends_with(|c: char| c.is_ascii_alphanumeric());
    if !valid_length || !valid_chars || !valid_edges || bucket.contains("..") {
        exn::bail!(ErrorKind::InvalidBucket(bucket.to_string()));
    }
    Ok(bucket)
}

/// Joins a validated bucket and key into a relative filesystem path.
pub(crate) fn relative_path(bucket: &str, key: &str) -> Result<PathBuf> {
    let bucket = validate_bucket(bucket)?;
    let key = validate_key(key)?;
    Ok(Path::new(bucket).join(key))
}
