//! Input validation.
//!
//! Every check fails with [`ErrorKind::ValidationFailed`] carrying a message
//! that can be shown to the user as-is.

use crate::error::{ErrorKind, Result};
use regex::Regex;
use std::sync::LazyLock;
use strongbox_store::{AccessLimit, MAX_ACCESS_LIMIT};
use time::Duration;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

regex!(EMAIL_REGEX, r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$");
regex!(FULL_NAME_REGEX, r"^[a-zA-Z\s\-']+$");

/// Largest accepted upload, in bytes.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
/// Longest share lifetime.
pub const MAX_SHARE_LIFETIME: Duration = Duration::days(30);
/// Share lifetime when neither days nor hours are given.
pub const DEFAULT_SHARE_LIFETIME: Duration = Duration::hours(24);

const MAX_TEXT_LEN: usize = 255;
const PASSWORD_SPECIALS: &str = "!@#$%^&*(),.?\":{}|<>";
const BLOCKED_EXTENSIONS: &[&str] = &["exe", "bat", "cmd", "com", "pif", "scr", "vbs", "js", "jar", "sh"];
const ALLOWED_MIME_TYPES: &[&str] = &[
    // Documents
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/plain",
    "text/csv",
    // Images
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    // Archives
    "application/zip",
    "application/x-zip-compressed",
    "application/x-rar-compressed",
    "application/x-7z-compressed",
    "application/gzip",
    "application/x-tar",
    // Code
    "text/html",
    "text/css",
    "text/javascript",
    "application/json",
    "application/xml",
];

fn fail<T>(reason: impl Into<String>) -> Result<T> {
    Err(exn::Exn::from(ErrorKind::invalid(reason)))
}

/// Trim and lowercase an email address, then check its shape.
pub fn email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return fail("email is required");
    }
    if email.len() > MAX_TEXT_LEN {
        return fail("email is too long (max 255 characters)");
    }
    if !EMAIL_REGEX.is_match(&email) {
        return fail("invalid email format");
    }
    Ok(email)
}

/// Account password strength.
pub fn account_password(password: &str) -> Result<()> {
    let length = password.chars().count();
    if password.is_empty() {
        return fail("password is required");
    }
    if length < 12 {
        return fail("password must be at least 12 characters long");
    }
    if length > 128 {
        return fail("password is too long (max 128 characters)");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return fail("password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return fail("password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return fail("password must contain at least one digit");
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        return fail("password must contain at least one special character");
    }
    Ok(())
}

pub fn full_name(name: &str) -> Result<()> {
    let length = name.chars().count();
    if name.is_empty() {
        return fail("full name is required");
    }
    if length < 2 {
        return fail("full name must be at least 2 characters");
    }
    if length > MAX_TEXT_LEN {
        return fail("full name is too long (max 255 characters)");
    }
    if !FULL_NAME_REGEX.is_match(name) {
        return fail("full name can only contain letters, spaces, hyphens, and apostrophes");
    }
    Ok(())
}

/// Size bounds and MIME allow-list for an upload.
///
/// Returns the bare, lowercased media type (parameters stripped).
pub fn file(size: u64, mime_type: &str) -> Result<String> {
    if size == 0 {
        return fail("file is empty");
    }
    if size > MAX_FILE_SIZE {
        return fail("file size exceeds maximum allowed (100 MB)");
    }
    let essence = mime_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if !ALLOWED_MIME_TYPES.contains(&essence.as_str()) {
        return fail(format!("file type not allowed: {mime_type}"));
    }
    Ok(essence)
}

/// Reject names that could escape a directory or smuggle an executable.
///
/// Returns the lowercased extension, without the dot.
pub fn filename(name: &str) -> Result<String> {
    if name.is_empty() {
        return fail("filename is required");
    }
    if name.chars().count() > MAX_TEXT_LEN {
        return fail("filename is too long (max 255 characters)");
    }
    if name.contains("..") {
        return fail("filename contains invalid characters");
    }
    if name.contains('\0') {
        return fail("filename contains null bytes");
    }
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let Some((_, extension)) = base.rsplit_once('.').filter(|(_, ext)| !ext.is_empty()) else {
        return fail("file must have an extension");
    };
    let extension = extension.to_ascii_lowercase();
    if !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return fail(format!("file extension not allowed: .{extension}"));
    }
    if BLOCKED_EXTENSIONS.contains(&extension.as_str()) {
        return fail(format!("file type not allowed: .{extension}"));
    }
    Ok(extension)
}

/// Share lifetime from optional days and hours.
pub fn share_lifetime(days: Option<i64>, hours: Option<i64>) -> Result<Duration> {
    let (days, hours) = (days.unwrap_or(0), hours.unwrap_or(0));
    if days < 0 || hours < 0 {
        return fail("expiration values cannot be negative");
    }
    if days == 0 && hours == 0 {
        return Ok(DEFAULT_SHARE_LIFETIME);
    }
    let total = days.checked_mul(24).and_then(|h| h.checked_add(hours)).unwrap_or(i64::MAX);
    if total > MAX_SHARE_LIFETIME.whole_hours() {
        return fail("expiration time cannot exceed 30 days");
    }
    Ok(Duration::hours(total))
}

/// Share access limit, `-1` meaning unlimited.
pub fn share_max_access(max_access: i64) -> Result<AccessLimit> {
    if max_access < -1 {
        return fail("max access must be -1 (unlimited) or a positive number");
    }
    if max_access > i64::from(MAX_ACCESS_LIMIT) {
        return fail("max access cannot exceed 10,000");
    }
    AccessLimit::from_raw(max_access).ok_or_else(|| exn::Exn::from(ErrorKind::invalid("invalid max access")))
}

pub fn share_password(password: &str) -> Result<()> {
    let length = password.chars().count();
    if length < 6 {
        return fail("share password must be at least 6 characters");
    }
    if length > 128 {
        return fail("share password is too long (max 128 characters)");
    }
    Ok(())
}
