//! Redis-style glob patterns, for backends that have to match keys
//! themselves.
//!
//! Supported: `*`, `?`, `[abc]`, `[^abc]`, `[a-z]` and `\` escapes.

use crate::error::{ErrorKind, Result};
use regex::Regex;

/// Compile a Redis glob pattern into an anchored regular expression.
pub(crate) fn compile(pattern: &str) -> Result<Regex> {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => out.push_str(&regex::escape(&escaped.to_string())),
                None => exn::bail!(ErrorKind::InvalidPattern(pattern.to_string())),
            },
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                for member in chars.by_ref() {
                    match member {
                        ']' => {
                            closed = true;
                            break;
                        },
                        '-' => out.push('-'),
                        other => out.push_str(&regex::escape(&other.to_string())),
                    }
                }
                if !closed {
                    exn::bail!(ErrorKind::InvalidPattern(pattern.to_string()));
                }
                out.push(']');
            },
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).map_err(|_| ErrorKind::InvalidPattern(pattern.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("share:*", "share:token:abc", true)]
    #[case("share:*", "share:", true)]
    #[case("share:*", "user:id:1", false)]
    #[case("user:?d:*", "user:id:1", true)]
    #[case("user:?d:*", "user:email:a@b.c", false)]
    #[case("documents:user:[0-9]*", "documents:user:7f", true)]
    #[case("documents:user:[^0-9]*", "documents:user:7f", false)]
    #[case("a.b", "axb", false)]
    #[case("a\\*b", "a*b", true)]
    #[case("a\\*b", "axxb", false)]
    fn test_matching(#[case] pattern: &str, #[case] key: &str, #[case] expected: bool) {
        assert_eq!(compile(pattern).unwrap().is_match(key), expected);
    }

    #[rstest]
    #[case("share:[abc")]
    #[case("trailing\\")]
    fn test_invalid(#[case] pattern: &str) {
        let err = compile(pattern).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPattern(_)));
    }
}
