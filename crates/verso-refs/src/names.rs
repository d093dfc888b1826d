//! Reference name validation.
//!
//! Valid names are non-empty, contain no whitespace or control characters,
//! none of `~ ^ : ? * [ \`, no `..` or `@{`, do not start or end with `.`
//! or `/`, and have no empty `/`-separated components.

use crate::error::{RefError, RefResult};

const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

/// Validate a branch or tag name.
///
/// ```
/// use verso_refs::validate_ref_name;
///
/// assert!(validate_ref_name("main").is_ok());
/// assert!(validate_ref_name("release/2024-10").is_ok());
/// assert!(validate_ref_name("").is_err());
/// assert!(validate_ref_name("bad..name").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> RefResult<()> {
    let invalid = |reason: String| RefError::InvalidName {
        name: name.to_string(),
        reason,
    };
    if name.is_empty() {
        return Err(invalid("must not be empty".into()));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(invalid(format!("contains forbidden character {ch:?}")));
    }
    for seq in ["..", "@{"] {
        if name.contains(seq) {
            return Err(invalid(format!("must not contain '{seq}'")));
        }
    }
    if name.starts_with(['.', '/']) || name.ends_with(['.', '/']) {
        return Err(invalid("must not start or end with '.' or '/'".into()));
    }
    if name.split('/').any(str::is_empty) {
        return Err(invalid("path components must not be empty".into()));
    }
    Ok(())
}
