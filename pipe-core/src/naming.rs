//! Received file name policy.
//!
//! The sender chooses the file name, so the receiver treats it as untrusted:
//! anything that could escape the destination directory is rejected, and an
//! existing file is never overwritten. Collisions are resolved by appending
//! ` (n)` before the extension, trying n = 1, 2, ... up to
//! [`MAX_COLLISION_ATTEMPTS`] - 1, shortening the stem so that every
//! candidate stays within [`MAX_NAME_LEN`].
//!
//! The sender announces its own file name through [`sanitize_file_name`],
//! which maps any local name onto one the receiver will accept.

use thiserror::Error;

/// Number of candidate names tried before giving up (including the original).
pub const MAX_COLLISION_ATTEMPTS: u32 = 1000;

/// Maximum accepted file name length in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Reasons a received file name is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// Empty name.
    #[error("file name is empty")]
    Empty,
    /// `.` or `..`.
    #[error("file name {0:?} refers to a directory")]
    DotName(String),
    /// Contains `/`, `\` or a drive prefix.
    #[error("file name {0:?} contains a path separator")]
    PathSeparator(String),
    /// Contains NUL or other control characters.
    #[error("file name {0:?} contains control characters")]
    ControlCharacter(String),
    /// Longer than [`MAX_NAME_LEN`] bytes.
    #[error("file name is {0} bytes long")]
    TooLong(usize),
}

/// Validate a sender-supplied file name.
///
/// Returns the name unchanged if it is a plain relative file name.
pub fn validate_file_name(name: &str) -> Result<&str, NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(NameError::TooLong(name.len()));
    }
    if name == "." || name == ".." {
        return Err(NameError::DotName(name.to_string()));
    }
    if name.contains('/') || name.contains('\\') || name.contains(':') {
        return Err(NameError::PathSeparator(name.to_string()));
    }
    if name.chars().any(char::is_control) {
        return Err(NameError::ControlCharacter(name.escape_debug().to_string()));
    }
    Ok(name)
}

/// Name to announce for a local file.
///
/// Separators, `:` and control characters become `_`, the result is cut to
/// [`MAX_NAME_LEN`] bytes, and names that would still be refused fall back
/// to `file`. The output always passes [`validate_file_name`].
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cut = truncate_to(&replaced, MAX_NAME_LEN);
    match cut {
        "" | "." | ".." => "file".to_string(),
        cut => cut.to_string(),
    }
}

/// Candidate destination name for the given collision attempt.
///
/// Attempt 0 is the name itself; attempt n inserts ` (n)` before the
/// extension. Leading-dot names (`.bashrc`) have no extension. The stem is
/// shortened on a character boundary to keep the result within
/// [`MAX_NAME_LEN`] bytes; an extension too long to keep is treated as part
/// of the stem.
pub fn candidate_name(name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    let suffix = format!(" ({attempt})");
    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 && name.len() - idx + suffix.len() < MAX_NAME_LEN => {
            name.split_at(idx)
        }
        _ => (name, ""),
    };
    let budget = MAX_NAME_LEN - suffix.len() - ext.len();
    format!("{}{}{}", truncate_to(stem, budget), suffix, ext)
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate_to(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
