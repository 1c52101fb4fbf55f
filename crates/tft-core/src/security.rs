//! Sanitization of untrusted text arriving from the touchscreen.
//!
//! Both functions are pure.  Anything the touchscreen sends is treated as
//! untrusted: command text is reduced to an allow-list of characters before it
//! reaches the host, and job filenames must be a single relative path segment.

use std::path::Path;

/// Longest command text forwarded to the host, in characters.
pub const MAX_COMMAND_LEN: usize = 1000;

/// Longest accepted job filename, in characters.
pub const MAX_FILENAME_LEN: usize = 255;

/// Returns `true` if `name` is safe to pass to the host as a job filename.
///
/// Rejects empty names, anything containing `..`, absolute paths, backslash
/// separators, and names longer than [`MAX_FILENAME_LEN`] characters.
///
/// ```rust
/// use tft_core::security::validate_filename;
///
/// assert!(validate_filename("job.gcode"));
/// assert!(!validate_filename("../../etc/passwd"));
/// assert!(!validate_filename("/abs/path.gcode"));
/// ```
pub fn validate_filename(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    if name.contains("..") || name.starts_with('/') || name.contains('\\') {
        return false;
    }
    if Path::new(name).is_absolute() {
        return false;
    }
    name.chars().count() <= MAX_FILENAME_LEN
}

fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c.is_whitespace() || matches!(c, '.' | '-' | '+' | '=' | ':')
}

/// Strips characters outside the command allow-list and bounds the length.
///
/// The allow-list is letters, digits, `_`, whitespace, and `. - + = :`.  The
/// filtered text is truncated to [`MAX_COMMAND_LEN`] characters and then
/// trimmed, so `sanitize_command(sanitize_command(x)) == sanitize_command(x)`.
pub fn sanitize_command(text: &str) -> String {
    let filtered: String = text
        .chars()
        .filter(|&c| is_allowed(c))
        .take(MAX_COMMAND_LEN)
        .collect();
    filtered.trim().to_string()
}
