//! Path Validation module for download destinations
//!
//! Every image lands in the download directory under the final path segment of
//! its URL. This module derives that name and makes sure it cannot escape the
//! directory or collide with reserved names:
//!
//! - Path traversal (`..`) and separators are never part of a file name
//! - Forbidden and control characters are replaced with underscores
//! - Windows reserved names (CON, PRN, ...) are rejected
//! - Length is capped at 255 bytes, preserving the extension
//!
//! ## Usage Examples
//!
//! ```rust
//! use label_measure::path_validation::{file_name_from_url, sanitize_filename};
//!
//! let name = file_name_from_url("https://m.media-amazon.com/images/I/61I9XdN6OFL.jpg?x=1");
//! assert_eq!(name.as_deref(), Ok("61I9XdN6OFL.jpg"));
//!
//! assert_eq!(sanitize_filename("unsafe<name>.jpg"), "unsafe_name_.jpg");
//! ```

/// Errors that can occur during path validation
#[derive(Debug, Clone, PartialEq)]
pub enum PathValidationError {
    /// The URL could not be parsed
    InvalidUrl(String),
    /// The URL has no usable final path segment
    MissingFileName,
    /// File name contains dangerous traversal sequences (..)
    PathTraversal,
    /// File name contains invalid characters
    InvalidCharacters,
    /// File name is too long
    FilenameTooLong,
    /// File name uses a reserved name
    ReservedName,
    /// Empty name provided
    EmptyPath,
}

impl std::fmt::Display for PathValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathValidationError::InvalidUrl(reason) => write!(f, "invalid URL: {}", reason),
            PathValidationError::MissingFileName => write!(f, "URL has no file name segment"),
            PathValidationError::PathTraversal => write!(f, "file name contains '..'"),
            PathValidationError::InvalidCharacters => write!(f, "file name contains invalid characters"),
            PathValidationError::FilenameTooLong => write!(f, "file name is too long"),
            PathValidationError::ReservedName => write!(f, "file name is reserved"),
            PathValidationError::EmptyPath => write!(f, "empty file name"),
        }
    }
}

impl std::error::Error for PathValidationError {}

/// Result type for path validation operations
pub type PathValidationResult<T> = Result<T, PathValidationError>;

/// Maximum allowed filename length (255 bytes on most filesystems)
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Reserved filenames that should not be used (Windows compatibility)
pub const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Characters that are not allowed in filenames
pub const FORBIDDEN_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/', '\\'];

/// Validate a bare file name (no directories)
pub fn validate_filename(filename: &str) -> PathValidationResult<()> {
    if filename.is_empty() {
        return Err(PathValidationError::EmptyPath);
    }

    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(PathValidationError::FilenameTooLong);
    }

    if filename == "." || filename.contains("..") {
        return Err(PathValidationError::PathTraversal);
    }

    // Check for reserved names (case-insensitive)
    let filename_upper = filename.to_uppercase();
    let name_without_ext = filename_upper.split('.').next().unwrap_or("");
    if RESERVED_NAMES.contains(&name_without_ext) {
        return Err(PathValidationError::ReservedName);
    }

    if filename
        .chars()
        .any(|c| FORBIDDEN_FILENAME_CHARS.contains(&c) || c.is_control())
    {
        return Err(PathValidationError::InvalidCharacters);
    }

    Ok(())
}

/// Sanitize a filename by replacing dangerous characters
///
/// ```rust
/// use label_measure::path_validation::sanitize_filename;
///
/// assert_eq!(sanitize_filename("safe_file.jpg"), "safe_file.jpg");
/// assert_eq!(sanitize_filename("a..b.png"), "a_b.png");
/// assert_eq!(sanitize_filename(" . "), "unnamed_file");
/// ```
pub fn sanitize_filename(filename: &str) -> String {
    let mut sanitized: String = filename
        .chars()
        .map(|c| {
            if FORBIDDEN_FILENAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    while sanitized.contains("..") {
        sanitized = sanitized.replace("..", "_");
    }

    // Leading/trailing dots and spaces cause trouble on Windows
    sanitized = sanitized.trim_matches(|c: char| c == '.' || c.is_whitespace()).to_string();
    if sanitized.is_empty() {
        sanitized = "unnamed_file".to_string();
    }

    if sanitized.len() > MAX_FILENAME_LENGTH {
        sanitized = truncate_preserving_extension(&sanitized);
    }

    sanitized
}

fn truncate_preserving_extension(name: &str) -> String {
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if name.len() - dot <= 16 => name.split_at(dot),
        _ => (name, ""),
    };
    let budget = MAX_FILENAME_LENGTH.saturating_sub(ext.len());
    let mut cut = budget.min(stem.len());
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &stem[..cut], ext)
}

/// Derive the destination file name from an image URL.
///
/// Uses the last non-empty path segment, ignoring query and fragment, then
/// sanitizes it. Fails for unparseable URLs and URLs without a path segment.
pub fn file_name_from_url(url: &str) -> PathValidationResult<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(PathValidationError::EmptyPath);
    }

    let parsed =
        reqwest::Url::parse(trimmed).map_err(|e| PathValidationError::InvalidUrl(e.to_string()))?;
    if parsed.cannot_be_a_base() {
        return Err(PathValidationError::InvalidUrl(format!(
            "'{}' has no hierarchical path",
            trimmed
        )));
    }

    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .ok_or(PathValidationError::MissingFileName)?;

    let name = sanitize_filename(segment);
    validate_filename(&name)?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://example.com/images/I/71abc.jpg"),
            Ok("71abc.jpg".to_string())
        );
        assert_eq!(
            file_name_from_url("https://example.com/a/b.png#frag"),
            Ok("b.png".to_string())
        );
        assert_eq!(
            file_name_from_url("https://example.com/a/b.png/"),
            Ok("b.png".to_string())
        );
    }

    #[test]
    fn test_file_name_from_url_rejects_unusable_urls() {
        assert_eq!(file_name_from_url(""), Err(PathValidationError::EmptyPath));
        assert_eq!(file_name_from_url("   "), Err(PathValidationError::EmptyPath));
        assert!(matches!(
            file_name_from_url("not a url"),
            Err(PathValidationError::InvalidUrl(_))
        ));
        assert_eq!(
            file_name_from_url("https://example.com/"),
            Err(PathValidationError::MissingFileName)
        );
        assert!(file_name_from_url("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("image.jpg").is_ok());
        assert_eq!(validate_filename(""), Err(PathValidationError::EmptyPath));
        assert_eq!(validate_filename("CON.jpg"), Err(PathValidationError::ReservedName));
        assert_eq!(validate_filename("a..b"), Err(PathValidationError::PathTraversal));
        assert_eq!(
            validate_filename("a<b.jpg"),
            Err(PathValidationError::InvalidCharacters)
        );
        let long_name = "a".repeat(MAX_FILENAME_LENGTH + 1);
        assert_eq!(
            validate_filename(&long_name),
            Err(PathValidationError::FilenameTooLong)
        );
    }

    #[test]
    fn test_sanitize_long_name_keeps_extension() {
        let long_name = format!("{}.jpg", "x".repeat(400));
        let sanitized = sanitize_filename(&long_name);
        assert_eq!(sanitized.len(), MAX_FILENAME_LENGTH);
        assert!(sanitized.ends_with(".jpg"));
    }
}
