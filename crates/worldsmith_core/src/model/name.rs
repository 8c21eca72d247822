//! Name, description and art-path normalization.
//!
//! # Responsibility
//! - Produce the display form and the comparison key of user-entered names.
//! - Validate lengths before any storage I/O happens.
//!
//! # Invariants
//! - `name_key(a) == name_key(b)` iff the names differ only by surrounding
//!   whitespace, internal whitespace runs, or letter case.
//! - A normalized art path is relative, uses `/` separators and never
//!   contains `..` segments.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static REPEATED_SLASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"/{2,}").expect("valid regex"));
static DRIVE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]:").expect("valid regex"));
static ART_PATH_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._\-/]+$").expect("valid regex"));

/// Input rejected before reaching the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Name is empty after trimming.
    BlankName { field: &'static str },
    /// Value exceeds the configured maximum length (in chars).
    TooLong {
        field: &'static str,
        max_chars: usize,
        actual_chars: usize,
    },
    /// Art path is absolute, escapes its root or uses forbidden characters.
    InvalidArtPath { reason: &'static str },
    /// Any other malformed argument.
    InvalidInput(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName { field } => write!(f, "{field} must not be blank"),
            Self::TooLong {
                field,
                max_chars,
                actual_chars,
            } => write!(
                f,
                "{field} is {actual_chars} chars long, maximum is {max_chars}"
            ),
            Self::InvalidArtPath { reason } => write!(f, "invalid art path: {reason}"),
            Self::InvalidInput(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ValidationError {}

/// Trims and collapses every internal whitespace run to one space.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison key used by uniqueness checks: normalized and lowercased.
pub fn name_key(raw: &str) -> String {
    normalize_name(raw).to_lowercase()
}

/// Normalizes one name and enforces `1..=max_chars`.
pub fn validate_name(
    raw: &str,
    field: &'static str,
    max_chars: usize,
) -> Result<String, ValidationError> {
    let normalized = normalize_name(raw);
    if normalized.is_empty() {
        return Err(ValidationError::BlankName { field });
    }
    let actual_chars = normalized.chars().count();
    if actual_chars > max_chars {
        return Err(ValidationError::TooLong {
            field,
            max_chars,
            actual_chars,
        });
    }
    Ok(normalized)
}

/// Descriptions keep their text verbatim; only length is bounded.
pub fn validate_description(raw: &str, max_chars: usize) -> Result<String, ValidationError> {
    let actual_chars = raw.chars().count();
    if actual_chars > max_chars {
        return Err(ValidationError::TooLong {
            field: "description",
            max_chars,
            actual_chars,
        });
    }
    Ok(raw.to_string())
}

/// Normalizes a card art path.
///
/// Returns `Ok(None)` for blank input, which clears the path.
///
/// # Errors
/// - Rooted paths, drive letters, backslashes, `..` segments, whitespace and
///   characters outside `[A-Za-z0-9._-/]`.
pub fn normalize_art_path(raw: &str) -> Result<Option<String>, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.contains('\\') {
        return Err(ValidationError::InvalidArtPath {
            reason: "backslash separators are not allowed",
        });
    }
    if DRIVE_PREFIX.is_match(trimmed) {
        return Err(ValidationError::InvalidArtPath {
            reason: "drive-qualified paths are not allowed",
        });
    }

    let collapsed = REPEATED_SLASHES.replace_all(trimmed, "/");
    if collapsed.starts_with('/') {
        return Err(ValidationError::InvalidArtPath {
            reason: "path must be relative",
        });
    }
    if collapsed.split('/').any(|segment| segment == "..") {
        return Err(ValidationError::InvalidArtPath {
            reason: "parent segments are not allowed",
        });
    }
    if !ART_PATH_CHARSET.is_match(&collapsed) {
        return Err(ValidationError::InvalidArtPath {
            reason: "path contains forbidden characters",
        });
    }
    Ok(Some(collapsed.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::{name_key, normalize_art_path, normalize_name, validate_name, ValidationError};

    #[test]
    fn normalize_name_trims_and_collapses_whitespace() {
        assert_eq!(normalize_name("  Act \t  1 \n"), "Act 1");
        assert_eq!(normalize_name("   "), "");
    }

    #[test]
    fn name_key_ignores_case_and_spacing() {
        assert_eq!(name_key(" Intro "), name_key("intro"));
        assert_eq!(name_key("Dark   FOREST"), "dark forest");
        assert_ne!(name_key("Intro"), name_key("Intro 2"));
    }

    #[test]
    fn validate_name_enforces_bounds() {
        assert_eq!(validate_name(" Aldara ", "name", 10).unwrap(), "Aldara");
        assert!(matches!(
            validate_name(" \t ", "name", 10),
            Err(ValidationError::BlankName { field: "name" })
        ));
        assert!(matches!(
            validate_name("abcdefghijk", "name", 10),
            Err(ValidationError::TooLong { actual_chars: 11, .. })
        ));
    }

    #[test]
    fn art_path_is_normalized_or_rejected() {
        assert_eq!(
            normalize_art_path(" art//cards/potion.png ").unwrap().as_deref(),
            Some("art/cards/potion.png")
        );
        assert_eq!(normalize_art_path("   ").unwrap(), None);

        for bad in [
            "/abs/path.png",
            "C:/art.png",
            "art\\potion.png",
            "art/../secret.png",
            "art/my potion.png",
            "art/potion?.png",
        ] {
            assert!(
                normalize_art_path(bad).is_err(),
                "expected `{bad}` to be rejected"
            );
        }
    }
}
