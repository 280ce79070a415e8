//! Input validation for request parameters.
//!
//! All checks here run before any database call or subprocess.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static COMMIT_SHA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9]{6,40}$").expect("valid sha regex"));

static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid slug regex"));

pub const MAX_SLUG_LEN: usize = 64;

/// A request field that failed validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("sha must be 6-40 lowercase hex characters, got '{0}'")]
    BadSha(String),

    #[error(
        "slug must be lowercase letters, digits and single hyphens (max {MAX_SLUG_LEN} chars), got '{0}'"
    )]
    BadSlug(String),

    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub fn validate_commit_sha(sha: &str) -> Result<&str, ValidationError> {
    if COMMIT_SHA.is_match(sha) {
        Ok(sha)
    } else {
        Err(ValidationError::BadSha(sha.to_string()))
    }
}

pub fn validate_slug(slug: &str) -> Result<&str, ValidationError> {
    if slug.len() <= MAX_SLUG_LEN && SLUG.is_match(slug) {
        Ok(slug)
    } else {
        Err(ValidationError::BadSlug(slug.to_string()))
    }
}

/// Trimmed value of a required text field.
pub fn require<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::Missing { field }),
    }
}
