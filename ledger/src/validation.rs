//! Per-field input validation and the canonicalising sanitiser.
//!
//! Each rule is a small function returning a [`FieldError`] naming the
//! offending field with a human-readable reason; the gateway surfaces
//! these as `BAD_REQUEST`. Callers sanitise free-text inputs first, then
//! validate the canonical form.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$")
        .expect("email pattern should compile")
});

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("username pattern should compile"));

static VOTER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9]{16}$").expect("voter id pattern should compile"));

static POLL_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$")
        .expect("poll id pattern should compile")
});

/// A failed field validation: which field, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl FieldError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl std::error::Error for FieldError {}

/// Strips NUL and non-printable control characters (tab and newline stay)
/// and trims surrounding whitespace.
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\t' || *c == '\n')
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn validate_email(email: &str) -> Result<(), FieldError> {
    if email.is_empty() {
        return Err(FieldError::new("email", "must not be empty"));
    }
    if email.len() > 254 {
        return Err(FieldError::new("email", "must be at most 254 characters"));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(FieldError::new("email", "is not a valid email address"));
    }
    Ok(())
}

/// Shared rule for display names and department labels: 2–100 characters
/// after trimming.
pub fn validate_name(field: &'static str, value: &str) -> Result<(), FieldError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if !(2..=100).contains(&len) {
        return Err(FieldError::new(field, "must be 2 to 100 characters"));
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), FieldError> {
    let trimmed = username.trim();
    let len = trimmed.chars().count();
    if !(3..=50).contains(&len) {
        return Err(FieldError::new("username", "must be 3 to 50 characters"));
    }
    if !USERNAME_RE.is_match(trimmed) {
        return Err(FieldError::new(
            "username",
            "may only contain letters, digits, underscore, and dash",
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), FieldError> {
    let len = password.chars().count();
    if !(8..=128).contains(&len) {
        return Err(FieldError::new("password", "must be 8 to 128 characters"));
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(FieldError::new("password", "must contain a letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(FieldError::new("password", "must contain a digit"));
    }
    Ok(())
}

pub fn validate_poll_title(title: &str) -> Result<(), FieldError> {
    let len = title.chars().count();
    if !(5..=200).contains(&len) {
        return Err(FieldError::new("title", "must be 5 to 200 characters"));
    }
    Ok(())
}

pub fn validate_poll_description(description: &str) -> Result<(), FieldError> {
    let len = description.chars().count();
    if !(10..=1000).contains(&len) {
        return Err(FieldError::new(
            "description",
            "must be 10 to 1000 characters",
        ));
    }
    Ok(())
}

/// 2–20 options, each 1–100 characters, pairwise distinct after
/// case-folding.
pub fn validate_poll_options(options: &[String]) -> Result<(), FieldError> {
    if !(2..=20).contains(&options.len()) {
        return Err(FieldError::new("options", "must list 2 to 20 options"));
    }
    let mut seen = HashSet::with_capacity(options.len());
    for option in options {
        let len = option.chars().count();
        if !(1..=100).contains(&len) {
            return Err(FieldError::new(
                "options",
                format!("option `{option}` must be 1 to 100 characters"),
            ));
        }
        if !seen.insert(option.to_lowercase()) {
            return Err(FieldError::new(
                "options",
                format!("option `{option}` duplicates another option"),
            ));
        }
    }
    Ok(())
}

pub fn validate_duration_hours(hours: i64) -> Result<(), FieldError> {
    if !(1..=8760).contains(&hours) {
        return Err(FieldError::new(
            "duration_hours",
            "must be between 1 and 8760",
        ));
    }
    Ok(())
}

pub fn validate_voter_id(voter_id: &str) -> Result<(), FieldError> {
    if !VOTER_ID_RE.is_match(voter_id) {
        return Err(FieldError::new(
            "voter_id",
            "must be 16 lowercase hex characters",
        ));
    }
    Ok(())
}

/// Checks the UUID shape and parses it.
pub fn validate_poll_id(poll_id: &str) -> Result<Uuid, FieldError> {
    if !POLL_ID_RE.is_match(poll_id) {
        return Err(FieldError::new("poll_id", "must be a lowercase UUID"));
    }
    Uuid::parse_str(poll_id).map_err(|e| FieldError::new("poll_id", e.to_string()))
}
