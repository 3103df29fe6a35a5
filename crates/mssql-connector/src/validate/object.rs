//! Validators for non-identifier attribute values that still end up inside
//! dynamically built statements (SIDs, permission names, enumerations).

use super::error::ValidationError;
use std::sync::LazyLock;

static SID_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^0x[0-9A-Fa-f]+$").expect("SID_REGEX is a valid regex pattern")
});

static PERMISSION_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Z]+( [A-Z]+)*$").expect("PERMISSION_REGEX is a valid regex pattern")
});

/// Validate a login SID written as a hex literal, e.g. `0x01A2`.
pub fn validate_sid(field: &str, value: &str) -> Result<(), ValidationError> {
    if SID_REGEX.is_match(value) {
        return Ok(());
    }
    Err(ValidationError::new(
        field,
        "invalid_format",
        format!("SID must be a hex literal starting with 0x. Got {value:?}"),
    ))
}

/// Validate a database permission name such as `SELECT` or `VIEW DEFINITION`.
pub fn validate_permission(field: &str, value: &str) -> Result<(), ValidationError> {
    if PERMISSION_REGEX.is_match(value) {
        return Ok(());
    }
    Err(ValidationError::new(
        field,
        "invalid_format",
        format!("permission must be uppercase words separated by single spaces. Got {value:?}"),
    ))
}

/// Validate that `value` is one of `allowed`.
pub fn validate_one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), ValidationError> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(ValidationError::new(
        field,
        "not_allowed",
        format!("expected {field} to be one of {allowed:?}, got {value}"),
    ))
}

/// Validate a `verify_object` descriptor: exactly `TYPE NAME`.
pub fn validate_verify_object(field: &str, value: &str) -> Result<(), ValidationError> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() == 2 {
        return Ok(());
    }
    Err(ValidationError::new(
        field,
        "invalid_format",
        format!("verify_object must be in format 'TYPE NAME', got {value:?}"),
    ))
}
