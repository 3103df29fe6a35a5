//! Password complexity validation.
//!
//! A password must be 8-128 characters long and contain characters from at
//! least three of: lowercase letters, uppercase letters, digits and
//! non-alphanumeric characters.

use super::error::ValidationError;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length.
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Number of character categories a password must draw from.
const REQUIRED_CATEGORIES: usize = 3;

/// Validate a login password held in attribute `field`.
///
/// ```
/// use mssql_connector::validate::validate_password;
///
/// assert!(validate_password("password", "Abcdefg1").is_ok());
/// assert!(validate_password("password", "shotpas").is_err());
/// assert!(validate_password("password", "alllowercase1").is_err());
/// ```
pub fn validate_password(field: &str, value: &str) -> Result<(), ValidationError> {
    let length = value.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::new(
            field,
            "too_short",
            format!("length should equal to or greater than {MIN_PASSWORD_LENGTH}, got {length}"),
        )
        .with_limit(MIN_PASSWORD_LENGTH, length));
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::new(
            field,
            "too_long",
            format!("length should be equal to or less than {MAX_PASSWORD_LENGTH}, got {length}"),
        )
        .with_limit(MAX_PASSWORD_LENGTH, length));
    }

    let categories = [
        value.chars().any(|c| c.is_lowercase()),
        value.chars().any(|c| c.is_uppercase()),
        value.chars().any(|c| c.is_ascii_digit()),
        value.chars().any(|c| !c.is_alphanumeric()),
    ];
    let present = categories.iter().filter(|present| **present).count();

    if present < REQUIRED_CATEGORIES {
        return Err(ValidationError::new(
            field,
            "insufficient_complexity",
            format!(
                "{field:?} must contain characters from three of the categories - uppercase letters, lowercase letters, numbers and non-alphanumeric characters"
            ),
        )
        .with_limit(REQUIRED_CATEGORIES, present));
    }

    Ok(())
}
