//! SQL identifier validation.
//!
//! Validates object names according to these rules:
//! - Length: 1-128 characters
//! - Must start with a letter, `_`, `@` or `#`
//! - Can contain: letters, digits, `_`, `.`, `@`, `#`, `-`
//!
//! Names that pass here are the only values allowed to reach the
//! server-side `QUOTENAME` path of [`crate::statement::DynamicSql`].

use super::error::ValidationError;
use std::sync::LazyLock;

static IDENTIFIER_CHARS: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[a-zA-Z0-9_.@#-]+$").expect("IDENTIFIER_CHARS is a valid regex pattern")
});

/// Identity accepted for credentials backed by a shared access signature.
pub const SHARED_ACCESS_SIGNATURE: &str = "SHARED ACCESS SIGNATURE";

/// Maximum identifier length (`sysname`).
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate a SQL identifier held in attribute `field`.
///
/// ```
/// use mssql_connector::validate::validate_sql_identifier;
///
/// assert!(validate_sql_identifier("login_name", "app_user").is_ok());
/// assert!(validate_sql_identifier("login_name", "#temp.name-1").is_ok());
/// assert!(validate_sql_identifier("login_name", "1user").is_err());
/// assert!(validate_sql_identifier("login_name", "a b").is_err());
/// ```
pub fn validate_sql_identifier(field: &str, value: &str) -> Result<(), ValidationError> {
    let Some(first) = value.chars().next() else {
        return Err(ValidationError::new(
            field,
            "too_short",
            format!("{field:?} cannot be less than 1 character"),
        )
        .with_limit(1, 0));
    };

    let length = value.chars().count();
    if length > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::new(
            field,
            "too_long",
            format!("{field:?} cannot be longer than {MAX_IDENTIFIER_LENGTH} characters: {value:?} {length}"),
        )
        .with_limit(MAX_IDENTIFIER_LENGTH, length));
    }

    if !IDENTIFIER_CHARS.is_match(value) {
        return Err(ValidationError::new(
            field,
            "invalid_format",
            format!(
                "invalid SQL identifier. SQL identifier allows letters, digits, @, #, -, . or _, start with letter, _, @ or #. Got {value:?}"
            ),
        ));
    }

    if !(first.is_ascii_alphabetic() || matches!(first, '_' | '@' | '#')) {
        return Err(ValidationError::new(
            field,
            "invalid_start",
            format!("SQL identifier must start with a letter, _, @ or #. Got {value:?}"),
        ));
    }

    Ok(())
}

/// Validate a credential identity: a SQL identifier or the
/// `SHARED ACCESS SIGNATURE` keyword.
pub fn validate_credential_identity(field: &str, value: &str) -> Result<(), ValidationError> {
    if value == SHARED_ACCESS_SIGNATURE {
        return Ok(());
    }
    validate_sql_identifier(field, value)
}
