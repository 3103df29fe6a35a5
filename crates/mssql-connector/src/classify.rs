//! Error classification.
//!
//! Two questions are asked of driver errors: should the connect loop give up
//! immediately, and does the error mean the object is missing. Structured
//! SQL Server error numbers are checked first, then case-insensitive
//! message fragments.

use crate::error::ConnectorError;

/// Login failures and database access errors that never heal by retrying.
pub const TERMINAL_ERROR_NUMBERS: &[u32] = &[
    18452, // login from untrusted domain
    18456, // login failed
    18470, // account disabled
    18486, // account locked out
    18487, // password expired
    18488, // password must be changed
    4060,  // cannot open database requested by the login
];

/// Message fragments marking a terminal connection error.
pub const TERMINAL_PATTERNS: &[&str] = &[
    "login failed",
    "login error",
    "error retrieving access token",
    "authenticationfailederror",
    "credential",
    "request failed",
];

/// Invalid object name, cannot drop (not found), object does not exist.
pub const MISSING_OBJECT_ERROR_NUMBERS: &[u32] = &[208, 3701, 15151];

/// Message fragments marking a missing object.
pub const MISSING_OBJECT_PATTERNS: &[&str] = &["invalid object name", "does not exist"];

/// Decides how driver errors are treated.
pub trait ErrorClassifier: Send + Sync {
    /// The connect loop must stop retrying.
    fn is_terminal_connect_error(&self, err: &ConnectorError) -> bool;

    /// The error means the object (or its parent) does not exist.
    fn is_missing_object(&self, err: &ConnectorError) -> bool;
}

/// Default classifier using [`TERMINAL_ERROR_NUMBERS`], [`TERMINAL_PATTERNS`],
/// [`MISSING_OBJECT_ERROR_NUMBERS`] and [`MISSING_OBJECT_PATTERNS`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl DefaultClassifier {
    fn matches(err: &ConnectorError, numbers: &[u32], patterns: &[&str]) -> bool {
        if let Some(number) = err.root_cause().sql_error_number() {
            if numbers.contains(&number) {
                return true;
            }
        }
        let text = err.chain_text().to_lowercase();
        patterns.iter().any(|pattern| text.contains(pattern))
    }
}

impl ErrorClassifier for DefaultClassifier {
    fn is_terminal_connect_error(&self, err: &ConnectorError) -> bool {
        match err {
            ConnectorError::AuthenticationFailed { .. }
            | ConnectorError::TokenAcquisition { .. }
            | ConnectorError::InvalidConfiguration { .. }
            | ConnectorError::Cancelled => true,
            _ => Self::matches(err, TERMINAL_ERROR_NUMBERS, TERMINAL_PATTERNS),
        }
    }

    fn is_missing_object(&self, err: &ConnectorError) -> bool {
        Self::matches(err, MISSING_OBJECT_ERROR_NUMBERS, MISSING_OBJECT_PATTERNS)
    }
}
