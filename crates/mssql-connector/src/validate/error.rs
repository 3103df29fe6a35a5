//! Validation error type.

use thiserror::Error;

/// Length or count bound a value failed to meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub expected: usize,
    pub actual: usize,
}

/// An attribute value rejected at plan time.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    pub field: String,
    /// Stable code, e.g. `too_short` or `invalid_format`.
    pub code: String,
    pub message: String,
    pub limit: Option<Limit>,
}

impl ValidationError {
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
            limit: None,
        }
    }

    /// Attach the bound that was broken.
    #[must_use]
    pub fn with_limit(mut self, expected: usize, actual: usize) -> Self {
        self.limit = Some(Limit { expected, actual });
        self
    }
}
