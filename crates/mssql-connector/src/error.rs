//! Reconciliation error types
//!
//! Error definitions with transient/terminal classification used by the
//! connect loop and by the orchestrator when wrapping remote failures.

use thiserror::Error;

use crate::validate::ValidationError;

/// Error that can occur while reconciling a database object.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Connection errors (usually transient)
    /// Failed to establish a connection to the server.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The connect loop ran out of time.
    #[error("connection timeout after {timeout_secs} seconds{}", last_error_suffix(.last_error))]
    ConnectionTimeout {
        timeout_secs: u64,
        last_error: Option<String>,
    },

    /// Network error during communication.
    #[error("network error: {message}")]
    NetworkError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The operation context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    // Authentication errors (terminal)
    /// The server rejected the login.
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A bearer token could not be obtained from the identity provider.
    #[error("error retrieving access token: {message}")]
    TokenAcquisition { message: String },

    // Configuration errors (terminal)
    /// Provider or server block configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// An attribute failed plan-time validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An external identifier could not be parsed.
    #[error("invalid ID '{id}': {message}")]
    InvalidIdentifier { id: String, message: String },

    /// The verify_object type has no existence query.
    #[error("unsupported object type: {object_type}")]
    UnsupportedObjectType { object_type: String },

    /// The server edition does not support the object kind.
    #[error("{message}")]
    IncompatibleServer { message: String },

    /// The kind does not implement the requested operation.
    #[error("{operation} is not supported for {kind}")]
    Unsupported {
        kind: &'static str,
        operation: &'static str,
    },

    // Operation errors
    /// An object referenced by an import does not exist.
    #[error("{identifier}")]
    ObjectNotFound { identifier: String },

    /// A remote create/update/delete failed.
    #[error("{message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A row did not have the expected shape.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    // Driver errors
    /// Error returned by the server while running a statement.
    #[error("database error: {message}")]
    Database {
        message: String,
        /// SQL Server error number, when the driver exposes one.
        code: Option<u32>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(": {e}"),
        None => String::new(),
    }
}

impl ConnectorError {
    /// Check if this error is transient and the connect loop should retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. } | ConnectorError::NetworkError { .. }
        )
    }

    /// Check if this error ends the connect loop immediately.
    pub fn is_terminal(&self) -> bool {
        !self.is_transient()
    }

    /// SQL Server error number carried by this error, if any.
    pub fn sql_error_number(&self) -> Option<u32> {
        match self {
            ConnectorError::Database { code, .. } => *code,
            _ => None,
        }
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            ConnectorError::NetworkError { .. } => "NETWORK_ERROR",
            ConnectorError::Cancelled => "CANCELLED",
            ConnectorError::AuthenticationFailed { .. } => "AUTH_FAILED",
            ConnectorError::TokenAcquisition { .. } => "TOKEN_ACQUISITION_FAILED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::Validation(_) => "VALIDATION_FAILED",
            ConnectorError::InvalidIdentifier { .. } => "INVALID_ID",
            ConnectorError::UnsupportedObjectType { .. } => "UNSUPPORTED_OBJECT_TYPE",
            ConnectorError::IncompatibleServer { .. } => "INCOMPATIBLE_SERVER",
            ConnectorError::Unsupported { .. } => "UNSUPPORTED_OPERATION",
            ConnectorError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            ConnectorError::OperationFailed { .. } => "OPERATION_FAILED",
            ConnectorError::InvalidData { .. } => "INVALID_DATA",
            ConnectorError::Database { .. } => "DATABASE_ERROR",
        }
    }

    /// Full message including every `source` in the chain.
    ///
    /// Classification matches on this text so that driver messages wrapped
    /// by context are still visible.
    pub fn chain_text(&self) -> String {
        let mut text = self.to_string();
        let mut current = std::error::Error::source(self);
        while let Some(err) = current {
            text.push_str(": ");
            text.push_str(&err.to_string());
            current = err.source();
        }
        text
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an authentication failed error with source.
    pub fn authentication_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::AuthenticationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        ConnectorError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create an invalid identifier error.
    pub fn invalid_id(id: impl Into<String>, message: impl Into<String>) -> Self {
        ConnectorError::InvalidIdentifier {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a remote failure with kind and key context.
    ///
    /// The cause is kept as `source` so the driver message and error number
    /// stay reachable.
    pub fn operation_failed_with_source(message: impl Into<String>, source: ConnectorError) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        ConnectorError::Database {
            message: message.into(),
            code: None,
            source: None,
        }
    }

    /// Create a database error carrying a SQL Server error number.
    pub fn database_with_code(message: impl Into<String>, code: u32) -> Self {
        ConnectorError::Database {
            message: message.into(),
            code: Some(code),
            source: None,
        }
    }

    /// Create a database error with source.
    pub fn database_with_source(
        message: impl Into<String>,
        code: Option<u32>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Database {
            message: message.into(),
            code,
            source: Some(Box::new(source)),
        }
    }

    /// Create a network error with source.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::NetworkError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        ConnectorError::InvalidData {
            message: message.into(),
        }
    }

    /// Returns the innermost `ConnectorError` wrapped by `OperationFailed`.
    pub fn root_cause(&self) -> &ConnectorError {
        let mut current = self;
        while let ConnectorError::OperationFailed {
            source: Some(source),
            ..
        } = current
        {
            match source.downcast_ref::<ConnectorError>() {
                Some(inner) => current = inner,
                None => break,
            }
        }
        current
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
