//! Mapping of driver errors into [`ConnectorError`].

use mssql_connector::error::ConnectorError;
use tiberius::error::Error as TdsError;

/// Server error numbers of a rejected login.
const LOGIN_FAILURE_NUMBERS: &[u32] = &[18452, 18456, 18470, 18486, 18487, 18488];

/// Map a driver error, keeping the SQL Server error number when present.
///
/// `stage` names the step that failed (`login`, `ping`, `exec`, `query`).
pub(crate) fn map_tds_error(stage: &str, err: TdsError) -> ConnectorError {
    match &err {
        TdsError::Server(token) => {
            let code = token.code();
            let message = token.message().to_string();
            map_server_error(stage, code, message, err)
        }
        TdsError::Io { .. } => ConnectorError::network_with_source(format!("{stage}: i/o error"), err),
        TdsError::Tls(_) | TdsError::Routing { .. } => {
            ConnectorError::connection_failed_with_source(format!("{stage} failed"), err)
        }
        _ => ConnectorError::database_with_source(format!("{stage}: {err}"), None, err),
    }
}

/// A login rejected during the `login` stage is an authentication failure;
/// every other server error keeps its number.
fn map_server_error(
    stage: &str,
    code: u32,
    message: String,
    source: impl std::error::Error + Send + Sync + 'static,
) -> ConnectorError {
    if stage == "login" && LOGIN_FAILURE_NUMBERS.contains(&code) {
        ConnectorError::authentication_failed_with_source(message, source)
    } else {
        ConnectorError::database_with_source(message, Some(code), source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mssql_connector::classify::{DefaultClassifier, ErrorClassifier};

    #[test]
    fn test_io_errors_are_transient() {
        let err = TdsError::Io {
            kind: std::io::ErrorKind::ConnectionReset,
            message: "connection reset by peer".to_string(),
        };
        let mapped = map_tds_error("login", err);
        assert!(mapped.is_transient());
        assert!(!DefaultClassifier.is_terminal_connect_error(&mapped));
    }

    #[test]
    fn test_protocol_errors_keep_message() {
        let err = TdsError::Protocol("unexpected token".into());
        let mapped = map_tds_error("query", err);
        assert!(mapped.to_string().contains("unexpected token"));
        assert_eq!(mapped.sql_error_number(), None);
    }

    fn io(message: &str) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::Other, message.to_string())
    }

    #[test]
    fn test_rejected_login_is_authentication_failure() {
        let mapped = map_server_error("login", 18456, "Login failed for user 'sa'.".into(), io("18456"));
        assert!(matches!(mapped, ConnectorError::AuthenticationFailed { .. }));
        assert!(mapped.is_terminal());
        assert!(DefaultClassifier.is_terminal_connect_error(&mapped));
        assert_eq!(mapped.to_string(), "authentication failed: Login failed for user 'sa'.");
    }

    #[test]
    fn test_statement_errors_keep_number() {
        let mapped = map_server_error("exec", 18456, "Login failed".into(), io("18456"));
        assert_eq!(mapped.sql_error_number(), Some(18456));

        let mapped = map_server_error("login", 4060, "Cannot open database \"sales\"".into(), io("4060"));
        assert_eq!(mapped.sql_error_number(), Some(4060));
        assert!(DefaultClassifier.is_terminal_connect_error(&mapped));
    }
}
