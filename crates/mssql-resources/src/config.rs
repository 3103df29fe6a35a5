//! Provider configuration parsed from environment variables.

use std::env;

use secrecy::SecretString;

use mssql_connector::config::{AuthConfig, ConnectionSettings};
use mssql_connector::error::{ConnectorError, ConnectorResult};

use crate::logging::{is_truthy, LoggingConfig};

/// Complete provider configuration.
///
/// `default_auth` is used by every resource whose `server` block carries no
/// auth sub-block.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub default_auth: Option<AuthConfig>,
    pub connection: ConnectionSettings,
    pub logging: LoggingConfig,
}

impl ProviderConfig {
    /// Parse configuration from environment variables.
    ///
    /// Reads:
    /// - `MSSQL_USERNAME` / `MSSQL_PASSWORD`: default SQL login
    /// - `MSSQL_TENANT_ID` / `MSSQL_CLIENT_ID` / `MSSQL_CLIENT_SECRET`:
    ///   default service principal
    /// - `MSSQL_CONNECT_TIMEOUT_SECS`: connect timeout (default: 30)
    /// - `MSSQL_POLL_INTERVAL_MS`: connect poll interval (default: 250)
    /// - `MSSQL_ENCRYPT`: encrypt connections (default: true)
    /// - `MSSQL_TRUST_SERVER_CERTIFICATE`: skip certificate validation
    /// - `MSSQL_DEBUG`, `MSSQL_LOG_FORMAT`: logging
    pub fn from_env() -> ConnectorResult<Self> {
        Self::from_lookup(&|name| env::var(name).ok())
    }

    /// Parse configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> ConnectorResult<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let default_auth = Self::parse_default_auth(&var)?;

        let mut connection = ConnectionSettings::new();
        if let Some(value) = var("MSSQL_CONNECT_TIMEOUT_SECS") {
            let secs = parse_number(&value, "MSSQL_CONNECT_TIMEOUT_SECS")?;
            connection = connection.with_connect_timeout(secs);
        }
        if let Some(value) = var("MSSQL_POLL_INTERVAL_MS") {
            let millis = parse_number(&value, "MSSQL_POLL_INTERVAL_MS")?;
            if millis == 0 {
                return Err(ConnectorError::invalid_configuration(
                    "MSSQL_POLL_INTERVAL_MS must be greater than 0",
                ));
            }
            connection = connection.with_poll_interval(millis);
        }
        if let Some(value) = var("MSSQL_ENCRYPT") {
            connection.encrypt = is_truthy(&value);
        }
        if let Some(value) = var("MSSQL_TRUST_SERVER_CERTIFICATE") {
            connection = connection.with_trust_server_certificate(is_truthy(&value));
        }

        Ok(Self {
            default_auth,
            connection,
            logging: LoggingConfig::from_lookup(lookup),
        })
    }

    fn parse_default_auth(
        var: &dyn Fn(&str) -> Option<String>,
    ) -> ConnectorResult<Option<AuthConfig>> {
        let login = match (var("MSSQL_USERNAME"), var("MSSQL_PASSWORD")) {
            (Some(username), Some(password)) => Some(AuthConfig::SqlLogin {
                username,
                password: SecretString::from(password),
            }),
            (Some(_), None) => {
                return Err(ConnectorError::invalid_configuration(
                    "MSSQL_PASSWORD is required when MSSQL_USERNAME is set",
                ))
            }
            _ => None,
        };

        let azure = match (
            var("MSSQL_TENANT_ID"),
            var("MSSQL_CLIENT_ID"),
            var("MSSQL_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                Some(AuthConfig::AzureClientSecret {
                    tenant_id,
                    client_id,
                    client_secret: SecretString::from(client_secret),
                })
            }
            (None, None, None) => None,
            _ => {
                return Err(ConnectorError::invalid_configuration(
                    "MSSQL_TENANT_ID, MSSQL_CLIENT_ID and MSSQL_CLIENT_SECRET must be set together",
                ))
            }
        };

        match (login, azure) {
            (Some(_), Some(_)) => Err(ConnectorError::invalid_configuration(
                "set either MSSQL_USERNAME/MSSQL_PASSWORD or MSSQL_TENANT_ID/MSSQL_CLIENT_ID/MSSQL_CLIENT_SECRET, not both",
            )),
            (login, azure) => Ok(login.or(azure)),
        }
    }
}

fn parse_number(value: &str, name: &str) -> ConnectorResult<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        ConnectorError::invalid_configuration(format!("{name} must be a number, got '{value}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::from_lookup(&lookup(&[])).unwrap();
        assert!(config.default_auth.is_none());
        assert_eq!(config.connection.connect_timeout_secs, 30);
        assert_eq!(config.connection.poll_interval_ms, 250);
        assert!(config.connection.encrypt);
        assert!(!config.connection.trust_server_certificate);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_sql_login_from_env() {
        let config = ProviderConfig::from_lookup(&lookup(&[
            ("MSSQL_USERNAME", "sa"),
            ("MSSQL_PASSWORD", "P@ssw0rd!"),
        ]))
        .unwrap();
        match config.default_auth {
            Some(AuthConfig::SqlLogin { username, password }) => {
                assert_eq!(username, "sa");
                assert_eq!(password.expose_secret(), "P@ssw0rd!");
            }
            other => panic!("unexpected auth: {other:?}"),
        }
    }

    #[test]
    fn test_service_principal_from_env() {
        let config = ProviderConfig::from_lookup(&lookup(&[
            ("MSSQL_TENANT_ID", "tenant"),
            ("MSSQL_CLIENT_ID", "client"),
            ("MSSQL_CLIENT_SECRET", "secret"),
        ]))
        .unwrap();
        assert!(matches!(
            config.default_auth,
            Some(AuthConfig::AzureClientSecret { .. })
        ));
    }

    #[test]
    fn test_partial_service_principal_rejected() {
        let err = ProviderConfig::from_lookup(&lookup(&[("MSSQL_TENANT_ID", "tenant")])).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_both_auth_methods_rejected() {
        let err = ProviderConfig::from_lookup(&lookup(&[
            ("MSSQL_USERNAME", "sa"),
            ("MSSQL_PASSWORD", "P@ssw0rd!"),
            ("MSSQL_TENANT_ID", "tenant"),
            ("MSSQL_CLIENT_ID", "client"),
            ("MSSQL_CLIENT_SECRET", "secret"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("not both"));
    }

    #[test]
    fn test_connection_settings_from_env() {
        let config = ProviderConfig::from_lookup(&lookup(&[
            ("MSSQL_CONNECT_TIMEOUT_SECS", "90"),
            ("MSSQL_POLL_INTERVAL_MS", "500"),
            ("MSSQL_ENCRYPT", "false"),
            ("MSSQL_TRUST_SERVER_CERTIFICATE", "true"),
        ]))
        .unwrap();
        assert_eq!(config.connection.connect_timeout_secs, 90);
        assert_eq!(config.connection.poll_interval_ms, 500);
        assert!(!config.connection.encrypt);
        assert!(config.connection.trust_server_certificate);
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let err =
            ProviderConfig::from_lookup(&lookup(&[("MSSQL_CONNECT_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("MSSQL_CONNECT_TIMEOUT_SECS"));
    }
}
