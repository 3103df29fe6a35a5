//! Server endpoint and connection configuration.
//!
//! A [`ServerEndpoint`] is parsed from the `server` attribute block of each
//! resource and carries exactly one [`AuthConfig`].

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ConnectorError, ConnectorResult};

/// Default SQL Server port.
pub const DEFAULT_PORT: u16 = 1433;

/// How the connector authenticates against the server.
#[derive(Debug, Clone)]
pub enum AuthConfig {
    /// SQL authentication with username and password.
    SqlLogin {
        username: String,
        password: SecretString,
    },
    /// Azure AD service principal using the client-credentials grant.
    AzureClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: SecretString,
    },
    /// Azure AD managed identity, optionally a user-assigned one.
    AzureManagedIdentity { user_id: Option<String> },
    /// Azure AD default credential chain (environment, then managed identity).
    AzureDefault,
}

impl AuthConfig {
    /// Short name used in logs.
    pub fn method_name(&self) -> &'static str {
        match self {
            AuthConfig::SqlLogin { .. } => "sql_login",
            AuthConfig::AzureClientSecret { .. } => "azure_client_secret",
            AuthConfig::AzureManagedIdentity { .. } => "azure_managed_identity",
            AuthConfig::AzureDefault => "azure_default",
        }
    }

    /// Whether the connection uses an Azure AD bearer token.
    pub fn uses_token(&self) -> bool {
        !matches!(self, AuthConfig::SqlLogin { .. })
    }

    fn validate(&self) -> ConnectorResult<()> {
        match self {
            AuthConfig::SqlLogin { username, password } => {
                if username.is_empty() {
                    return Err(ConnectorError::invalid_configuration(
                        "login.username is required",
                    ));
                }
                if password.expose_secret().is_empty() {
                    return Err(ConnectorError::invalid_configuration(
                        "login.password is required",
                    ));
                }
            }
            AuthConfig::AzureClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                if tenant_id.is_empty()
                    || client_id.is_empty()
                    || client_secret.expose_secret().is_empty()
                {
                    return Err(ConnectorError::invalid_configuration(
                        "azure_login requires tenant_id, client_id and client_secret",
                    ));
                }
            }
            AuthConfig::AzureManagedIdentity { .. } | AuthConfig::AzureDefault => {}
        }
        Ok(())
    }
}

/// Address and credentials of the server a resource lives on.
///
/// Immutable for the lifetime of a resource: a change forces recreation.
#[derive(Debug, Clone)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    pub auth: AuthConfig,
}

impl ServerEndpoint {
    /// Create a new endpoint.
    pub fn new(host: impl Into<String>, port: u16, auth: AuthConfig) -> Self {
        Self {
            host: host.into(),
            port,
            auth,
        }
    }

    /// Build an endpoint from a parsed `server` block.
    ///
    /// More than one auth sub-block is rejected. With none, `default_auth`
    /// is used, falling back to [`AuthConfig::AzureDefault`].
    pub fn from_block(block: ServerBlock, default_auth: Option<&AuthConfig>) -> ConnectorResult<Self> {
        let port = match block.port {
            None => DEFAULT_PORT,
            Some(PortValue::Number(port)) => port,
            Some(PortValue::Text(text)) => text.trim().parse().map_err(|_| {
                ConnectorError::invalid_configuration(format!("invalid server port '{text}'"))
            })?,
        };

        let mut modes = Vec::new();
        if let Some(login) = block.login {
            modes.push(AuthConfig::SqlLogin {
                username: login.username,
                password: SecretString::from(login.password),
            });
        }
        if let Some(azure) = block.azure_login {
            modes.push(AuthConfig::AzureClientSecret {
                tenant_id: azure.tenant_id,
                client_id: azure.client_id,
                client_secret: SecretString::from(azure.client_secret),
            });
        }
        if let Some(msi) = block.azuread_managed_identity_auth {
            modes.push(AuthConfig::AzureManagedIdentity {
                user_id: msi.user_id.filter(|id| !id.is_empty()),
            });
        }
        if block.azuread_default_chain_auth.is_some() {
            modes.push(AuthConfig::AzureDefault);
        }

        if modes.len() > 1 {
            return Err(ConnectorError::invalid_configuration(
                "server block must contain at most one of login, azure_login, azuread_managed_identity_auth, azuread_default_chain_auth",
            ));
        }

        let auth = match modes.pop() {
            Some(auth) => auth,
            None => default_auth.cloned().unwrap_or(AuthConfig::AzureDefault),
        };

        let endpoint = Self::new(block.host, port, auth);
        endpoint.validate()?;
        Ok(endpoint)
    }

    /// Validate the endpoint.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConnectorError::invalid_configuration("server.host is required"));
        }
        if self.port == 0 {
            return Err(ConnectorError::invalid_configuration(
                "server.port must be between 1 and 65535",
            ));
        }
        self.auth.validate()
    }

    /// `host:port`, as shown in logs and identifiers.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Raw `server` attribute block as declared by the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerBlock {
    pub host: String,
    #[serde(default)]
    pub port: Option<PortValue>,
    #[serde(default)]
    pub login: Option<LoginBlock>,
    #[serde(default)]
    pub azure_login: Option<AzureLoginBlock>,
    #[serde(default)]
    pub azuread_managed_identity_auth: Option<ManagedIdentityBlock>,
    #[serde(default)]
    pub azuread_default_chain_auth: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Port given either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u16),
    Text(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginBlock {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureLoginBlock {
    pub tenant_id: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagedIdentityBlock {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Settings for the connect loop and TLS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Overall connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Delay between connection attempts in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Encrypt the connection.
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Accept any server certificate.
    #[serde(default)]
    pub trust_server_certificate: bool,
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_true() -> bool {
    true
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
            encrypt: true,
            trust_server_certificate: false,
        }
    }
}

impl ConnectionSettings {
    /// Create new connection settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, millis: u64) -> Self {
        self.poll_interval_ms = millis;
        self
    }

    /// Accept any server certificate.
    pub fn with_trust_server_certificate(mut self, trust: bool) -> Self {
        if trust {
            tracing::warn!(
                target: "security",
                "TLS certificate verification disabled for SQL Server connections"
            );
        }
        self.trust_server_certificate = trust;
        self
    }

    /// Get connect timeout as Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
