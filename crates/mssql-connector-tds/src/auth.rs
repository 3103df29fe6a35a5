//! Azure AD access tokens for SQL Server connections.
//!
//! Three credential sources are supported: a service principal using the
//! client-credentials grant, the instance metadata (managed identity)
//! endpoint, and a default chain that tries environment credentials before
//! managed identity. Tokens are cached with their expiry.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use mssql_connector::config::AuthConfig;
use mssql_connector::error::{ConnectorError, ConnectorResult};

/// Scope requested from the v2 token endpoint.
pub const SQL_SCOPE: &str = "https://database.windows.net//.default";

/// Resource requested from the managed identity endpoint.
pub const SQL_RESOURCE: &str = "https://database.windows.net/";

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";

/// Identity provider endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureEndpoints {
    /// Authority host, e.g. `https://login.microsoftonline.com`.
    pub authority_host: String,
    /// Managed identity token endpoint.
    pub imds_endpoint: String,
}

impl Default for AzureEndpoints {
    fn default() -> Self {
        Self {
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            imds_endpoint: DEFAULT_IMDS_ENDPOINT.to_string(),
        }
    }
}

impl AzureEndpoints {
    /// Read `AZURE_AUTHORITY_HOST` and `AZURE_IMDS_ENDPOINT`, falling back to
    /// the public cloud defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            authority_host: std::env::var("AZURE_AUTHORITY_HOST")
                .ok()
                .filter(|v| !v.is_empty())
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.authority_host),
            imds_endpoint: std::env::var("AZURE_IMDS_ENDPOINT")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.imds_endpoint),
        }
    }
}

/// A bearer token with its expiry.
#[derive(Clone)]
pub struct AccessToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the token is expired or will expire within the grace period.
    pub fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

/// Source of Azure AD access tokens for SQL.
#[async_trait]
pub trait TokenProvider: Send + Sync + fmt::Debug {
    /// Request a new token from the identity provider.
    async fn fetch_token(&self) -> ConnectorResult<AccessToken>;

    /// Name used in logs and error messages.
    fn name(&self) -> &'static str;
}

/// Token response from the v2 token endpoint and the metadata endpoint.
///
/// The metadata endpoint sends `expires_in` as a string.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: ExpiresIn,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(i64),
    Text(String),
}

impl ExpiresIn {
    fn seconds(&self) -> ConnectorResult<i64> {
        match self {
            ExpiresIn::Seconds(s) => Ok(*s),
            ExpiresIn::Text(text) => text.parse().map_err(|_| ConnectorError::TokenAcquisition {
                message: format!("invalid expires_in value '{text}'"),
            }),
        }
    }
}

async fn parse_token_response(response: reqwest::Response, source: &str) -> ConnectorResult<AccessToken> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ConnectorError::TokenAcquisition {
            message: format!("{source}: token request failed with status {status}: {body}"),
        });
    }

    let token_response: TokenResponse =
        response
            .json()
            .await
            .map_err(|e| ConnectorError::TokenAcquisition {
                message: format!("{source}: failed to parse token response: {e}"),
            })?;

    let expires_at = Utc::now() + Duration::seconds(token_response.expires_in.seconds()?);

    debug!(
        source,
        "Acquired new token, expires at {}",
        expires_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    Ok(AccessToken::new(token_response.access_token, expires_at))
}

/// Service principal credential (client-credentials grant).
#[derive(Debug)]
pub struct ClientSecretCredential {
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: SecretString,
    http_client: reqwest::Client,
}

impl ClientSecretCredential {
    pub fn new(
        endpoints: &AzureEndpoints,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
    ) -> Self {
        Self {
            authority_host: endpoints.authority_host.clone(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret,
            http_client: reqwest::Client::new(),
        }
    }

    /// Build from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`.
    pub fn from_env(endpoints: &AzureEndpoints) -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Some(Self::new(
            endpoints,
            var("AZURE_TENANT_ID")?,
            var("AZURE_CLIENT_ID")?,
            SecretString::from(var("AZURE_CLIENT_SECRET")?),
        ))
    }
}

#[async_trait]
impl TokenProvider for ClientSecretCredential {
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id, client_id = %self.client_id))]
    async fn fetch_token(&self) -> ConnectorResult<AccessToken> {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.tenant_id
        );

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("scope", SQL_SCOPE),
        ];

        let response = self
            .http_client
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ConnectorError::TokenAcquisition {
                message: format!("client secret: token request failed: {e}"),
            })?;

        parse_token_response(response, self.name()).await
    }

    fn name(&self) -> &'static str {
        "client secret"
    }
}

/// Managed identity credential using the instance metadata endpoint.
#[derive(Debug)]
pub struct ManagedIdentityCredential {
    endpoint: String,
    client_id: Option<String>,
    http_client: reqwest::Client,
}

impl ManagedIdentityCredential {
    /// `client_id` selects a user-assigned identity.
    pub fn new(endpoints: &AzureEndpoints, client_id: Option<String>) -> Self {
        Self {
            endpoint: endpoints.imds_endpoint.clone(),
            client_id,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TokenProvider for ManagedIdentityCredential {
    #[instrument(skip(self), fields(client_id = ?self.client_id))]
    async fn fetch_token(&self) -> ConnectorResult<AccessToken> {
        let mut query = vec![("api-version", IMDS_API_VERSION), ("resource", SQL_RESOURCE)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        let response = self
            .http_client
            .get(&self.endpoint)
            .header("Metadata", "true")
            .query(&query)
            .send()
            .await
            .map_err(|e| ConnectorError::TokenAcquisition {
                message: format!("managed identity: token request failed: {e}"),
            })?;

        parse_token_response(response, self.name()).await
    }

    fn name(&self) -> &'static str {
        "managed identity"
    }
}

/// Tries each credential in order and returns the first token.
#[derive(Debug)]
pub struct ChainedCredential {
    sources: Vec<Box<dyn TokenProvider>>,
}

impl ChainedCredential {
    pub fn new(sources: Vec<Box<dyn TokenProvider>>) -> Self {
        Self { sources }
    }

    /// Environment service principal when configured, then managed identity.
    pub fn default_chain(endpoints: &AzureEndpoints) -> Self {
        let mut sources: Vec<Box<dyn TokenProvider>> = Vec::new();
        if let Some(env) = ClientSecretCredential::from_env(endpoints) {
            sources.push(Box::new(env));
        }
        let user_assigned = std::env::var("AZURE_CLIENT_ID").ok().filter(|v| !v.is_empty());
        sources.push(Box::new(ManagedIdentityCredential::new(endpoints, user_assigned)));
        Self::new(sources)
    }
}

#[async_trait]
impl TokenProvider for ChainedCredential {
    async fn fetch_token(&self) -> ConnectorResult<AccessToken> {
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.fetch_token().await {
                Ok(token) => return Ok(token),
                Err(err) => {
                    debug!(source = source.name(), error = %err, "Credential in chain failed");
                    failures.push(err.to_string());
                }
            }
        }
        Err(ConnectorError::TokenAcquisition {
            message: format!("no credential in the chain produced a token: {}", failures.join("; ")),
        })
    }

    fn name(&self) -> &'static str {
        "default chain"
    }
}

/// Build the token provider for an auth configuration, `None` for SQL logins.
pub fn token_provider_for(auth: &AuthConfig, endpoints: &AzureEndpoints) -> Option<Box<dyn TokenProvider>> {
    match auth {
        AuthConfig::SqlLogin { .. } => None,
        AuthConfig::AzureClientSecret {
            tenant_id,
            client_id,
            client_secret,
        } => Some(Box::new(ClientSecretCredential::new(
            endpoints,
            tenant_id.clone(),
            client_id.clone(),
            client_secret.clone(),
        ))),
        AuthConfig::AzureManagedIdentity { user_id } => Some(Box::new(
            ManagedIdentityCredential::new(endpoints, user_id.clone()),
        )),
        AuthConfig::AzureDefault => Some(Box::new(ChainedCredential::default_chain(endpoints))),
    }
}

/// Token cache for one credential.
#[derive(Debug)]
pub struct TokenCache {
    provider: Box<dyn TokenProvider>,
    cached_token: Arc<RwLock<Option<AccessToken>>>,
    /// Grace period before expiry to trigger refresh (default: 5 minutes).
    grace_period: Duration,
}

impl TokenCache {
    pub fn new(provider: Box<dyn TokenProvider>) -> Self {
        Self {
            provider,
            cached_token: Arc::new(RwLock::new(None)),
            grace_period: Duration::minutes(5),
        }
    }

    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Gets a valid access token, refreshing if necessary.
    #[instrument(skip(self), fields(source = self.provider.name()))]
    pub async fn get_token(&self) -> ConnectorResult<AccessToken> {
        {
            let cache = self.cached_token.read().await;
            if let Some(ref token) = *cache {
                if !token.is_expired(self.grace_period) {
                    debug!("Using cached token");
                    return Ok(token.clone());
                }
            }
        }

        debug!("Refreshing access token");
        let new_token = self.provider.fetch_token().await?;

        {
            let mut cache = self.cached_token.write().await;
            *cache = Some(new_token.clone());
        }

        Ok(new_token)
    }

    /// Invalidates the cached token, forcing a refresh on next use.
    pub async fn invalidate(&self) {
        let mut cache = self.cached_token.write().await;
        *cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        lifetime: Duration,
    }

    #[async_trait]
    impl TokenProvider for CountingProvider {
        async fn fetch_token(&self) -> ConnectorResult<AccessToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken::new(format!("token-{n}"), Utc::now() + self.lifetime))
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[derive(Debug)]
    struct FailingProvider;

    #[async_trait]
    impl TokenProvider for FailingProvider {
        async fn fetch_token(&self) -> ConnectorResult<AccessToken> {
            Err(ConnectorError::TokenAcquisition {
                message: "unavailable".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_token_expiry() {
        let token = AccessToken::new("t", Utc::now() + Duration::minutes(10));
        assert!(!token.is_expired(Duration::minutes(5)));
        assert!(token.is_expired(Duration::minutes(15)));

        let token = AccessToken::new("t", Utc::now() - Duration::minutes(1));
        assert!(token.is_expired(Duration::zero()));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AccessToken::new("eyJhbGciOi", Utc::now());
        assert!(!format!("{token:?}").contains("eyJhbGciOi"));
    }

    #[tokio::test]
    async fn test_cache_reuses_valid_token() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = TokenCache::new(Box::new(CountingProvider {
            calls: calls.clone(),
            lifetime: Duration::hours(1),
        }));

        let first = cache.get_token().await.unwrap();
        let second = cache.get_token().await.unwrap();
        assert_eq!(first.secret(), second.secret());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate().await;
        let third = cache.get_token().await.unwrap();
        assert_eq!(third.secret(), "token-1");
    }

    #[tokio::test]
    async fn test_cache_never_returns_stale_token() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = TokenCache::new(Box::new(CountingProvider {
            calls: calls.clone(),
            lifetime: Duration::minutes(2),
        }));

        cache.get_token().await.unwrap();
        let token = cache.get_token().await.unwrap();
        assert_eq!(token.secret(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_next_source() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = ChainedCredential::new(vec![
            Box::new(FailingProvider),
            Box::new(CountingProvider {
                calls: calls.clone(),
                lifetime: Duration::hours(1),
            }),
        ]);
        let token = chain.fetch_token().await.unwrap();
        assert_eq!(token.secret(), "token-0");
    }

    #[tokio::test]
    async fn test_chain_reports_all_failures() {
        let chain = ChainedCredential::new(vec![Box::new(FailingProvider), Box::new(FailingProvider)]);
        let err = chain.fetch_token().await.unwrap_err();
        assert!(matches!(err, ConnectorError::TokenAcquisition { .. }));
        assert_eq!(err.to_string().matches("unavailable").count(), 2);
    }

    #[test]
    fn test_no_provider_for_sql_login() {
        let auth = AuthConfig::SqlLogin {
            username: "sa".to_string(),
            password: SecretString::from("x".to_string()),
        };
        assert!(token_provider_for(&auth, &AzureEndpoints::default()).is_none());

        let auth = AuthConfig::AzureManagedIdentity { user_id: None };
        let provider = token_provider_for(&auth, &AzureEndpoints::default()).unwrap();
        assert_eq!(provider.name(), "managed identity");
    }
}
