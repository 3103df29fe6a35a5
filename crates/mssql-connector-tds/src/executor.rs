//! Statement executor over the TDS protocol.
//!
//! Every call resolves a fresh connection against the statement's database,
//! runs the statement and closes the connection, whatever the outcome.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, instrument, warn};

use mssql_connector::classify::{DefaultClassifier, ErrorClassifier};
use mssql_connector::config::{AuthConfig, ConnectionSettings, ServerEndpoint};
use mssql_connector::context::OperationContext;
use mssql_connector::error::{ConnectorError, ConnectorResult};
use mssql_connector::row::{SqlRow, SqlValue};
use mssql_connector::statement::{SqlParam, Statement};
use mssql_connector::traits::{Executor, ExecutorFactory};
use secrecy::ExposeSecret;

use crate::auth::{token_provider_for, AzureEndpoints, TokenCache};
use crate::error::map_tds_error;
use crate::resolver::connect_with_retry;

type TdsClient = Client<Compat<TcpStream>>;

enum Opened {
    Client(TdsClient),
    Redirect { host: String, port: u16 },
}

/// Executor bound to one server endpoint.
pub struct TdsExecutor {
    endpoint: ServerEndpoint,
    settings: ConnectionSettings,
    tokens: Option<Arc<TokenCache>>,
    classifier: Arc<dyn ErrorClassifier>,
}

impl std::fmt::Debug for TdsExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TdsExecutor")
            .field("address", &self.endpoint.address())
            .field("auth", &self.endpoint.auth.method_name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl TdsExecutor {
    /// Create an executor. Token-based auth requires `tokens`.
    pub fn new(
        endpoint: ServerEndpoint,
        settings: ConnectionSettings,
        tokens: Option<Arc<TokenCache>>,
        classifier: Arc<dyn ErrorClassifier>,
    ) -> ConnectorResult<Self> {
        endpoint.validate()?;
        if endpoint.auth.uses_token() && tokens.is_none() {
            return Err(ConnectorError::invalid_configuration(format!(
                "{} authentication requires a token provider",
                endpoint.auth.method_name()
            )));
        }
        Ok(Self {
            endpoint,
            settings,
            tokens,
            classifier,
        })
    }

    async fn tds_config(&self, database: &str) -> ConnectorResult<Config> {
        let mut config = Config::new();
        config.host(&self.endpoint.host);
        config.port(self.endpoint.port);
        config.database(database);
        config.application_name("mssql-resources");

        match &self.endpoint.auth {
            AuthConfig::SqlLogin { username, password } => {
                config.authentication(AuthMethod::sql_server(username, password.expose_secret()));
            }
            _ => {
                let tokens = self.tokens.as_ref().ok_or_else(|| {
                    ConnectorError::invalid_configuration("missing token provider")
                })?;
                let token = tokens.get_token().await?;
                config.authentication(AuthMethod::aad_token(token.secret()));
            }
        }

        if self.settings.encrypt {
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::Off);
        }
        if self.settings.trust_server_certificate {
            config.trust_cert();
        }
        Ok(config)
    }

    /// One connection attempt: TCP, TDS login (following one gateway
    /// redirect), then `SELECT 1`.
    async fn connect_once(&self, database: &str) -> ConnectorResult<TdsClient> {
        let mut config = self.tds_config(database).await?;

        let mut client = match Self::open(config.clone()).await? {
            Opened::Client(client) => client,
            // Azure SQL gateways may redirect the login to the database node.
            Opened::Redirect { host, port } => {
                debug!(%host, port, "Following server redirect");
                config.host(&host);
                config.port(port);
                match Self::open(config).await? {
                    Opened::Client(client) => client,
                    Opened::Redirect { .. } => {
                        return Err(ConnectorError::connection_failed(
                            "server redirected the connection twice",
                        ))
                    }
                }
            }
        };

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| map_tds_error("ping", e))?
            .into_results()
            .await
            .map_err(|e| map_tds_error("ping", e))?;

        Ok(client)
    }

    async fn open(config: Config) -> ConnectorResult<Opened> {
        let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
            ConnectorError::connection_failed_with_source("unable to open TCP connection", e)
        })?;
        tcp.set_nodelay(true).map_err(|e| {
            ConnectorError::connection_failed_with_source("unable to configure TCP connection", e)
        })?;

        match Client::connect(config, tcp.compat_write()).await {
            Ok(client) => Ok(Opened::Client(client)),
            Err(tiberius::error::Error::Routing { host, port }) => {
                Ok(Opened::Redirect { host, port })
            }
            Err(e) => Err(map_tds_error("login", e)),
        }
    }

    async fn connect(&self, ctx: &OperationContext, database: &str) -> ConnectorResult<TdsClient> {
        connect_with_retry(ctx, &self.settings, self.classifier.as_ref(), || {
            self.connect_once(database)
        })
        .await
    }

    fn build_query(stmt: &Statement) -> Query<'static> {
        let mut query = Query::new(stmt.sql().to_string());
        for param in stmt.params() {
            match param {
                SqlParam::Text(value) => query.bind(value.clone()),
                SqlParam::Int(value) => query.bind(*value),
                SqlParam::Null => query.bind(Option::<String>::None),
            }
        }
        query
    }

    async fn run_exec(client: &mut TdsClient, stmt: &Statement) -> ConnectorResult<()> {
        Self::build_query(stmt)
            .execute(client)
            .await
            .map_err(|e| map_tds_error("exec", e))?;
        Ok(())
    }

    async fn run_query(client: &mut TdsClient, stmt: &Statement) -> ConnectorResult<Vec<SqlRow>> {
        let rows = Self::build_query(stmt)
            .query(client)
            .await
            .map_err(|e| map_tds_error("query", e))?
            .into_first_result()
            .await
            .map_err(|e| map_tds_error("query", e))?;
        Ok(rows.iter().map(convert_row).collect())
    }

    async fn close(client: TdsClient) {
        if let Err(e) = client.close().await {
            debug!(error = %e, "Error closing connection");
        }
    }
}

fn convert_row(row: &tiberius::Row) -> SqlRow {
    let mut converted = SqlRow::new();
    for (column, data) in row.cells() {
        let value = match data {
            ColumnData::U8(v) => SqlValue::from(v.map(i64::from)),
            ColumnData::I16(v) => SqlValue::from(v.map(i64::from)),
            ColumnData::I32(v) => SqlValue::from(v.map(i64::from)),
            ColumnData::I64(v) => SqlValue::from(*v),
            ColumnData::Bit(v) => SqlValue::from(*v),
            ColumnData::String(v) => SqlValue::from(v.as_ref().map(|s| s.to_string())),
            ColumnData::Guid(v) => v.map_or(SqlValue::Null, SqlValue::Guid),
            ColumnData::Binary(v) => v.as_ref().map_or(SqlValue::Null, |b| SqlValue::Binary(b.to_vec())),
            other => {
                warn!(column = column.name(), "Unsupported column type {:?}", other);
                SqlValue::Null
            }
        };
        converted.push(column.name(), value);
    }
    converted
}

#[async_trait]
impl Executor for TdsExecutor {
    #[instrument(skip(self, ctx, stmt), fields(server = %self.endpoint.address(), database = %stmt.database()))]
    async fn exec(&self, ctx: &OperationContext, stmt: &Statement) -> ConnectorResult<()> {
        debug!(sql = %stmt.sql(), "Executing statement");
        let mut client = self.connect(ctx, stmt.database()).await?;
        let result = tokio::select! {
            () = ctx.cancellation_token().cancelled() => Err(ConnectorError::Cancelled),
            result = Self::run_exec(&mut client, stmt) => result,
        };
        Self::close(client).await;
        result
    }

    #[instrument(skip(self, ctx, stmt), fields(server = %self.endpoint.address(), database = %stmt.database()))]
    async fn query(&self, ctx: &OperationContext, stmt: &Statement) -> ConnectorResult<Vec<SqlRow>> {
        debug!(sql = %stmt.sql(), "Running query");
        let mut client = self.connect(ctx, stmt.database()).await?;
        let result = tokio::select! {
            () = ctx.cancellation_token().cancelled() => Err(ConnectorError::Cancelled),
            result = Self::run_query(&mut client, stmt) => result,
        };
        Self::close(client).await;
        result
    }
}

/// Creates [`TdsExecutor`]s and keeps one token cache per credential.
pub struct TdsExecutorFactory {
    settings: ConnectionSettings,
    endpoints: AzureEndpoints,
    classifier: Arc<dyn ErrorClassifier>,
    token_caches: Mutex<HashMap<String, Arc<TokenCache>>>,
}

impl std::fmt::Debug for TdsExecutorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TdsExecutorFactory")
            .field("settings", &self.settings)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl TdsExecutorFactory {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            endpoints: AzureEndpoints::from_env(),
            classifier: Arc::new(DefaultClassifier),
            token_caches: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: AzureEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    fn token_cache(&self, auth: &AuthConfig) -> ConnectorResult<Option<Arc<TokenCache>>> {
        let key = match auth {
            AuthConfig::SqlLogin { .. } => return Ok(None),
            AuthConfig::AzureClientSecret {
                tenant_id,
                client_id,
                ..
            } => format!("client_secret:{tenant_id}:{client_id}"),
            AuthConfig::AzureManagedIdentity { user_id } => {
                format!("managed_identity:{}", user_id.as_deref().unwrap_or("system"))
            }
            AuthConfig::AzureDefault => "default".to_string(),
        };

        let mut caches = self
            .token_caches
            .lock()
            .map_err(|_| ConnectorError::invalid_configuration("token cache lock poisoned"))?;
        if let Some(cache) = caches.get(&key) {
            return Ok(Some(cache.clone()));
        }
        let Some(provider) = token_provider_for(auth, &self.endpoints) else {
            return Ok(None);
        };
        let cache = Arc::new(TokenCache::new(provider));
        caches.insert(key, cache.clone());
        Ok(Some(cache))
    }
}

impl ExecutorFactory for TdsExecutorFactory {
    fn executor(&self, endpoint: &ServerEndpoint) -> ConnectorResult<Box<dyn Executor>> {
        let tokens = self.token_cache(&endpoint.auth)?;
        let executor = TdsExecutor::new(
            endpoint.clone(),
            self.settings.clone(),
            tokens,
            self.classifier.clone(),
        )?;
        Ok(Box::new(executor))
    }
}
