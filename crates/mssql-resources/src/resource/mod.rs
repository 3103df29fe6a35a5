//! Reconciliation orchestrator.
//!
//! One [`Resource`] per object kind sequences Create→Read, Update→Read,
//! Delete and Import→Read against the object connectors. Every operation
//! receives the operation context, the executor factory and the resource's
//! attribute data explicitly.

mod credential;
mod data_sources;
mod entraid_login;
mod external_datasource;
mod login;
mod permissions;
mod role;
mod schema;
mod sqlscript;

pub use credential::DatabaseCredentialResource;
pub use data_sources::{EntraIdLoginDataSource, ExternalDatasourceDataSource};
pub use entraid_login::EntraIdLoginResource;
pub use external_datasource::ExternalDatasourceResource;
pub use login::LoginResource;
pub use permissions::DatabasePermissionsResource;
pub use role::DatabaseRoleResource;
pub use schema::DatabaseSchemaResource;
pub use sqlscript::SqlScriptResource;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use mssql_connector::classify::{DefaultClassifier, ErrorClassifier};
use mssql_connector::config::{AuthConfig, ServerBlock, ServerEndpoint};
use mssql_connector::context::OperationContext;
use mssql_connector::error::{ConnectorError, ConnectorResult};
use mssql_connector::ids::{ExternalId, ObjectKind};
use mssql_connector::operation::{AttributeSet, AttributeValue};
use mssql_connector::schema::{AttributeDataType, ResourceSchema, SchemaAttribute};
use mssql_connector::traits::ExecutorFactory;
use mssql_connector::validate::{validate_sql_identifier, ValidationError};

/// Attribute names.
pub mod attrs {
    pub const SERVER: &str = "server";
    pub const DATABASE: &str = "database";
    pub const LOGIN_NAME: &str = "login_name";
    pub const PASSWORD: &str = "password";
    pub const SID: &str = "sid";
    pub const OBJECT_ID: &str = "object_id";
    pub const PRINCIPAL_ID: &str = "principal_id";
    pub const DEFAULT_DATABASE: &str = "default_database";
    pub const DEFAULT_LANGUAGE: &str = "default_language";
    pub const CREDENTIAL_NAME: &str = "credential_name";
    pub const CREDENTIAL_ID: &str = "credential_id";
    pub const IDENTITY_NAME: &str = "identity_name";
    pub const SECRET: &str = "secret";
    pub const DATA_SOURCE_NAME: &str = "data_source_name";
    pub const DATA_SOURCE_ID: &str = "data_source_id";
    pub const LOCATION: &str = "location";
    pub const TYPE: &str = "type";
    pub const REMOTE_DATABASE_NAME: &str = "remote_database_name";
    pub const USERNAME: &str = "username";
    pub const PERMISSIONS: &str = "permissions";
    pub const ROLE_NAME: &str = "role_name";
    pub const ROLE_ID: &str = "role_id";
    pub const SCHEMA_NAME: &str = "schema_name";
    pub const SCHEMA_ID: &str = "schema_id";
    pub const OWNER_NAME: &str = "owner_name";
    pub const OWNING_PRINCIPAL_ID: &str = "owning_principal_id";
    pub const SQLSCRIPT: &str = "sqlscript";
    pub const VERIFY_OBJECT: &str = "verify_object";
}

/// Identifier and attributes of one resource instance.
///
/// `prior` holds the last known state, `values` the planned (and, after a
/// successful operation, current) state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceData {
    id: Option<String>,
    prior: AttributeSet,
    values: AttributeSet,
}

impl ResourceData {
    /// Data for a resource that does not exist yet.
    pub fn new(planned: AttributeSet) -> Self {
        Self {
            id: None,
            prior: AttributeSet::new(),
            values: planned,
        }
    }

    /// Data for an existing resource, as stored after the last operation.
    pub fn from_state(id: impl Into<String>, state: AttributeSet) -> Self {
        Self {
            id: Some(id.into()),
            prior: state.clone(),
            values: state,
        }
    }

    /// Data for an update from `prior` to `planned`.
    pub fn for_update(id: impl Into<String>, prior: AttributeSet, planned: AttributeSet) -> Self {
        Self {
            id: Some(id.into()),
            prior,
            values: planned,
        }
    }

    /// Data for importing an existing object by identifier.
    pub fn for_import(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl ToString) {
        self.id = Some(id.to_string());
    }

    /// Mark the object absent.
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    /// String attribute; empty when unset.
    pub fn get_string(&self, name: &str) -> &str {
        self.values.get_string(name).unwrap_or_default()
    }

    /// Non-empty string attribute.
    pub fn get_opt_string(&self, name: &str) -> Option<&str> {
        self.values.get_string(name).filter(|s| !s.is_empty())
    }

    pub fn get_strings(&self, name: &str) -> Vec<String> {
        self.values
            .get_strings(name)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn set(&mut self, name: &str, value: impl Into<AttributeValue>) {
        self.values.set(name, value);
    }

    /// Whether `name` differs between the prior and planned state.
    pub fn has_change(&self, name: &str) -> bool {
        let (old, new) = self.get_change(name);
        !old.same_as(new)
    }

    /// Prior and planned value of `name`.
    pub fn get_change(&self, name: &str) -> (&AttributeValue, &AttributeValue) {
        const NULL: &AttributeValue = &AttributeValue::Null;
        (
            self.prior.get(name).unwrap_or(NULL),
            self.values.get(name).unwrap_or(NULL),
        )
    }

    pub fn attributes(&self) -> &AttributeSet {
        &self.values
    }

    pub fn prior(&self) -> &AttributeSet {
        &self.prior
    }

    /// Identifier and attributes, for storing as the new state.
    pub fn into_parts(self) -> (Option<String>, AttributeSet) {
        (self.id, self.values)
    }

    /// String attribute that must be set.
    pub(crate) fn required_string(&self, name: &str) -> ConnectorResult<String> {
        self.get_opt_string(name)
            .map(str::to_string)
            .ok_or_else(|| ConnectorError::invalid_configuration(format!("{name} is required")))
    }
}

/// Prior values of changed attributes, restored when an update fails.
#[derive(Debug, Clone, Default)]
pub struct PendingChanges {
    changes: Vec<(String, AttributeValue)>,
}

impl PendingChanges {
    /// Record the prior value of every attribute in `names` that changed.
    pub fn capture(data: &ResourceData, names: &[&str]) -> Self {
        let changes = names
            .iter()
            .filter(|name| data.has_change(name))
            .map(|name| ((*name).to_string(), data.get_change(name).0.clone()))
            .collect();
        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.changes.iter().any(|(n, _)| n == name)
    }

    /// Restore the captured prior values.
    pub fn revert(&self, data: &mut ResourceData) {
        for (name, value) in &self.changes {
            tracing::debug!(attribute = %name, "Reverting attribute after failed update");
            data.set(name, value.clone());
        }
    }
}

/// Provider-wide settings shared by every resource.
#[derive(Clone)]
pub struct SharedConfig {
    /// Used when a `server` block has no auth sub-block.
    pub default_auth: Option<AuthConfig>,
    pub classifier: Arc<dyn ErrorClassifier>,
}

impl std::fmt::Debug for SharedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConfig")
            .field(
                "default_auth",
                &self.default_auth.as_ref().map(AuthConfig::method_name),
            )
            .finish_non_exhaustive()
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            default_auth: None,
            classifier: Arc::new(DefaultClassifier),
        }
    }
}

impl SharedConfig {
    /// Endpoint from the resource's own `server` block.
    pub fn endpoint(&self, data: &ResourceData) -> ConnectorResult<ServerEndpoint> {
        let block = match data.get(attrs::SERVER) {
            Some(AttributeValue::Object(map)) => map.clone(),
            Some(_) => {
                return Err(ConnectorError::invalid_configuration(
                    "server must be a block",
                ))
            }
            None => return Err(ConnectorError::invalid_configuration("server is required")),
        };
        let block: ServerBlock = serde_json::from_value(Value::Object(block)).map_err(|e| {
            ConnectorError::invalid_configuration(format!("invalid server block: {e}"))
        })?;
        ServerEndpoint::from_block(block, self.default_auth.as_ref())
    }
}

/// Capability interface of one object kind.
#[async_trait]
pub trait Resource: Send + Sync {
    fn kind(&self) -> ObjectKind;

    fn schema(&self) -> &ResourceSchema;

    /// Plan-time checks, run before any remote call.
    fn validate(&self, data: &ResourceData) -> ConnectorResult<()> {
        self.schema().check(data.attributes())?;
        self.validate_attributes(data)
    }

    /// Kind-specific attribute checks.
    fn validate_attributes(&self, _data: &ResourceData) -> ConnectorResult<()> {
        Ok(())
    }

    async fn create(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()>;

    /// Refresh `data` from the server; clears the identifier when the object
    /// is gone.
    async fn read(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()>;

    async fn update(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()>;

    async fn delete(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()>;

    /// Populate `data` from its identifier alone.
    async fn import(
        &self,
        _ctx: &OperationContext,
        _factory: &dyn ExecutorFactory,
        _data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        Err(ConnectorError::Unsupported {
            kind: self.kind().as_str(),
            operation: "import",
        })
    }
}

/// Read-only lookup of an existing object.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn kind(&self) -> ObjectKind;

    fn schema(&self) -> &ResourceSchema;

    /// Fill computed attributes and set the identifier when found.
    async fn read(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()>;
}

// Helpers shared by the per-kind resources.

pub(crate) fn server_attribute() -> SchemaAttribute {
    SchemaAttribute::new(attrs::SERVER, AttributeDataType::Block)
        .required()
        .force_new()
        .with_description("Server address and authentication")
}

pub(crate) fn database_attribute() -> SchemaAttribute {
    SchemaAttribute::new(attrs::DATABASE, AttributeDataType::String)
        .required()
        .force_new()
}

/// Validate an identifier attribute when it is set.
pub(crate) fn check_identifier(data: &ResourceData, name: &str) -> Result<(), ValidationError> {
    match data.get_opt_string(name) {
        Some(value) => validate_sql_identifier(name, value),
        None => Ok(()),
    }
}

/// Wrap a remote mutation error with the operation and object.
pub(crate) fn wrap(action: &str, what: &str, err: ConnectorError) -> ConnectorError {
    ConnectorError::operation_failed_with_source(format!("unable to {action} {what}"), err)
}

/// Replace the `server` attribute with the host and port of an imported
/// identifier, keeping any auth sub-block already configured.
pub(crate) fn set_server_from_id(data: &mut ResourceData, id: &ExternalId) {
    let mut block = match data.get(attrs::SERVER) {
        Some(AttributeValue::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    block.insert("host".to_string(), Value::from(id.host()));
    block.insert("port".to_string(), Value::from(id.port()));
    data.set(attrs::SERVER, block);
}

/// Parse the identifier of an import request.
pub(crate) fn import_id(data: &ResourceData, kind: ObjectKind) -> ConnectorResult<ExternalId> {
    let id = data
        .id()
        .ok_or_else(|| ConnectorError::invalid_id("", "import requires an identifier"))?;
    ExternalId::parse(id, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn server() -> Map<String, Value> {
        match json!({ "host": "db.local", "port": "1433", "login": { "username": "sa", "password": "P@ssw0rd!" } }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_has_change_and_get_change() {
        let prior = AttributeSet::new().with("location", "a").with("permissions", vec!["SELECT", "INSERT"]);
        let planned = AttributeSet::new().with("location", "b").with("permissions", vec!["INSERT", "SELECT"]);
        let data = ResourceData::for_update("id", prior, planned);

        assert!(data.has_change("location"));
        assert!(!data.has_change("permissions"));
        assert!(!data.has_change("missing"));
        let (old, new) = data.get_change("location");
        assert_eq!(old.as_string(), Some("a"));
        assert_eq!(new.as_string(), Some("b"));
    }

    #[test]
    fn test_pending_changes_revert() {
        let prior = AttributeSet::new()
            .with("location", "old-location")
            .with("credential_name", "old-cred")
            .with("remote_database_name", "sales");
        let planned = AttributeSet::new()
            .with("location", "new-location")
            .with("credential_name", "new-cred")
            .with("remote_database_name", "sales");
        let mut data = ResourceData::for_update("id", prior, planned);

        let pending = PendingChanges::capture(&data, &["location", "credential_name", "remote_database_name"]);
        assert!(pending.contains("location"));
        assert!(!pending.contains("remote_database_name"));

        pending.revert(&mut data);
        assert_eq!(data.get_string("location"), "old-location");
        assert_eq!(data.get_string("credential_name"), "old-cred");
        assert_eq!(data.get_string("remote_database_name"), "sales");
    }

    #[test]
    fn test_endpoint_from_server_block() {
        let data = ResourceData::new(AttributeSet::new().with("server", server()));
        let endpoint = SharedConfig::default().endpoint(&data).unwrap();
        assert_eq!(endpoint.address(), "db.local:1433");
        assert!(matches!(endpoint.auth, AuthConfig::SqlLogin { .. }));
    }

    #[test]
    fn test_endpoint_uses_default_auth() {
        let data = ResourceData::new(AttributeSet::new().with("server", match json!({ "host": "db.local" }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }));
        let shared = SharedConfig {
            default_auth: Some(AuthConfig::AzureManagedIdentity { user_id: None }),
            ..Default::default()
        };
        let endpoint = shared.endpoint(&data).unwrap();
        assert!(matches!(endpoint.auth, AuthConfig::AzureManagedIdentity { .. }));
        assert_eq!(endpoint.port, 1433);
    }

    #[test]
    fn test_endpoint_requires_server() {
        let err = SharedConfig::default().endpoint(&ResourceData::default()).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_set_server_from_id_keeps_auth() {
        let mut data = ResourceData::new(AttributeSet::new().with("server", server()));
        let id = ExternalId::parse("sqlserver://other.local:2433/login/app", ObjectKind::Login).unwrap();
        set_server_from_id(&mut data, &id);
        let block = data.get("server").and_then(AttributeValue::as_object).unwrap();
        assert_eq!(block["host"], "other.local");
        assert_eq!(block["port"], 2433);
        assert!(block.contains_key("login"));
    }
}
