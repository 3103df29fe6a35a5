//! `mssql_database_sqlscript` resource.
//!
//! The script is applied on create and re-applied whenever it changes. The
//! object named by `verify_object` stands in for the script's effect: the
//! resource exists exactly while that object exists.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use tracing::{info, instrument};

use mssql_connector::context::OperationContext;
use mssql_connector::error::{ConnectorError, ConnectorResult};
use mssql_connector::ids::{ExternalId, ObjectKind};
use mssql_connector::schema::{AttributeDataType, ResourceSchema, SchemaAttribute};
use mssql_connector::traits::ExecutorFactory;
use mssql_connector::validate::{validate_sql_identifier, validate_verify_object, ValidationError};

use super::{
    attrs, database_attribute, import_id, server_attribute, set_server_from_id, wrap,
    PendingChanges, Resource, ResourceData, SharedConfig,
};
use crate::objects::{lint_verify_object, SqlConnector, VerifyObject};

/// Decode the base64 `sqlscript` attribute.
pub(crate) fn decode_script(encoded: &str) -> Result<String, ValidationError> {
    let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
        ValidationError::new(
            attrs::SQLSCRIPT,
            "invalid_encoding",
            format!("sqlscript must be base64 encoded: {e}"),
        )
    })?;
    String::from_utf8(bytes).map_err(|_| {
        ValidationError::new(
            attrs::SQLSCRIPT,
            "invalid_encoding",
            "sqlscript must decode to UTF-8 text",
        )
    })
}

/// Identifier key: base64url of `<database>:<verify_object>`.
pub(crate) fn script_key(database: &str, verify_object: &str) -> String {
    URL_SAFE.encode(format!("{database}:{verify_object}"))
}

/// Split an identifier key back into database and verify_object.
pub(crate) fn parse_script_key(key: &str) -> ConnectorResult<(String, String)> {
    let invalid = |message: &str| ConnectorError::invalid_id(key, message);
    let bytes = URL_SAFE
        .decode(key)
        .map_err(|_| invalid("script key is not base64url encoded"))?;
    let decoded = String::from_utf8(bytes).map_err(|_| invalid("script key is not UTF-8"))?;
    match decoded.split_once(':') {
        Some((database, verify_object)) if !database.is_empty() && !verify_object.is_empty() => {
            Ok((database.to_string(), verify_object.to_string()))
        }
        _ => Err(invalid("script key must encode '<database>:<verify_object>'")),
    }
}

#[derive(Debug)]
pub struct SqlScriptResource {
    shared: Arc<SharedConfig>,
    schema: ResourceSchema,
}

impl SqlScriptResource {
    pub fn new(shared: Arc<SharedConfig>) -> Self {
        let schema = ResourceSchema::new(ObjectKind::SqlScript)
            .with_attribute(server_attribute())
            .with_attribute(database_attribute())
            .with_attribute(
                SchemaAttribute::new(attrs::SQLSCRIPT, AttributeDataType::String)
                    .required()
                    .with_description("Base64 encoded T-SQL; batches separated by GO lines"),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::VERIFY_OBJECT, AttributeDataType::String)
                    .required()
                    .force_new()
                    .with_description("Object created by the script, as 'TYPE NAME'"),
            );
        Self { shared, schema }
    }

    async fn run_script(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &ResourceData,
    ) -> ConnectorResult<usize> {
        let endpoint = self.shared.endpoint(data)?;
        let database = data.required_string(attrs::DATABASE)?;
        let script = decode_script(data.get_string(attrs::SQLSCRIPT))?;

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        connector.execute_script(&database, &script).await
    }
}

#[async_trait]
impl Resource for SqlScriptResource {
    fn kind(&self) -> ObjectKind {
        ObjectKind::SqlScript
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    fn validate_attributes(&self, data: &ResourceData) -> ConnectorResult<()> {
        validate_sql_identifier(attrs::DATABASE, data.get_string(attrs::DATABASE))?;
        let script = decode_script(data.get_string(attrs::SQLSCRIPT))?;
        let verify_object = data.get_string(attrs::VERIFY_OBJECT);
        validate_verify_object(attrs::VERIFY_OBJECT, verify_object)?;
        lint_verify_object(&script, verify_object)?;
        Ok(())
    }

    #[instrument(skip_all, fields(verify_object = data.get_string(attrs::VERIFY_OBJECT)))]
    async fn create(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let database = data.required_string(attrs::DATABASE)?;
        let verify_object = data.required_string(attrs::VERIFY_OBJECT)?;
        let what = format!("sql script [{verify_object}]");

        let batches = self
            .run_script(ctx, factory, data)
            .await
            .map_err(|e| wrap("execute", &what, e))?;

        let endpoint = self.shared.endpoint(data)?;
        data.set_id(ExternalId::database_scoped(
            &endpoint,
            ObjectKind::SqlScript,
            &database,
            script_key(&database, &verify_object),
        ));
        info!(batches, "executed {what} in [{database}]");

        self.read(ctx, factory, data).await
    }

    #[instrument(skip_all, fields(id = ?data.id()))]
    async fn read(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let endpoint = self.shared.endpoint(data)?;
        let database = data.required_string(attrs::DATABASE)?;
        let object = VerifyObject::parse(data.get_string(attrs::VERIFY_OBJECT))?;
        let what = format!("sql script [{object}]");

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        let outcome = connector
            .get_sqlscript_outcome(&database, &object, self.shared.classifier.as_ref())
            .await
            .map_err(|e| wrap("read", &what, e))?;

        if outcome.is_none() {
            info!("verification object for {what} not found in [{database}]");
            data.clear_id();
        }
        Ok(())
    }

    #[instrument(skip_all, fields(id = ?data.id()))]
    async fn update(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let pending = PendingChanges::capture(data, &[attrs::SQLSCRIPT]);
        if !pending.is_empty() {
            let what = format!("sql script [{}]", data.get_string(attrs::VERIFY_OBJECT));
            match self.run_script(ctx, factory, data).await {
                Ok(batches) => info!(batches, "re-executed {what}"),
                Err(err) => {
                    pending.revert(data);
                    return Err(wrap("execute", &what, err));
                }
            }
        }

        self.read(ctx, factory, data).await
    }

    /// Scripts are not undone; only the state is forgotten.
    #[instrument(skip_all, fields(id = ?data.id()))]
    async fn delete(
        &self,
        _ctx: &OperationContext,
        _factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        data.clear_id();
        info!("removed sql script [{}] from state", data.get_string(attrs::VERIFY_OBJECT));
        Ok(())
    }

    #[instrument(skip_all, fields(id = ?data.id()))]
    async fn import(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let id = import_id(data, ObjectKind::SqlScript)?;
        let database = id.database().unwrap_or_default().to_string();
        let (key_database, verify_object) = parse_script_key(id.key())?;
        if key_database != database {
            return Err(ConnectorError::invalid_id(
                id.to_string(),
                format!("script key names database [{key_database}], identifier names [{database}]"),
            ));
        }
        let object = VerifyObject::parse(&verify_object)?;

        set_server_from_id(data, &id);
        data.set(attrs::DATABASE, database.as_str());
        data.set(attrs::VERIFY_OBJECT, verify_object.as_str());

        let endpoint = self.shared.endpoint(data)?;
        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        connector
            .get_sqlscript_outcome(&database, &object, self.shared.classifier.as_ref())
            .await
            .map_err(|e| wrap("import", &format!("sql script [{object}]"), e))?
            .ok_or_else(|| ConnectorError::ObjectNotFound {
                identifier: format!("no {object} found in [{database}] for import"),
            })?;

        data.set_id(ExternalId::database_scoped(
            &endpoint,
            ObjectKind::SqlScript,
            &database,
            id.key(),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_key_roundtrip() {
        let key = script_key("appdb", "TABLE dbo.Orders");
        assert!(!key.contains('/') && !key.contains('+'));
        assert_eq!(
            parse_script_key(&key).unwrap(),
            ("appdb".to_string(), "TABLE dbo.Orders".to_string())
        );
    }

    #[test]
    fn test_parse_script_key_requires_separator() {
        let key = URL_SAFE.encode("no-separator");
        assert!(matches!(
            parse_script_key(&key),
            Err(ConnectorError::InvalidIdentifier { .. })
        ));
        assert!(parse_script_key("%%%").is_err());
    }

    #[test]
    fn test_decode_script() {
        let encoded = STANDARD.encode("CREATE TABLE t (id int)");
        assert_eq!(decode_script(&encoded).unwrap(), "CREATE TABLE t (id int)");
        assert_eq!(decode_script("not base64!").unwrap_err().code, "invalid_encoding");
    }
}
