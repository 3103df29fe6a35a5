//! `mssql_database_credential` resource.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{info, instrument};

use mssql_connector::context::OperationContext;
use mssql_connector::error::{ConnectorError, ConnectorResult};
use mssql_connector::ids::{ExternalId, ObjectKind};
use mssql_connector::schema::{AttributeDataType, ResourceSchema, SchemaAttribute};
use mssql_connector::traits::ExecutorFactory;
use mssql_connector::validate::{validate_credential_identity, validate_sql_identifier};

use super::{
    attrs, database_attribute, import_id, server_attribute, set_server_from_id, wrap,
    PendingChanges, Resource, ResourceData, SharedConfig,
};
use crate::objects::{DatabaseCredential, SqlConnector};

#[derive(Debug)]
pub struct DatabaseCredentialResource {
    shared: Arc<SharedConfig>,
    schema: ResourceSchema,
}

impl DatabaseCredentialResource {
    pub fn new(shared: Arc<SharedConfig>) -> Self {
        let schema = ResourceSchema::new(ObjectKind::DatabaseCredential)
            .with_attribute(server_attribute())
            .with_attribute(database_attribute())
            .with_attribute(
                SchemaAttribute::new(attrs::CREDENTIAL_NAME, AttributeDataType::String)
                    .required()
                    .force_new(),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::IDENTITY_NAME, AttributeDataType::String)
                    .required()
                    .with_description("Identity name, or SHARED ACCESS SIGNATURE"),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::SECRET, AttributeDataType::String).sensitive(),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::CREDENTIAL_ID, AttributeDataType::Integer).computed(),
            );
        Self { shared, schema }
    }

    fn secret(data: &ResourceData) -> Option<SecretString> {
        data.get_opt_string(attrs::SECRET)
            .map(|s| SecretString::from(s.to_string()))
    }

    fn apply(data: &mut ResourceData, credential: DatabaseCredential) {
        data.set(attrs::CREDENTIAL_ID, credential.credential_id);
        data.set(attrs::IDENTITY_NAME, credential.identity_name);
    }
}

#[async_trait]
impl Resource for DatabaseCredentialResource {
    fn kind(&self) -> ObjectKind {
        ObjectKind::DatabaseCredential
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    fn validate_attributes(&self, data: &ResourceData) -> ConnectorResult<()> {
        validate_sql_identifier(attrs::DATABASE, data.get_string(attrs::DATABASE))?;
        validate_sql_identifier(attrs::CREDENTIAL_NAME, data.get_string(attrs::CREDENTIAL_NAME))?;
        validate_credential_identity(attrs::IDENTITY_NAME, data.get_string(attrs::IDENTITY_NAME))?;
        Ok(())
    }

    #[instrument(skip_all, fields(credential = data.get_string(attrs::CREDENTIAL_NAME)))]
    async fn create(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let endpoint = self.shared.endpoint(data)?;
        let database = data.required_string(attrs::DATABASE)?;
        let name = data.required_string(attrs::CREDENTIAL_NAME)?;
        let identity = data.required_string(attrs::IDENTITY_NAME)?;

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        connector
            .create_database_credential(&database, &name, &identity, Self::secret(data).as_ref())
            .await
            .map_err(|e| wrap("create", &format!("database credential [{name}]"), e))?;

        data.set_id(ExternalId::database_scoped(
            &endpoint,
            ObjectKind::DatabaseCredential,
            &database,
            &name,
        ));
        info!("created database credential [{name}] in [{database}]");

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
        let name = data.required_string(attrs::CREDENTIAL_NAME)?;
        let what = format!("database credential [{name}]");

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        if !connector
            .database_exists(&database)
            .await
            .map_err(|e| wrap("read", &what, e))?
        {
            info!("database [{database}] not found, {what} is absent");
            data.clear_id();
            return Ok(());
        }

        match connector
            .get_database_credential(&database, &name)
            .await
            .map_err(|e| wrap("read", &what, e))?
        {
            Some(credential) => Self::apply(data, credential),
            None => {
                info!("no {what} found in [{database}]");
                data.clear_id();
            }
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
        let endpoint = self.shared.endpoint(data)?;
        let database = data.required_string(attrs::DATABASE)?;
        let name = data.required_string(attrs::CREDENTIAL_NAME)?;

        let pending = PendingChanges::capture(data, &[attrs::IDENTITY_NAME, attrs::SECRET]);
        if !pending.is_empty() {
            let identity = data.required_string(attrs::IDENTITY_NAME)?;
            let executor = factory.executor(&endpoint)?;
            let connector = SqlConnector::new(executor.as_ref(), ctx);
            if let Err(err) = connector
                .update_database_credential(&database, &name, &identity, Self::secret(data).as_ref())
                .await
            {
                pending.revert(data);
                return Err(wrap("update", &format!("database credential [{name}]"), err));
            }
            info!("updated database credential [{name}] in [{database}]");
        }

        self.read(ctx, factory, data).await
    }

    #[instrument(skip_all, fields(id = ?data.id()))]
    async fn delete(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let endpoint = self.shared.endpoint(data)?;
        let database = data.required_string(attrs::DATABASE)?;
        let name = data.required_string(attrs::CREDENTIAL_NAME)?;

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        connector
            .delete_database_credential(&database, &name)
            .await
            .map_err(|e| wrap("delete", &format!("database credential [{name}]"), e))?;

        data.clear_id();
        info!("deleted database credential [{name}] from [{database}]");
        Ok(())
    }

    #[instrument(skip_all, fields(id = ?data.id()))]
    async fn import(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let id = import_id(data, ObjectKind::DatabaseCredential)?;
        let database = id.database().unwrap_or_default().to_string();
        set_server_from_id(data, &id);
        data.set(attrs::DATABASE, database.as_str());
        data.set(attrs::CREDENTIAL_NAME, id.key());

        let endpoint = self.shared.endpoint(data)?;
        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        let credential = connector
            .get_database_credential(&database, id.key())
            .await
            .map_err(|e| wrap("import", &format!("database credential [{}]", id.key()), e))?
            .ok_or_else(|| ConnectorError::ObjectNotFound {
                identifier: format!(
                    "no database credential [{}] found in [{database}] for import",
                    id.key()
                ),
            })?;

        Self::apply(data, credential);
        data.set_id(ExternalId::database_scoped(
            &endpoint,
            ObjectKind::DatabaseCredential,
            &database,
            id.key(),
        ));
        Ok(())
    }
}
