//! `mssql_database_permissions` resource.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use mssql_connector::context::OperationContext;
use mssql_connector::error::{ConnectorError, ConnectorResult};
use mssql_connector::ids::{ExternalId, ObjectKind};
use mssql_connector::schema::{AttributeDataType, ResourceSchema, SchemaAttribute};
use mssql_connector::traits::ExecutorFactory;
use mssql_connector::validate::{validate_permission, validate_sql_identifier};

use super::{
    attrs, database_attribute, import_id, server_attribute, set_server_from_id, wrap,
    PendingChanges, Resource, ResourceData, SharedConfig,
};
use crate::objects::{DatabasePermissions, SqlConnector};

#[derive(Debug)]
pub struct DatabasePermissionsResource {
    shared: Arc<SharedConfig>,
    schema: ResourceSchema,
}

impl DatabasePermissionsResource {
    pub fn new(shared: Arc<SharedConfig>) -> Self {
        let schema = ResourceSchema::new(ObjectKind::DatabasePermissions)
            .with_attribute(server_attribute())
            .with_attribute(database_attribute())
            .with_attribute(
                SchemaAttribute::new(attrs::USERNAME, AttributeDataType::String)
                    .required()
                    .force_new(),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::PERMISSIONS, AttributeDataType::StringSet)
                    .required()
                    .with_description("Database permissions granted to the user, e.g. SELECT"),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::PRINCIPAL_ID, AttributeDataType::Integer).computed(),
            );
        Self { shared, schema }
    }

    fn apply(data: &mut ResourceData, permissions: DatabasePermissions) {
        data.set(attrs::PRINCIPAL_ID, permissions.principal_id);
        data.set(attrs::PERMISSIONS, permissions.permissions);
    }

    fn describe(username: &str) -> String {
        format!("permissions for user [{username}]")
    }
}

#[async_trait]
impl Resource for DatabasePermissionsResource {
    fn kind(&self) -> ObjectKind {
        ObjectKind::DatabasePermissions
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    fn validate_attributes(&self, data: &ResourceData) -> ConnectorResult<()> {
        validate_sql_identifier(attrs::DATABASE, data.get_string(attrs::DATABASE))?;
        validate_sql_identifier(attrs::USERNAME, data.get_string(attrs::USERNAME))?;
        for permission in data.get_strings(attrs::PERMISSIONS) {
            validate_permission(attrs::PERMISSIONS, &permission)?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(username = data.get_string(attrs::USERNAME)))]
    async fn create(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let endpoint = self.shared.endpoint(data)?;
        let database = data.required_string(attrs::DATABASE)?;
        let username = data.required_string(attrs::USERNAME)?;
        let permissions = data.get_strings(attrs::PERMISSIONS);
        let what = Self::describe(&username);

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        connector
            .grant_database_permissions(&database, &username, &permissions)
            .await
            .map_err(|e| wrap("create", &what, e))?;

        data.set_id(ExternalId::database_scoped(
            &endpoint,
            ObjectKind::DatabasePermissions,
            &database,
            &username,
        ));
        info!("granted {what} in [{database}]");

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
        let username = data.required_string(attrs::USERNAME)?;
        let what = Self::describe(&username);

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        if !connector
            .database_exists(&database)
            .await
            .map_err(|e| wrap("read", &what, e))?
        {
            info!("database [{database}] not found, {what} are absent");
            data.clear_id();
            return Ok(());
        }

        match connector
            .get_database_permissions(&database, &username)
            .await
            .map_err(|e| wrap("read", &what, e))?
        {
            Some(permissions) => Self::apply(data, permissions),
            None => {
                info!("no user [{username}] found in [{database}]");
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
        let username = data.required_string(attrs::USERNAME)?;

        let pending = PendingChanges::capture(data, &[attrs::PERMISSIONS]);
        if !pending.is_empty() {
            let current: Vec<String> = data
                .prior()
                .get_strings(attrs::PERMISSIONS)
                .into_iter()
                .map(str::to_string)
                .collect();
            let desired = data.get_strings(attrs::PERMISSIONS);
            let what = Self::describe(&username);

            let executor = factory.executor(&endpoint)?;
            let connector = SqlConnector::new(executor.as_ref(), ctx);
            if let Err(err) = connector
                .update_database_permissions(&database, &username, &current, &desired)
                .await
            {
                pending.revert(data);
                return Err(wrap("update", &what, err));
            }
            info!("updated {what} in [{database}]");
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
        let username = data.required_string(attrs::USERNAME)?;
        let permissions = data.get_strings(attrs::PERMISSIONS);
        let what = Self::describe(&username);

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        connector
            .revoke_database_permissions(&database, &username, &permissions)
            .await
            .map_err(|e| wrap("delete", &what, e))?;

        data.clear_id();
        info!("revoked {what} in [{database}]");
        Ok(())
    }

    #[instrument(skip_all, fields(id = ?data.id()))]
    async fn import(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let id = import_id(data, ObjectKind::DatabasePermissions)?;
        let database = id.database().unwrap_or_default().to_string();
        set_server_from_id(data, &id);
        data.set(attrs::DATABASE, database.as_str());
        data.set(attrs::USERNAME, id.key());

        let endpoint = self.shared.endpoint(data)?;
        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        let permissions = connector
            .get_database_permissions(&database, id.key())
            .await
            .map_err(|e| wrap("import", &Self::describe(id.key()), e))?
            .ok_or_else(|| ConnectorError::ObjectNotFound {
                identifier: format!("no user [{}] found in [{database}] for import", id.key()),
            })?;

        Self::apply(data, permissions);
        data.set_id(ExternalId::database_scoped(
            &endpoint,
            ObjectKind::DatabasePermissions,
            &database,
            id.key(),
        ));
        Ok(())
    }
}
