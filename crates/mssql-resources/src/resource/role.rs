//! `mssql_database_role` resource.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use mssql_connector::context::OperationContext;
use mssql_connector::error::{ConnectorError, ConnectorResult};
use mssql_connector::ids::{ExternalId, ObjectKind};
use mssql_connector::schema::{AttributeDataType, ResourceSchema, SchemaAttribute};
use mssql_connector::traits::ExecutorFactory;
use mssql_connector::validate::validate_sql_identifier;

use super::{
    attrs, check_identifier, database_attribute, import_id, server_attribute, set_server_from_id,
    wrap, PendingChanges, Resource, ResourceData, SharedConfig,
};
use crate::objects::{DatabaseRole, SqlConnector};

/// Owner assigned when `owner_name` is removed from the configuration.
pub(crate) const DEFAULT_OWNER: &str = "dbo";

#[derive(Debug)]
pub struct DatabaseRoleResource {
    shared: Arc<SharedConfig>,
    schema: ResourceSchema,
}

impl DatabaseRoleResource {
    pub fn new(shared: Arc<SharedConfig>) -> Self {
        let schema = ResourceSchema::new(ObjectKind::DatabaseRole)
            .with_attribute(server_attribute())
            .with_attribute(database_attribute())
            .with_attribute(
                SchemaAttribute::new(attrs::ROLE_NAME, AttributeDataType::String)
                    .required()
                    .force_new(),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::OWNER_NAME, AttributeDataType::String).computed(),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::ROLE_ID, AttributeDataType::Integer).computed(),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::OWNING_PRINCIPAL_ID, AttributeDataType::Integer)
                    .computed(),
            );
        Self { shared, schema }
    }

    fn apply(data: &mut ResourceData, role: DatabaseRole) {
        data.set(attrs::ROLE_ID, role.role_id);
        data.set(attrs::OWNER_NAME, role.owner_name);
        data.set(attrs::OWNING_PRINCIPAL_ID, role.owning_principal_id);
    }
}

#[async_trait]
impl Resource for DatabaseRoleResource {
    fn kind(&self) -> ObjectKind {
        ObjectKind::DatabaseRole
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    fn validate_attributes(&self, data: &ResourceData) -> ConnectorResult<()> {
        validate_sql_identifier(attrs::DATABASE, data.get_string(attrs::DATABASE))?;
        validate_sql_identifier(attrs::ROLE_NAME, data.get_string(attrs::ROLE_NAME))?;
        check_identifier(data, attrs::OWNER_NAME)?;
        Ok(())
    }

    #[instrument(skip_all, fields(role = data.get_string(attrs::ROLE_NAME)))]
    async fn create(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let endpoint = self.shared.endpoint(data)?;
        let database = data.required_string(attrs::DATABASE)?;
        let role_name = data.required_string(attrs::ROLE_NAME)?;

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        connector
            .create_database_role(&database, &role_name, data.get_opt_string(attrs::OWNER_NAME))
            .await
            .map_err(|e| wrap("create", &format!("database role [{role_name}]"), e))?;

        data.set_id(ExternalId::database_scoped(
            &endpoint,
            ObjectKind::DatabaseRole,
            &database,
            &role_name,
        ));
        info!("created database role [{role_name}] in [{database}]");

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
        let role_name = data.required_string(attrs::ROLE_NAME)?;
        let what = format!("database role [{role_name}]");

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
            .get_database_role(&database, &role_name)
            .await
            .map_err(|e| wrap("read", &what, e))?
        {
            Some(role) => Self::apply(data, role),
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
        let role_name = data.required_string(attrs::ROLE_NAME)?;

        let pending = PendingChanges::capture(data, &[attrs::OWNER_NAME]);
        if !pending.is_empty() {
            let owner = data
                .get_opt_string(attrs::OWNER_NAME)
                .unwrap_or(DEFAULT_OWNER)
                .to_string();
            let executor = factory.executor(&endpoint)?;
            let connector = SqlConnector::new(executor.as_ref(), ctx);
            if let Err(err) = connector
                .update_database_role_owner(&database, &role_name, &owner)
                .await
            {
                pending.revert(data);
                return Err(wrap("update", &format!("database role [{role_name}]"), err));
            }
            info!("changed owner of database role [{role_name}] to [{owner}]");
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
        let role_name = data.required_string(attrs::ROLE_NAME)?;

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        connector
            .delete_database_role(&database, &role_name)
            .await
            .map_err(|e| wrap("delete", &format!("database role [{role_name}]"), e))?;

        data.clear_id();
        info!("deleted database role [{role_name}] from [{database}]");
        Ok(())
    }

    #[instrument(skip_all, fields(id = ?data.id()))]
    async fn import(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let id = import_id(data, ObjectKind::DatabaseRole)?;
        let database = id.database().unwrap_or_default().to_string();
        set_server_from_id(data, &id);
        data.set(attrs::DATABASE, database.as_str());
        data.set(attrs::ROLE_NAME, id.key());

        let endpoint = self.shared.endpoint(data)?;
        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        let role = connector
            .get_database_role(&database, id.key())
            .await
            .map_err(|e| wrap("import", &format!("database role [{}]", id.key()), e))?
            .ok_or_else(|| ConnectorError::ObjectNotFound {
                identifier: format!(
                    "no database role [{}] found in [{database}] for import",
                    id.key()
                ),
            })?;

        Self::apply(data, role);
        data.set_id(ExternalId::database_scoped(
            &endpoint,
            ObjectKind::DatabaseRole,
            &database,
            id.key(),
        ));
        Ok(())
    }
}
