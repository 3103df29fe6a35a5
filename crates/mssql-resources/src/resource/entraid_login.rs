//! `mssql_entraid_login` resource.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};
use uuid::Uuid;

use mssql_connector::context::OperationContext;
use mssql_connector::error::{ConnectorError, ConnectorResult};
use mssql_connector::ids::{ExternalId, ObjectKind};
use mssql_connector::schema::{AttributeDataType, ResourceSchema, SchemaAttribute};
use mssql_connector::traits::ExecutorFactory;
use mssql_connector::validate::{validate_sql_identifier, ValidationError};

use super::{
    attrs, import_id, server_attribute, set_server_from_id, wrap, Resource, ResourceData,
    SharedConfig,
};
use crate::objects::{EntraIdLogin, SqlConnector};

/// Schema shared with the Entra ID login data source.
pub(crate) fn entraid_login_schema(lookup: bool) -> ResourceSchema {
    let object_id = SchemaAttribute::new(attrs::OBJECT_ID, AttributeDataType::String)
        .computed()
        .with_description("Entra object id; sent as WITH OBJECT_ID on Azure SQL");
    let object_id = if lookup { object_id } else { object_id.force_new() };

    ResourceSchema::new(ObjectKind::EntraIdLogin)
        .with_attribute(server_attribute())
        .with_attribute(
            SchemaAttribute::new(attrs::LOGIN_NAME, AttributeDataType::String)
                .required()
                .force_new(),
        )
        .with_attribute(object_id)
        .with_attribute(SchemaAttribute::new(attrs::SID, AttributeDataType::String).computed())
        .with_attribute(
            SchemaAttribute::new(attrs::DEFAULT_DATABASE, AttributeDataType::String).computed(),
        )
        .with_attribute(
            SchemaAttribute::new(attrs::DEFAULT_LANGUAGE, AttributeDataType::String).computed(),
        )
        .with_attribute(
            SchemaAttribute::new(attrs::PRINCIPAL_ID, AttributeDataType::Integer).computed(),
        )
}

pub(crate) fn apply_entraid_login(data: &mut ResourceData, login: EntraIdLogin) {
    data.set(attrs::PRINCIPAL_ID, login.principal_id);
    data.set(attrs::SID, login.sid);
    if let Some(object_id) = login.object_id {
        data.set(attrs::OBJECT_ID, object_id);
    }
    data.set(attrs::DEFAULT_DATABASE, login.default_database);
    data.set(attrs::DEFAULT_LANGUAGE, login.default_language);
}

pub(crate) fn validate_object_id(data: &ResourceData) -> Result<(), ValidationError> {
    match data.get_opt_string(attrs::OBJECT_ID) {
        Some(value) if Uuid::parse_str(value).is_err() => Err(ValidationError::new(
            attrs::OBJECT_ID,
            "invalid_format",
            format!("object_id must be a UUID, got {value:?}"),
        )),
        _ => Ok(()),
    }
}

/// Logins backed by Microsoft Entra ID. Every attribute forces recreation.
#[derive(Debug)]
pub struct EntraIdLoginResource {
    shared: Arc<SharedConfig>,
    schema: ResourceSchema,
}

impl EntraIdLoginResource {
    pub fn new(shared: Arc<SharedConfig>) -> Self {
        Self {
            shared,
            schema: entraid_login_schema(false),
        }
    }
}

#[async_trait]
impl Resource for EntraIdLoginResource {
    fn kind(&self) -> ObjectKind {
        ObjectKind::EntraIdLogin
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    fn validate_attributes(&self, data: &ResourceData) -> ConnectorResult<()> {
        validate_sql_identifier(attrs::LOGIN_NAME, data.get_string(attrs::LOGIN_NAME))?;
        validate_object_id(data)?;
        Ok(())
    }

    #[instrument(skip_all, fields(login = data.get_string(attrs::LOGIN_NAME)))]
    async fn create(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let endpoint = self.shared.endpoint(data)?;
        let login_name = data.required_string(attrs::LOGIN_NAME)?;

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        connector
            .create_entraid_login(&login_name, data.get_opt_string(attrs::OBJECT_ID))
            .await
            .map_err(|e| wrap("create", &format!("Entra ID login [{login_name}]"), e))?;

        data.set_id(ExternalId::server_scoped(&endpoint, ObjectKind::EntraIdLogin, &login_name));
        info!("created Entra ID login [{login_name}]");

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
        let login_name = data.required_string(attrs::LOGIN_NAME)?;

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        let login = connector
            .get_entraid_login(&login_name)
            .await
            .map_err(|e| wrap("read", &format!("Entra ID login [{login_name}]"), e))?;

        match login {
            Some(login) => apply_entraid_login(data, login),
            None => {
                info!("no Entra ID login found for [{login_name}]");
                data.clear_id();
            }
        }
        Ok(())
    }

    /// Nothing is mutable in place; refresh only.
    async fn update(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
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
        let login_name = data.required_string(attrs::LOGIN_NAME)?;

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        connector
            .delete_entraid_login(&login_name)
            .await
            .map_err(|e| wrap("delete", &format!("Entra ID login [{login_name}]"), e))?;

        data.clear_id();
        info!("deleted Entra ID login [{login_name}]");
        Ok(())
    }

    #[instrument(skip_all, fields(id = ?data.id()))]
    async fn import(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let id = import_id(data, ObjectKind::EntraIdLogin)?;
        set_server_from_id(data, &id);
        data.set(attrs::LOGIN_NAME, id.key());

        let endpoint = self.shared.endpoint(data)?;
        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        let login = connector
            .get_entraid_login(id.key())
            .await
            .map_err(|e| wrap("import", &format!("Entra ID login [{}]", id.key()), e))?
            .ok_or_else(|| ConnectorError::ObjectNotFound {
                identifier: format!("no Entra ID login [{}] found for import", id.key()),
            })?;

        apply_entraid_login(data, login);
        data.set_id(ExternalId::server_scoped(&endpoint, ObjectKind::EntraIdLogin, id.key()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mssql_connector::operation::AttributeSet;

    #[test]
    fn test_object_id_must_be_uuid() {
        let data = ResourceData::new(AttributeSet::new().with(attrs::OBJECT_ID, "not-a-guid"));
        let err = validate_object_id(&data).unwrap_err();
        assert_eq!(err.field, "object_id");

        let data = ResourceData::new(
            AttributeSet::new().with(attrs::OBJECT_ID, "6e3a1c2b-4f5d-4a7b-9c8d-0e1f2a3b4c5d"),
        );
        assert!(validate_object_id(&data).is_ok());
    }

    #[test]
    fn test_every_configurable_attribute_forces_new() {
        let schema = entraid_login_schema(false);
        let forced: Vec<&str> = schema.force_new_attributes().map(|a| a.name.as_str()).collect();
        assert_eq!(forced, vec!["server", "login_name", "object_id"]);
    }
}
