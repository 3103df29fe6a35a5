//! Read-only lookups of existing objects.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use mssql_connector::context::OperationContext;
use mssql_connector::error::ConnectorResult;
use mssql_connector::ids::{ExternalId, ObjectKind};
use mssql_connector::schema::{AttributeDataType, ResourceSchema, SchemaAttribute};
use mssql_connector::traits::ExecutorFactory;

use super::entraid_login::{apply_entraid_login, entraid_login_schema};
use super::external_datasource::{apply_external_datasource, datasource_kind, ensure_azure};
use super::{attrs, database_attribute, server_attribute, wrap, DataSource, ResourceData, SharedConfig};
use crate::objects::SqlConnector;

/// Looks up an Entra ID login by name.
#[derive(Debug)]
pub struct EntraIdLoginDataSource {
    shared: Arc<SharedConfig>,
    schema: ResourceSchema,
}

impl EntraIdLoginDataSource {
    pub fn new(shared: Arc<SharedConfig>) -> Self {
        Self {
            shared,
            schema: entraid_login_schema(true),
        }
    }
}

#[async_trait]
impl DataSource for EntraIdLoginDataSource {
    fn kind(&self) -> ObjectKind {
        ObjectKind::EntraIdLogin
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    #[instrument(skip_all, fields(login = data.get_string(attrs::LOGIN_NAME)))]
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
            Some(login) => {
                apply_entraid_login(data, login);
                data.set_id(ExternalId::server_scoped(
                    &endpoint,
                    ObjectKind::EntraIdLogin,
                    &login_name,
                ));
            }
            None => {
                info!("no Entra ID login found for [{login_name}]");
                data.clear_id();
            }
        }
        Ok(())
    }
}

/// Looks up an external data source by name, in either the Azure or the
/// generic flavour.
#[derive(Debug)]
pub struct ExternalDatasourceDataSource {
    shared: Arc<SharedConfig>,
    schema: ResourceSchema,
    azure: bool,
}

impl ExternalDatasourceDataSource {
    pub fn azure(shared: Arc<SharedConfig>) -> Self {
        Self::new(shared, true)
    }

    pub fn generic(shared: Arc<SharedConfig>) -> Self {
        Self::new(shared, false)
    }

    fn new(shared: Arc<SharedConfig>, azure: bool) -> Self {
        let computed = |name: &str, data_type| SchemaAttribute::new(name, data_type).computed();
        let schema = ResourceSchema::new(datasource_kind(azure))
            .with_attribute(server_attribute())
            .with_attribute(database_attribute())
            .with_attribute(
                SchemaAttribute::new(attrs::DATA_SOURCE_NAME, AttributeDataType::String).required(),
            )
            .with_attribute(computed(attrs::LOCATION, AttributeDataType::String))
            .with_attribute(computed(attrs::TYPE, AttributeDataType::String))
            .with_attribute(computed(attrs::CREDENTIAL_NAME, AttributeDataType::String))
            .with_attribute(computed(attrs::REMOTE_DATABASE_NAME, AttributeDataType::String))
            .with_attribute(computed(attrs::DATA_SOURCE_ID, AttributeDataType::Integer))
            .with_attribute(computed(attrs::CREDENTIAL_ID, AttributeDataType::Integer));
        Self {
            shared,
            schema,
            azure,
        }
    }
}

#[async_trait]
impl DataSource for ExternalDatasourceDataSource {
    fn kind(&self) -> ObjectKind {
        datasource_kind(self.azure)
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    #[instrument(skip_all, fields(kind = %self.kind(), data_source = data.get_string(attrs::DATA_SOURCE_NAME)))]
    async fn read(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let endpoint = self.shared.endpoint(data)?;
        let database = data.required_string(attrs::DATABASE)?;
        let name = data.required_string(attrs::DATA_SOURCE_NAME)?;
        let what = format!("external data source [{name}]");

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        if self.azure {
            ensure_azure(&connector).await.map_err(|e| wrap("read", &what, e))?;
        }
        let datasource = connector
            .get_external_datasource(&database, &name)
            .await
            .map_err(|e| wrap("read", &what, e))?;

        match datasource {
            Some(datasource) => {
                apply_external_datasource(data, datasource);
                data.set_id(ExternalId::database_scoped(&endpoint, self.kind(), &database, &name));
            }
            None => {
                info!("no {what} found in [{database}]");
                data.clear_id();
            }
        }
        Ok(())
    }
}
