//! `mssql_azure_external_datasource` and `mssql_external_datasource`
//! resources. Both manage rows of `sys.external_data_sources`; the Azure
//! kind additionally requires an Azure SQL server.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use mssql_connector::context::OperationContext;
use mssql_connector::error::{ConnectorError, ConnectorResult};
use mssql_connector::ids::{ExternalId, ObjectKind};
use mssql_connector::schema::{AttributeDataType, ResourceSchema, SchemaAttribute};
use mssql_connector::traits::ExecutorFactory;
use mssql_connector::validate::{validate_one_of, validate_sql_identifier, ValidationError};

use super::{
    attrs, check_identifier, database_attribute, import_id, server_attribute, set_server_from_id,
    wrap, PendingChanges, Resource, ResourceData, SharedConfig,
};
use crate::objects::{ExternalDatasource, NewExternalDatasource, SqlConnector};

pub const AZURE_DATASOURCE_TYPES: &[&str] = &["BLOB_STORAGE", "RDBMS"];
pub const DATASOURCE_TYPES: &[&str] = &["BLOB_STORAGE", "RDBMS", "HADOOP", "SHARD_MAP_MANAGER"];

const NOT_AZURE: &str = "The database is not an Azure SQL Database.";

pub(crate) fn datasource_kind(azure: bool) -> ObjectKind {
    if azure {
        ObjectKind::AzureExternalDatasource
    } else {
        ObjectKind::ExternalDatasource
    }
}

/// Fail unless the server is Azure SQL.
pub(crate) async fn ensure_azure(connector: &SqlConnector<'_>) -> ConnectorResult<()> {
    if connector.is_azure().await? {
        Ok(())
    } else {
        Err(ConnectorError::IncompatibleServer {
            message: NOT_AZURE.to_string(),
        })
    }
}

pub(crate) fn apply_external_datasource(data: &mut ResourceData, datasource: ExternalDatasource) {
    data.set(attrs::DATA_SOURCE_ID, datasource.data_source_id);
    data.set(attrs::LOCATION, datasource.location);
    data.set(attrs::TYPE, datasource.type_desc);
    data.set(attrs::CREDENTIAL_NAME, datasource.credential_name);
    data.set(attrs::CREDENTIAL_ID, datasource.credential_id);
    data.set(attrs::REMOTE_DATABASE_NAME, datasource.remote_database_name);
}

/// `remote_database_name` is required for `RDBMS` and forbidden for
/// `BLOB_STORAGE`.
pub(crate) fn check_remote_database(
    type_desc: &str,
    remote_database_name: Option<&str>,
) -> Result<(), ValidationError> {
    match (type_desc, remote_database_name) {
        ("RDBMS", None) => Err(ValidationError::new(
            attrs::REMOTE_DATABASE_NAME,
            "required",
            "remote_database_name is required when type is RDBMS",
        )),
        ("BLOB_STORAGE", Some(_)) => Err(ValidationError::new(
            attrs::REMOTE_DATABASE_NAME,
            "not_allowed",
            "remote_database_name cannot be set when type is BLOB_STORAGE",
        )),
        _ => Ok(()),
    }
}

#[derive(Debug)]
pub struct ExternalDatasourceResource {
    shared: Arc<SharedConfig>,
    schema: ResourceSchema,
    azure: bool,
}

impl ExternalDatasourceResource {
    /// The `mssql_azure_external_datasource` kind.
    pub fn azure(shared: Arc<SharedConfig>) -> Self {
        Self::new(shared, true)
    }

    /// The `mssql_external_datasource` kind.
    pub fn generic(shared: Arc<SharedConfig>) -> Self {
        Self::new(shared, false)
    }

    fn new(shared: Arc<SharedConfig>, azure: bool) -> Self {
        let credential = SchemaAttribute::new(attrs::CREDENTIAL_NAME, AttributeDataType::String);
        let credential = if azure { credential.required() } else { credential };

        let schema = ResourceSchema::new(datasource_kind(azure))
            .with_attribute(server_attribute())
            .with_attribute(database_attribute())
            .with_attribute(
                SchemaAttribute::new(attrs::DATA_SOURCE_NAME, AttributeDataType::String)
                    .required()
                    .force_new(),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::LOCATION, AttributeDataType::String).required(),
            )
            .with_attribute(credential)
            .with_attribute(
                SchemaAttribute::new(attrs::TYPE, AttributeDataType::String)
                    .required()
                    .force_new(),
            )
            .with_attribute(SchemaAttribute::new(
                attrs::REMOTE_DATABASE_NAME,
                AttributeDataType::String,
            ))
            .with_attribute(
                SchemaAttribute::new(attrs::DATA_SOURCE_ID, AttributeDataType::Integer).computed(),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::CREDENTIAL_ID, AttributeDataType::Integer).computed(),
            );
        Self {
            shared,
            schema,
            azure,
        }
    }

    fn allowed_types(&self) -> &'static [&'static str] {
        if self.azure {
            AZURE_DATASOURCE_TYPES
        } else {
            DATASOURCE_TYPES
        }
    }

    fn desired(data: &ResourceData) -> ConnectorResult<NewExternalDatasource> {
        Ok(NewExternalDatasource {
            data_source_name: data.required_string(attrs::DATA_SOURCE_NAME)?,
            location: data.required_string(attrs::LOCATION)?,
            credential_name: data.get_opt_string(attrs::CREDENTIAL_NAME).map(str::to_string),
            type_desc: data.required_string(attrs::TYPE)?,
            remote_database_name: data
                .get_opt_string(attrs::REMOTE_DATABASE_NAME)
                .map(str::to_string),
        })
    }

    fn describe(name: &str) -> String {
        format!("external data source [{name}]")
    }
}

#[async_trait]
impl Resource for ExternalDatasourceResource {
    fn kind(&self) -> ObjectKind {
        datasource_kind(self.azure)
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    fn validate_attributes(&self, data: &ResourceData) -> ConnectorResult<()> {
        validate_sql_identifier(attrs::DATABASE, data.get_string(attrs::DATABASE))?;
        validate_sql_identifier(attrs::DATA_SOURCE_NAME, data.get_string(attrs::DATA_SOURCE_NAME))?;
        check_identifier(data, attrs::CREDENTIAL_NAME)?;
        let type_desc = data.get_string(attrs::TYPE);
        validate_one_of(attrs::TYPE, type_desc, self.allowed_types())?;
        check_remote_database(type_desc, data.get_opt_string(attrs::REMOTE_DATABASE_NAME))?;
        Ok(())
    }

    #[instrument(skip_all, fields(kind = %self.kind(), data_source = data.get_string(attrs::DATA_SOURCE_NAME)))]
    async fn create(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let endpoint = self.shared.endpoint(data)?;
        let database = data.required_string(attrs::DATABASE)?;
        let desired = Self::desired(data)?;
        check_remote_database(&desired.type_desc, desired.remote_database_name.as_deref())?;
        let what = Self::describe(&desired.data_source_name);

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        if self.azure {
            ensure_azure(&connector)
                .await
                .map_err(|e| wrap("create", &what, e))?;
        }
        connector
            .create_external_datasource(&database, &desired)
            .await
            .map_err(|e| wrap("create", &what, e))?;

        data.set_id(ExternalId::database_scoped(
            &endpoint,
            self.kind(),
            &database,
            &desired.data_source_name,
        ));
        info!("created {what} in [{database}]");

        self.read(ctx, factory, data).await
    }

    #[instrument(skip_all, fields(kind = %self.kind(), id = ?data.id()))]
    async fn read(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let endpoint = self.shared.endpoint(data)?;
        let database = data.required_string(attrs::DATABASE)?;
        let name = data.required_string(attrs::DATA_SOURCE_NAME)?;
        let what = Self::describe(&name);

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
        if self.azure {
            ensure_azure(&connector).await.map_err(|e| wrap("read", &what, e))?;
        }

        match connector
            .get_external_datasource(&database, &name)
            .await
            .map_err(|e| wrap("read", &what, e))?
        {
            Some(datasource) => apply_external_datasource(data, datasource),
            None => {
                info!("no {what} found in [{database}]");
                data.clear_id();
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(kind = %self.kind(), id = ?data.id()))]
    async fn update(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let endpoint = self.shared.endpoint(data)?;
        let database = data.required_string(attrs::DATABASE)?;

        let pending = PendingChanges::capture(
            data,
            &[attrs::LOCATION, attrs::CREDENTIAL_NAME, attrs::REMOTE_DATABASE_NAME],
        );
        if !pending.is_empty() {
            let desired = Self::desired(data)?;
            let what = Self::describe(&desired.data_source_name);
            let executor = factory.executor(&endpoint)?;
            let connector = SqlConnector::new(executor.as_ref(), ctx);
            if let Err(err) = connector.update_external_datasource(&database, &desired).await {
                pending.revert(data);
                return Err(wrap("update", &what, err));
            }
            info!("updated {what} in [{database}]");
        }

        self.read(ctx, factory, data).await
    }

    #[instrument(skip_all, fields(kind = %self.kind(), id = ?data.id()))]
    async fn delete(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let endpoint = self.shared.endpoint(data)?;
        let database = data.required_string(attrs::DATABASE)?;
        let name = data.required_string(attrs::DATA_SOURCE_NAME)?;
        let what = Self::describe(&name);

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        connector
            .delete_external_datasource(&database, &name)
            .await
            .map_err(|e| wrap("delete", &what, e))?;

        data.clear_id();
        info!("deleted {what} from [{database}]");
        Ok(())
    }

    #[instrument(skip_all, fields(kind = %self.kind(), id = ?data.id()))]
    async fn import(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let id = import_id(data, self.kind())?;
        let database = id.database().unwrap_or_default().to_string();
        set_server_from_id(data, &id);
        data.set(attrs::DATABASE, database.as_str());
        data.set(attrs::DATA_SOURCE_NAME, id.key());
        let what = Self::describe(id.key());

        let endpoint = self.shared.endpoint(data)?;
        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        if self.azure {
            ensure_azure(&connector).await.map_err(|e| wrap("import", &what, e))?;
        }
        let datasource = connector
            .get_external_datasource(&database, id.key())
            .await
            .map_err(|e| wrap("import", &what, e))?
            .ok_or_else(|| ConnectorError::ObjectNotFound {
                identifier: format!("no {what} found in [{database}] for import"),
            })?;

        apply_external_datasource(data, datasource);
        data.set_id(ExternalId::database_scoped(&endpoint, self.kind(), &database, id.key()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rdbms_requires_remote_database() {
        let err = check_remote_database("RDBMS", None).unwrap_err();
        assert_eq!(err.code, "required");
        assert!(check_remote_database("RDBMS", Some("remote")).is_ok());
    }

    #[test]
    fn test_blob_storage_forbids_remote_database() {
        let err = check_remote_database("BLOB_STORAGE", Some("remote")).unwrap_err();
        assert_eq!(err.code, "not_allowed");
        assert!(check_remote_database("BLOB_STORAGE", None).is_ok());
        assert!(check_remote_database("HADOOP", Some("remote")).is_ok());
    }

    #[test]
    fn test_allowed_types_per_kind() {
        let shared = Arc::new(SharedConfig::default());
        let azure = ExternalDatasourceResource::azure(shared.clone());
        let generic = ExternalDatasourceResource::generic(shared);
        assert!(!azure.allowed_types().contains(&"HADOOP"));
        assert!(generic.allowed_types().contains(&"SHARD_MAP_MANAGER"));
        assert_eq!(azure.kind(), ObjectKind::AzureExternalDatasource);
        assert_eq!(generic.kind(), ObjectKind::ExternalDatasource);
    }
}
