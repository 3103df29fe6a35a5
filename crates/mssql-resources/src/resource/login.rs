//! `mssql_login` resource.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{info, instrument};

use mssql_connector::context::OperationContext;
use mssql_connector::error::{ConnectorError, ConnectorResult};
use mssql_connector::ids::{ExternalId, ObjectKind};
use mssql_connector::schema::{AttributeDataType, ResourceSchema, SchemaAttribute};
use mssql_connector::traits::ExecutorFactory;
use mssql_connector::validate::{validate_password, validate_sid, validate_sql_identifier};

use super::{
    attrs, check_identifier, import_id, server_attribute, set_server_from_id, wrap, PendingChanges,
    Resource, ResourceData, SharedConfig,
};
use crate::objects::{Login, LoginChanges, NewLogin, SqlConnector};

const DEFAULT_LOGIN_DATABASE: &str = "master";

#[derive(Debug)]
pub struct LoginResource {
    shared: Arc<SharedConfig>,
    schema: ResourceSchema,
}

impl LoginResource {
    pub fn new(shared: Arc<SharedConfig>) -> Self {
        let schema = ResourceSchema::new(ObjectKind::Login)
            .with_attribute(server_attribute())
            .with_attribute(
                SchemaAttribute::new(attrs::LOGIN_NAME, AttributeDataType::String)
                    .required()
                    .force_new(),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::PASSWORD, AttributeDataType::String)
                    .required()
                    .sensitive(),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::SID, AttributeDataType::String)
                    .computed()
                    .force_new(),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::DEFAULT_DATABASE, AttributeDataType::String).computed(),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::DEFAULT_LANGUAGE, AttributeDataType::String).computed(),
            )
            .with_attribute(
                SchemaAttribute::new(attrs::PRINCIPAL_ID, AttributeDataType::Integer).computed(),
            );
        Self { shared, schema }
    }

    fn apply(data: &mut ResourceData, login: Login) {
        data.set(attrs::PRINCIPAL_ID, login.principal_id);
        data.set(attrs::SID, login.sid);
        data.set(attrs::DEFAULT_DATABASE, login.default_database);
        data.set(attrs::DEFAULT_LANGUAGE, login.default_language);
    }
}

#[async_trait]
impl Resource for LoginResource {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Login
    }

    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    fn validate_attributes(&self, data: &ResourceData) -> ConnectorResult<()> {
        validate_sql_identifier(attrs::LOGIN_NAME, data.get_string(attrs::LOGIN_NAME))?;
        validate_password(attrs::PASSWORD, data.get_string(attrs::PASSWORD))?;
        if let Some(sid) = data.get_opt_string(attrs::SID) {
            validate_sid(attrs::SID, sid)?;
        }
        check_identifier(data, attrs::DEFAULT_DATABASE)?;
        check_identifier(data, attrs::DEFAULT_LANGUAGE)?;
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
        let login = NewLogin {
            login_name: login_name.clone(),
            password: SecretString::from(data.required_string(attrs::PASSWORD)?),
            sid: data.get_opt_string(attrs::SID).map(str::to_string),
            default_database: Some(
                data.get_opt_string(attrs::DEFAULT_DATABASE)
                    .unwrap_or(DEFAULT_LOGIN_DATABASE)
                    .to_string(),
            ),
            default_language: data.get_opt_string(attrs::DEFAULT_LANGUAGE).map(str::to_string),
        };

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        connector
            .create_login(&login)
            .await
            .map_err(|e| wrap("create", &format!("login [{login_name}]"), e))?;

        data.set_id(ExternalId::server_scoped(&endpoint, ObjectKind::Login, &login_name));
        info!("created login [{login_name}]");

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
            .get_login(&login_name)
            .await
            .map_err(|e| wrap("read", &format!("login [{login_name}]"), e))?;

        match login {
            Some(login) => Self::apply(data, login),
            None => {
                info!("no login found for [{login_name}]");
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
        let login_name = data.required_string(attrs::LOGIN_NAME)?;

        let pending = PendingChanges::capture(
            data,
            &[attrs::PASSWORD, attrs::DEFAULT_DATABASE, attrs::DEFAULT_LANGUAGE],
        );
        let changed = |name: &str| pending.contains(name).then(|| data.get_string(name).to_string());
        let changes = LoginChanges {
            password: changed(attrs::PASSWORD).map(SecretString::from),
            default_database: changed(attrs::DEFAULT_DATABASE).map(|db| {
                if db.is_empty() {
                    DEFAULT_LOGIN_DATABASE.to_string()
                } else {
                    db
                }
            }),
            default_language: changed(attrs::DEFAULT_LANGUAGE).filter(|l| !l.is_empty()),
        };

        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        if let Err(err) = connector.update_login(&login_name, &changes).await {
            pending.revert(data);
            return Err(wrap("update", &format!("login [{login_name}]"), err));
        }

        data.set_id(ExternalId::server_scoped(&endpoint, ObjectKind::Login, &login_name));
        info!("updated login [{login_name}]");

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
            .delete_login(&login_name)
            .await
            .map_err(|e| wrap("delete", &format!("login [{login_name}]"), e))?;

        data.clear_id();
        info!("deleted login [{login_name}]");
        Ok(())
    }

    #[instrument(skip_all, fields(id = ?data.id()))]
    async fn import(
        &self,
        ctx: &OperationContext,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let id = import_id(data, ObjectKind::Login)?;
        set_server_from_id(data, &id);
        data.set(attrs::LOGIN_NAME, id.key());

        let endpoint = self.shared.endpoint(data)?;
        let executor = factory.executor(&endpoint)?;
        let connector = SqlConnector::new(executor.as_ref(), ctx);
        let login = connector
            .get_login(id.key())
            .await
            .map_err(|e| wrap("import", &format!("login [{}]", id.key()), e))?
            .ok_or_else(|| ConnectorError::ObjectNotFound {
                identifier: format!("no login [{}] found for import", id.key()),
            })?;

        Self::apply(data, login);
        data.set_id(ExternalId::server_scoped(&endpoint, ObjectKind::Login, id.key()));
        Ok(())
    }
}
