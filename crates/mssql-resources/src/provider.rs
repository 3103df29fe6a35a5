//! Provider registry.
//!
//! Holds one [`Resource`] per object kind and the read-only data sources,
//! and dispatches every entry point by [`ObjectKind`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use mssql_connector::config::ConnectionSettings;
use mssql_connector::context::OperationContext;
use mssql_connector::error::{ConnectorError, ConnectorResult};
use mssql_connector::ids::ObjectKind;
use mssql_connector::schema::ResourceSchema;
use mssql_connector::traits::ExecutorFactory;
use mssql_connector_tds::TdsExecutorFactory;

use crate::config::ProviderConfig;
use crate::resource::{
    DataSource, DatabaseCredentialResource, DatabasePermissionsResource, DatabaseRoleResource,
    DatabaseSchemaResource, EntraIdLoginDataSource, EntraIdLoginResource,
    ExternalDatasourceDataSource, ExternalDatasourceResource, LoginResource, Resource,
    ResourceData, SharedConfig, SqlScriptResource,
};

pub struct Provider {
    shared: Arc<SharedConfig>,
    settings: ConnectionSettings,
    resources: HashMap<ObjectKind, Box<dyn Resource>>,
    data_sources: HashMap<ObjectKind, Box<dyn DataSource>>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.resources.keys().map(ObjectKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("Provider")
            .field("shared", &self.shared)
            .field("resources", &kinds)
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// Register every resource kind and data source.
    pub fn new(shared: SharedConfig, settings: ConnectionSettings) -> Self {
        let shared = Arc::new(shared);

        let resources: Vec<Box<dyn Resource>> = vec![
            Box::new(LoginResource::new(shared.clone())),
            Box::new(EntraIdLoginResource::new(shared.clone())),
            Box::new(DatabaseCredentialResource::new(shared.clone())),
            Box::new(ExternalDatasourceResource::azure(shared.clone())),
            Box::new(ExternalDatasourceResource::generic(shared.clone())),
            Box::new(DatabasePermissionsResource::new(shared.clone())),
            Box::new(DatabaseRoleResource::new(shared.clone())),
            Box::new(DatabaseSchemaResource::new(shared.clone())),
            Box::new(SqlScriptResource::new(shared.clone())),
        ];
        let data_sources: Vec<Box<dyn DataSource>> = vec![
            Box::new(EntraIdLoginDataSource::new(shared.clone())),
            Box::new(ExternalDatasourceDataSource::azure(shared.clone())),
            Box::new(ExternalDatasourceDataSource::generic(shared.clone())),
        ];

        Self {
            shared,
            settings,
            resources: resources.into_iter().map(|r| (r.kind(), r)).collect(),
            data_sources: data_sources.into_iter().map(|d| (d.kind(), d)).collect(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        let shared = SharedConfig {
            default_auth: config.default_auth.clone(),
            ..SharedConfig::default()
        };
        Self::new(shared, config.connection.clone())
    }

    /// Live executor factory using the provider's connection settings and
    /// classifier.
    pub fn executor_factory(&self) -> TdsExecutorFactory {
        TdsExecutorFactory::new(self.settings.clone()).with_classifier(self.shared.classifier.clone())
    }

    pub fn shared(&self) -> &SharedConfig {
        &self.shared
    }

    /// Registered resource kinds, in registration order.
    pub fn resource_kinds(&self) -> Vec<ObjectKind> {
        ObjectKind::ALL
            .into_iter()
            .filter(|kind| self.resources.contains_key(kind))
            .collect()
    }

    pub fn resource(&self, kind: ObjectKind) -> ConnectorResult<&dyn Resource> {
        self.resources
            .get(&kind)
            .map(|boxed| boxed.as_ref())
            .ok_or(ConnectorError::Unsupported {
                kind: kind.as_str(),
                operation: "resource",
            })
    }

    pub fn data_source(&self, kind: ObjectKind) -> ConnectorResult<&dyn DataSource> {
        self.data_sources
            .get(&kind)
            .map(|boxed| boxed.as_ref())
            .ok_or(ConnectorError::Unsupported {
                kind: kind.as_str(),
                operation: "lookup",
            })
    }

    pub fn schema(&self, kind: ObjectKind) -> ConnectorResult<&ResourceSchema> {
        Ok(self.resource(kind)?.schema())
    }

    /// Force-new attributes changed between the prior and planned state.
    pub fn replacement_attributes(&self, kind: ObjectKind, data: &ResourceData) -> ConnectorResult<Vec<String>> {
        Ok(self
            .schema(kind)?
            .replacement_attributes(data.prior(), data.attributes())
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Plan-time checks. Never contacts the server.
    pub fn validate(&self, kind: ObjectKind, data: &ResourceData) -> ConnectorResult<()> {
        let resource = self.resource(kind)?;
        resource.validate(data)?;
        debug!(kind = %kind, attributes = ?resource.schema().redact(data.attributes()), "Validated");
        Ok(())
    }

    #[instrument(skip(self, ctx, factory, data), fields(kind = %kind))]
    pub async fn create(
        &self,
        ctx: &OperationContext,
        kind: ObjectKind,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        self.validate(kind, data)?;
        ctx.check()?;
        self.resource(kind)?.create(ctx, factory, data).await
    }

    #[instrument(skip(self, ctx, factory, data), fields(kind = %kind))]
    pub async fn read(
        &self,
        ctx: &OperationContext,
        kind: ObjectKind,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        ctx.check()?;
        self.resource(kind)?.read(ctx, factory, data).await
    }

    /// In-place update. Changes to force-new attributes are rejected: the
    /// caller must delete and create instead.
    #[instrument(skip(self, ctx, factory, data), fields(kind = %kind))]
    pub async fn update(
        &self,
        ctx: &OperationContext,
        kind: ObjectKind,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        self.validate(kind, data)?;
        let replaced = self.replacement_attributes(kind, data)?;
        if !replaced.is_empty() {
            return Err(ConnectorError::invalid_configuration(format!(
                "changing {} requires replacing the {kind}",
                replaced.join(", ")
            )));
        }
        ctx.check()?;
        self.resource(kind)?.update(ctx, factory, data).await
    }

    #[instrument(skip(self, ctx, factory, data), fields(kind = %kind))]
    pub async fn delete(
        &self,
        ctx: &OperationContext,
        kind: ObjectKind,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        ctx.check()?;
        self.resource(kind)?.delete(ctx, factory, data).await
    }

    /// Import an existing object from its identifier. `server` may carry an
    /// auth sub-block; host and port always come from the identifier.
    #[instrument(skip(self, ctx, factory, server), fields(kind = %kind))]
    pub async fn import(
        &self,
        ctx: &OperationContext,
        kind: ObjectKind,
        factory: &dyn ExecutorFactory,
        id: &str,
        server: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> ConnectorResult<ResourceData> {
        ctx.check()?;
        let mut data = ResourceData::for_import(id);
        if let Some(server) = server {
            data.set(crate::resource::attrs::SERVER, server);
        }
        self.resource(kind)?.import(ctx, factory, &mut data).await?;
        info!("imported {kind} [{id}]");
        Ok(data)
    }

    /// Data source read; the identifier is set only when the object exists.
    #[instrument(skip(self, ctx, factory, data), fields(kind = %kind))]
    pub async fn lookup(
        &self,
        ctx: &OperationContext,
        kind: ObjectKind,
        factory: &dyn ExecutorFactory,
        data: &mut ResourceData,
    ) -> ConnectorResult<()> {
        let source = self.data_source(kind)?;
        source.schema().check(data.attributes())?;
        ctx.check()?;
        source.read(ctx, factory, data).await
    }
}
