//! # SQL Server object reconciliation
//!
//! Declarative management of administrative SQL Server objects: SQL and
//! Entra ID logins, database scoped credentials, external data sources,
//! database permissions, roles, schemas and ad-hoc scripts.
//!
//! ## Crate Organization
//!
//! - [`objects`] - Per-kind object connectors (statements and row mapping)
//! - [`resource`] - Per-kind resources, data sources and attribute data
//! - [`provider`] - Registry dispatching by object kind
//! - [`config`] - Provider configuration from the environment
//! - [`logging`] - `tracing` subscriber bootstrap
//!
//! ## Example
//!
//! ```ignore
//! use mssql_connector::prelude::*;
//! use mssql_resources::{Provider, ProviderConfig, ResourceData};
//!
//! let config = ProviderConfig::from_env()?;
//! mssql_resources::logging::init(&config.logging)?;
//!
//! let provider = Provider::from_config(&config);
//! let factory = provider.executor_factory();
//! let mut data = ResourceData::new(planned_attributes);
//! provider
//!     .create(&OperationContext::new(), ObjectKind::Login, &factory, &mut data)
//!     .await?;
//! ```

pub mod config;
pub mod logging;
pub mod objects;
pub mod provider;
pub mod resource;

pub use config::ProviderConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use provider::Provider;
pub use resource::{attrs, DataSource, PendingChanges, Resource, ResourceData, SharedConfig};
