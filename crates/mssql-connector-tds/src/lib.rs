//! # SQL Server TDS connector
//!
//! Live implementation of [`mssql_connector::traits::Executor`] on top of
//! `tiberius`.
//!
//! ## Features
//!
//! - **SQL and Azure AD authentication**: username/password, service
//!   principal, managed identity and the default credential chain
//! - **Connect loop**: retries until the server accepts connections, failing
//!   fast on login errors
//! - **Scoped connections**: one connection per call, closed on every path
//! - **Gateway redirects**: follows the Azure SQL routing token once
//!
//! ## Example
//!
//! ```ignore
//! use mssql_connector::prelude::*;
//! use mssql_connector_tds::TdsExecutorFactory;
//!
//! let factory = TdsExecutorFactory::new(ConnectionSettings::new());
//! let executor = factory.executor(&endpoint)?;
//! let rows = executor
//!     .query(&ctx, &Statement::new("SELECT name FROM sys.databases"))
//!     .await?;
//! ```

pub mod auth;
mod error;
pub mod executor;
pub mod resolver;

pub use auth::{
    AccessToken, AzureEndpoints, ChainedCredential, ClientSecretCredential,
    ManagedIdentityCredential, TokenCache, TokenProvider,
};
pub use executor::{TdsExecutor, TdsExecutorFactory};
pub use resolver::connect_with_retry;
