//! # SQL Server connector framework
//!
//! Core abstractions for reconciling administrative SQL Server objects
//! (logins, credentials, external data sources, permissions, roles, schemas
//! and scripts) against a live server.
//!
//! This crate contains no network code. The live driver lives in
//! `mssql-connector-tds`, and the per-kind object connectors and the
//! orchestrator live in `mssql-resources`.
//!
//! ## Crate Organization
//!
//! - [`error`] - Error types with transient/terminal classification
//! - [`classify`] - Pluggable error classifier
//! - [`config`] - Server endpoint, authentication and connection settings
//! - [`context`] - Cancellation and deadlines for one operation
//! - [`ids`] - Object kinds and external identifiers
//! - [`operation`] - Attribute bag exchanged with the declarative framework
//! - [`schema`] - Per-kind attribute schema
//! - [`statement`] - Statements, bound parameters and dynamic SQL quoting
//! - [`row`] - Driver-independent result rows
//! - [`traits`] - Executor traits
//! - [`validate`] - Plan-time attribute validation

pub mod classify;
pub mod config;
pub mod context;
pub mod error;
pub mod ids;
pub mod operation;
pub mod row;
pub mod schema;
pub mod statement;
pub mod traits;
pub mod validate;

/// Prelude module for convenient imports.
///
/// ```
/// use mssql_connector::prelude::*;
/// ```
pub mod prelude {
    pub use crate::classify::{DefaultClassifier, ErrorClassifier};
    pub use crate::config::{AuthConfig, ConnectionSettings, ServerBlock, ServerEndpoint};
    pub use crate::context::OperationContext;
    pub use crate::error::{ConnectorError, ConnectorResult};
    pub use crate::ids::{ExternalId, ObjectKind};
    pub use crate::operation::{AttributeSet, AttributeValue};
    pub use crate::row::{SqlRow, SqlValue};
    pub use crate::schema::{AttributeDataType, ResourceSchema, SchemaAttribute};
    pub use crate::statement::{quote_literal, quote_name, DynamicSql, SqlParam, Statement};
    pub use crate::traits::{Executor, ExecutorExt, ExecutorFactory};
}

// Re-export async_trait for executor implementors
pub use async_trait::async_trait;
