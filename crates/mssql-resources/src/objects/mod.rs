//! Object connectors.
//!
//! [`SqlConnector`] borrows an executor and the operation context for the
//! duration of one reconciliation call. Each submodule adds the Read,
//! Create, Update and Delete operations of one object kind as inherent
//! methods. Reads return `Ok(None)` when the object does not exist.

mod credential;
mod entraid_login;
mod external_datasource;
mod login;
mod permissions;
mod role;
mod schema;
mod sqlscript;

pub use credential::DatabaseCredential;
pub use entraid_login::EntraIdLogin;
pub use external_datasource::{ExternalDatasource, NewExternalDatasource};
pub use login::{Login, LoginChanges, NewLogin};
pub use permissions::{permissions_diff, DatabasePermissions};
pub use role::DatabaseRole;
pub use schema::DatabaseSchema;
pub use sqlscript::{
    lint_verify_object, split_batches, SqlScriptOutcome, VerifyObject, VerifyObjectType,
};

use tracing::debug;

use mssql_connector::context::OperationContext;
use mssql_connector::error::ConnectorResult;
use mssql_connector::statement::Statement;
use mssql_connector::traits::{Executor, ExecutorExt};

/// Substring of `@@VERSION` on Azure SQL Database.
pub const AZURE_VERSION_MARKER: &str = "Microsoft SQL Azure";

/// Object connector over one executor.
pub struct SqlConnector<'a> {
    executor: &'a dyn Executor,
    ctx: &'a OperationContext,
}

impl<'a> SqlConnector<'a> {
    pub fn new(executor: &'a dyn Executor, ctx: &'a OperationContext) -> Self {
        Self { executor, ctx }
    }

    pub(crate) async fn exec(&self, stmt: Statement) -> ConnectorResult<()> {
        debug!(database = stmt.database(), sql = stmt.sql(), "Executing statement");
        self.executor.exec(self.ctx, &stmt).await
    }

    pub(crate) async fn query_row<T, F>(&self, stmt: Statement, handler: F) -> ConnectorResult<Option<T>>
    where
        T: Send,
        F: FnMut(&mssql_connector::row::SqlRow) -> ConnectorResult<T> + Send,
    {
        debug!(database = stmt.database(), sql = stmt.sql(), "Querying row");
        self.executor.query_row(self.ctx, &stmt, handler).await
    }

    pub(crate) async fn query_rows<T, F>(&self, stmt: Statement, handler: F) -> ConnectorResult<Vec<T>>
    where
        T: Send,
        F: FnMut(&mssql_connector::row::SqlRow) -> ConnectorResult<T> + Send,
    {
        debug!(database = stmt.database(), sql = stmt.sql(), "Querying rows");
        self.executor.query_rows(self.ctx, &stmt, handler).await
    }

    /// Whether `database` exists on the server.
    pub async fn database_exists(&self, database: &str) -> ConnectorResult<bool> {
        let stmt = Statement::new("SELECT COUNT(1) FROM [sys].[databases] WHERE [name] = @P1")
            .bind(database);
        let count = self.query_row(stmt, |row| row.int(0)).await?;
        Ok(count.unwrap_or(0) > 0)
    }

    /// `@@VERSION` of the server; empty when the server returns no row.
    pub async fn server_version(&self) -> ConnectorResult<String> {
        let version = self
            .query_row(Statement::new("SELECT @@VERSION"), |row| row.text(0))
            .await?;
        Ok(version.unwrap_or_default())
    }

    /// Whether the server is Azure SQL Database.
    pub async fn is_azure(&self) -> ConnectorResult<bool> {
        Ok(self.server_version().await?.contains(AZURE_VERSION_MARKER))
    }

    /// Kill every session of `login_name`. Used before dropping a login.
    pub(crate) async fn kill_sessions_for_login(&self, login_name: &str) -> ConnectorResult<()> {
        let stmt = Statement::new(
            "DECLARE @kill nvarchar(max) = N''
SELECT @kill = @kill + N'KILL ' + CONVERT(nvarchar(11), [session_id]) + N';'
FROM [sys].[dm_exec_sessions]
WHERE [login_name] = @P1 AND [session_id] <> @@SPID
EXEC (@kill)",
        )
        .bind(login_name);
        self.exec(stmt).await
    }
}

/// Decode a `0x`-prefixed hex string.
pub(crate) fn decode_hex(value: &str) -> Option<Vec<u8>> {
    let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"))?;
    if digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("0x0A1b"), Some(vec![0x0a, 0x1b]));
        assert_eq!(decode_hex("0x"), Some(vec![]));
        assert_eq!(decode_hex("0xABC"), None);
        assert_eq!(decode_hex("ABCD"), None);
        assert_eq!(decode_hex("0xZZ"), None);
    }
}
