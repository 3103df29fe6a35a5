//! Database roles.

use mssql_connector::error::ConnectorResult;
use mssql_connector::statement::{DynamicSql, Statement};

use super::SqlConnector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRole {
    pub database: String,
    pub role_name: String,
    pub role_id: i64,
    pub owner_name: String,
    pub owning_principal_id: i64,
}

impl SqlConnector<'_> {
    pub async fn get_database_role(&self, database: &str, role_name: &str) -> ConnectorResult<Option<DatabaseRole>> {
        let stmt = Statement::new(
            "SELECT r.[name], r.[principal_id], o.[name], r.[owning_principal_id] \
             FROM [sys].[database_principals] r \
             LEFT JOIN [sys].[database_principals] o ON o.[principal_id] = r.[owning_principal_id] \
             WHERE r.[type] = 'R' AND r.[name] = @P1",
        )
        .bind(role_name)
        .in_database(database);

        self.query_row(stmt, |row| {
            Ok(DatabaseRole {
                database: database.to_string(),
                role_name: row.text(0)?,
                role_id: row.int(1)?,
                owner_name: row.opt_text(2)?.unwrap_or_default(),
                owning_principal_id: row.opt_int(3)?.unwrap_or_default(),
            })
        })
        .await
    }

    pub async fn create_database_role(
        &self,
        database: &str,
        role_name: &str,
        owner_name: Option<&str>,
    ) -> ConnectorResult<()> {
        let mut sql = DynamicSql::new();
        sql.text("CREATE ROLE ").ident(role_name);
        if let Some(owner) = owner_name.filter(|o| !o.is_empty()) {
            sql.text(" AUTHORIZATION ").ident(owner);
        }
        self.exec(sql.into_statement(database)).await
    }

    pub async fn update_database_role_owner(
        &self,
        database: &str,
        role_name: &str,
        owner_name: &str,
    ) -> ConnectorResult<()> {
        let mut sql = DynamicSql::new();
        sql.text("ALTER AUTHORIZATION ON ROLE::")
            .ident(role_name)
            .text(" TO ")
            .ident(owner_name);
        self.exec(sql.into_statement(database)).await
    }

    pub async fn delete_database_role(&self, database: &str, role_name: &str) -> ConnectorResult<()> {
        let mut sql = DynamicSql::new();
        let name = sql.bind(role_name);
        sql.guard(format!(
            "EXISTS (SELECT 1 FROM [sys].[database_principals] WHERE [type] = 'R' AND [name] = {name})"
        ));
        sql.text("DROP ROLE ").ident(role_name);
        self.exec(sql.into_statement(database)).await
    }
}
