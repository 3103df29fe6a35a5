//! Database schemas.

use mssql_connector::error::ConnectorResult;
use mssql_connector::statement::{DynamicSql, Statement};

use super::SqlConnector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSchema {
    pub database: String,
    pub schema_name: String,
    pub schema_id: i64,
    pub owner_name: String,
    pub owning_principal_id: i64,
}

impl SqlConnector<'_> {
    pub async fn get_database_schema(&self, database: &str, schema_name: &str) -> ConnectorResult<Option<DatabaseSchema>> {
        let stmt = Statement::new(
            "SELECT s.[name], s.[schema_id], o.[name], s.[principal_id] \
             FROM [sys].[schemas] s \
             LEFT JOIN [sys].[database_principals] o ON o.[principal_id] = s.[principal_id] \
             WHERE s.[name] = @P1",
        )
        .bind(schema_name)
        .in_database(database);

        self.query_row(stmt, |row| {
            Ok(DatabaseSchema {
                database: database.to_string(),
                schema_name: row.text(0)?,
                schema_id: row.int(1)?,
                owner_name: row.opt_text(2)?.unwrap_or_default(),
                owning_principal_id: row.opt_int(3)?.unwrap_or_default(),
            })
        })
        .await
    }

    pub async fn create_database_schema(
        &self,
        database: &str,
        schema_name: &str,
        owner_name: Option<&str>,
    ) -> ConnectorResult<()> {
        let mut sql = DynamicSql::new();
        sql.text("CREATE SCHEMA ").ident(schema_name);
        if let Some(owner) = owner_name.filter(|o| !o.is_empty()) {
            sql.text(" AUTHORIZATION ").ident(owner);
        }
        self.exec(sql.into_statement(database)).await
    }

    pub async fn update_database_schema_owner(
        &self,
        database: &str,
        schema_name: &str,
        owner_name: &str,
    ) -> ConnectorResult<()> {
        let mut sql = DynamicSql::new();
        sql.text("ALTER AUTHORIZATION ON SCHEMA::")
            .ident(schema_name)
            .text(" TO ")
            .ident(owner_name);
        self.exec(sql.into_statement(database)).await
    }

    pub async fn delete_database_schema(&self, database: &str, schema_name: &str) -> ConnectorResult<()> {
        let mut sql = DynamicSql::new();
        let name = sql.bind(schema_name);
        sql.guard(format!("EXISTS (SELECT 1 FROM [sys].[schemas] WHERE [name] = {name})"));
        sql.text("DROP SCHEMA ").ident(schema_name);
        self.exec(sql.into_statement(database)).await
    }
}
