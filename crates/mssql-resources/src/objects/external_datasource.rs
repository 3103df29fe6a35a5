//! External data sources, shared by the Azure and generic kinds.

use mssql_connector::error::ConnectorResult;
use mssql_connector::statement::{DynamicSql, Statement};

use super::SqlConnector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalDatasource {
    pub database: String,
    pub data_source_name: String,
    pub data_source_id: i64,
    pub location: String,
    pub type_desc: String,
    pub credential_name: Option<String>,
    pub credential_id: Option<i64>,
    pub remote_database_name: Option<String>,
}

/// Desired state of an external data source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewExternalDatasource {
    pub data_source_name: String,
    pub location: String,
    pub credential_name: Option<String>,
    /// Validated type keyword, e.g. `RDBMS`.
    pub type_desc: String,
    pub remote_database_name: Option<String>,
}

impl NewExternalDatasource {
    fn credential(&self) -> Option<&str> {
        self.credential_name.as_deref().filter(|c| !c.is_empty())
    }

    fn remote_database(&self) -> Option<&str> {
        self.remote_database_name.as_deref().filter(|d| !d.is_empty())
    }

    fn create_statement(&self, database: &str) -> Statement {
        let mut sql = DynamicSql::new();
        sql.text("CREATE EXTERNAL DATA SOURCE ")
            .ident(&self.data_source_name)
            .text(" WITH (LOCATION = ")
            .literal(&self.location);
        if let Some(credential) = self.credential() {
            sql.text(", CREDENTIAL = ").ident(credential);
        }
        sql.text(&format!(", TYPE = {}", self.type_desc));
        if let Some(remote) = self.remote_database() {
            sql.text(", DATABASE_NAME = ").literal(remote);
        }
        sql.text(")");
        sql.into_statement(database)
    }

    fn alter_statement(&self, database: &str) -> Statement {
        let mut sql = DynamicSql::new();
        sql.text("ALTER EXTERNAL DATA SOURCE ")
            .ident(&self.data_source_name)
            .text(" SET LOCATION = ")
            .literal(&self.location);
        if let Some(credential) = self.credential() {
            sql.text(", CREDENTIAL = ").ident(credential);
        }
        if let Some(remote) = self.remote_database() {
            sql.text(", DATABASE_NAME = ").literal(remote);
        }
        sql.into_statement(database)
    }
}

impl SqlConnector<'_> {
    pub async fn get_external_datasource(
        &self,
        database: &str,
        data_source_name: &str,
    ) -> ConnectorResult<Option<ExternalDatasource>> {
        let stmt = Statement::new(
            "SELECT eds.[name], eds.[data_source_id], eds.[location], eds.[type_desc], dsc.[name], eds.[credential_id], eds.[database_name] \
             FROM [sys].[external_data_sources] eds \
             LEFT JOIN [sys].[database_scoped_credentials] dsc ON dsc.[credential_id] = eds.[credential_id] \
             WHERE eds.[name] = @P1",
        )
        .bind(data_source_name)
        .in_database(database);

        self.query_row(stmt, |row| {
            Ok(ExternalDatasource {
                database: database.to_string(),
                data_source_name: row.text(0)?,
                data_source_id: row.int(1)?,
                location: row.text(2)?,
                type_desc: row.text(3)?,
                credential_name: row.opt_text(4)?,
                credential_id: row.opt_int(5)?.filter(|id| *id != 0),
                remote_database_name: row.opt_text(6)?.filter(|d| !d.is_empty()),
            })
        })
        .await
    }

    pub async fn create_external_datasource(
        &self,
        database: &str,
        datasource: &NewExternalDatasource,
    ) -> ConnectorResult<()> {
        self.exec(datasource.create_statement(database)).await
    }

    pub async fn update_external_datasource(
        &self,
        database: &str,
        datasource: &NewExternalDatasource,
    ) -> ConnectorResult<()> {
        self.exec(datasource.alter_statement(database)).await
    }

    pub async fn delete_external_datasource(&self, database: &str, data_source_name: &str) -> ConnectorResult<()> {
        let mut sql = DynamicSql::new();
        let name = sql.bind(data_source_name);
        sql.guard(format!(
            "EXISTS (SELECT 1 FROM [sys].[external_data_sources] WHERE [name] = {name})"
        ));
        sql.text("DROP EXTERNAL DATA SOURCE ").ident(data_source_name);
        self.exec(sql.into_statement(database)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rdbms() -> NewExternalDatasource {
        NewExternalDatasource {
            data_source_name: "remote".to_string(),
            location: "server.database.windows.net".to_string(),
            credential_name: Some("cred".to_string()),
            type_desc: "RDBMS".to_string(),
            remote_database_name: Some("sales".to_string()),
        }
    }

    #[test]
    fn test_create_statement_rdbms() {
        let stmt = rdbms().create_statement("app");
        let sql = stmt.sql();
        assert!(sql.contains("N', TYPE = RDBMS'"));
        assert!(sql.contains("N', DATABASE_NAME = '"));
        assert!(sql.contains("N')'"));
        assert_eq!(stmt.params().len(), 4);
        assert_eq!(stmt.database(), "app");
    }

    #[test]
    fn test_create_statement_blob_storage_without_remote_database() {
        let datasource = NewExternalDatasource {
            type_desc: "BLOB_STORAGE".to_string(),
            remote_database_name: Some(String::new()),
            ..rdbms()
        };
        let sql = datasource.create_statement("app").sql().to_string();
        assert!(!sql.contains("DATABASE_NAME"));
        assert!(sql.contains("BLOB_STORAGE"));
    }

    #[test]
    fn test_alter_statement_has_no_type() {
        let stmt = rdbms().alter_statement("app");
        assert!(stmt.sql().contains("N'ALTER EXTERNAL DATA SOURCE '"));
        assert!(!stmt.sql().contains("TYPE"));
    }
}
