//! Database scoped credentials.

use secrecy::{ExposeSecret, SecretString};

use mssql_connector::error::ConnectorResult;
use mssql_connector::statement::{DynamicSql, Statement};

use super::SqlConnector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseCredential {
    pub database: String,
    pub credential_name: String,
    pub credential_id: i64,
    pub identity_name: String,
}

fn credential_statement(
    verb: &str,
    credential_name: &str,
    identity_name: &str,
    secret: Option<&SecretString>,
    database: &str,
) -> Statement {
    let mut sql = DynamicSql::new();
    sql.text(&format!("{verb} DATABASE SCOPED CREDENTIAL "))
        .ident(credential_name)
        .text(" WITH IDENTITY = ")
        .literal(identity_name);
    if let Some(secret) = secret.filter(|s| !s.expose_secret().is_empty()) {
        sql.text(", SECRET = ").literal(secret.expose_secret());
    }
    sql.into_statement(database)
}

impl SqlConnector<'_> {
    pub async fn get_database_credential(
        &self,
        database: &str,
        credential_name: &str,
    ) -> ConnectorResult<Option<DatabaseCredential>> {
        let stmt = Statement::new(
            "SELECT [name], [credential_id], [credential_identity] FROM [sys].[database_scoped_credentials] WHERE [name] = @P1",
        )
        .bind(credential_name)
        .in_database(database);

        self.query_row(stmt, |row| {
            Ok(DatabaseCredential {
                database: database.to_string(),
                credential_name: row.text(0)?,
                credential_id: row.int(1)?,
                identity_name: row.text(2)?,
            })
        })
        .await
    }

    pub async fn create_database_credential(
        &self,
        database: &str,
        credential_name: &str,
        identity_name: &str,
        secret: Option<&SecretString>,
    ) -> ConnectorResult<()> {
        self.exec(credential_statement("CREATE", credential_name, identity_name, secret, database))
            .await
    }

    pub async fn update_database_credential(
        &self,
        database: &str,
        credential_name: &str,
        identity_name: &str,
        secret: Option<&SecretString>,
    ) -> ConnectorResult<()> {
        self.exec(credential_statement("ALTER", credential_name, identity_name, secret, database))
            .await
    }

    pub async fn delete_database_credential(&self, database: &str, credential_name: &str) -> ConnectorResult<()> {
        let mut sql = DynamicSql::new();
        let name = sql.bind(credential_name);
        sql.guard(format!(
            "EXISTS (SELECT 1 FROM [sys].[database_scoped_credentials] WHERE [name] = {name})"
        ));
        sql.text("DROP DATABASE SCOPED CREDENTIAL ").ident(credential_name);
        self.exec(sql.into_statement(database)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mssql_connector::statement::SqlParam;

    #[test]
    fn test_credential_statement_without_secret() {
        let stmt = credential_statement("CREATE", "cred", "SHARED ACCESS SIGNATURE", None, "app");
        assert!(stmt.sql().contains("N'CREATE DATABASE SCOPED CREDENTIAL '"));
        assert!(!stmt.sql().contains("SECRET"));
        assert_eq!(stmt.params().len(), 2);
        assert_eq!(stmt.database(), "app");
    }

    #[test]
    fn test_credential_statement_with_secret() {
        let secret = SecretString::from("s3cr'et".to_string());
        let stmt = credential_statement("ALTER", "cred", "user", Some(&secret), "app");
        assert!(stmt.sql().contains("N', SECRET = '"));
        assert_eq!(stmt.params()[2], SqlParam::from("s3cr'et"));
    }
}
