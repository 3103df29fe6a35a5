//! Database permissions granted to a principal.

use std::collections::BTreeSet;

use mssql_connector::error::ConnectorResult;
use mssql_connector::statement::{DynamicSql, Statement};

use super::SqlConnector;

/// Granted implicitly to every user; never managed.
const CONNECT: &str = "CONNECT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabasePermissions {
    pub database: String,
    pub username: String,
    pub principal_id: i64,
    /// Sorted, without `CONNECT`.
    pub permissions: Vec<String>,
}

/// Permissions to grant and to revoke to go from `current` to `desired`.
pub fn permissions_diff(current: &[String], desired: &[String]) -> (Vec<String>, Vec<String>) {
    let current: BTreeSet<&str> = current.iter().map(String::as_str).filter(|p| *p != CONNECT).collect();
    let desired: BTreeSet<&str> = desired.iter().map(String::as_str).filter(|p| *p != CONNECT).collect();
    let grant = desired.difference(&current).map(|p| (*p).to_string()).collect();
    let revoke = current.difference(&desired).map(|p| (*p).to_string()).collect();
    (grant, revoke)
}

/// One `GRANT`/`REVOKE` command per permission. Permission names are
/// validated keywords.
fn permission_statement(database: &str, username: &str, grant: &[String], revoke: &[String]) -> Statement {
    let mut sql = DynamicSql::new();
    for permission in grant {
        sql.text(&format!("GRANT {permission} TO ")).ident(username).then();
    }
    for permission in revoke {
        sql.text(&format!("REVOKE {permission} FROM ")).ident(username).then();
    }
    sql.into_statement(database)
}

impl SqlConnector<'_> {
    pub async fn get_database_permissions(
        &self,
        database: &str,
        username: &str,
    ) -> ConnectorResult<Option<DatabasePermissions>> {
        let stmt = Statement::new(
            "SELECT DISTINCT pr.[principal_id], pr.[name], pe.[permission_name] \
             FROM [sys].[database_principals] AS pr \
             LEFT JOIN [sys].[database_permissions] AS pe ON pe.[grantee_principal_id] = pr.[principal_id] \
             WHERE pr.[name] = @P1",
        )
        .bind(username)
        .in_database(database);

        let rows = self
            .query_rows(stmt, |row| Ok((row.int(0)?, row.text(1)?, row.opt_text(2)?)))
            .await?;

        let Some((principal_id, name, _)) = rows.first().cloned() else {
            return Ok(None);
        };

        let permissions: BTreeSet<String> = rows
            .into_iter()
            .filter_map(|(_, _, permission)| permission)
            .filter(|p| p != CONNECT)
            .collect();

        Ok(Some(DatabasePermissions {
            database: database.to_string(),
            username: name,
            principal_id,
            permissions: permissions.into_iter().collect(),
        }))
    }

    pub async fn grant_database_permissions(
        &self,
        database: &str,
        username: &str,
        permissions: &[String],
    ) -> ConnectorResult<()> {
        let (grant, _) = permissions_diff(&[], permissions);
        if grant.is_empty() {
            return Ok(());
        }
        self.exec(permission_statement(database, username, &grant, &[])).await
    }

    /// Grant what was added and revoke what was removed.
    pub async fn update_database_permissions(
        &self,
        database: &str,
        username: &str,
        current: &[String],
        desired: &[String],
    ) -> ConnectorResult<()> {
        let (grant, revoke) = permissions_diff(current, desired);
        if grant.is_empty() && revoke.is_empty() {
            return Ok(());
        }
        self.exec(permission_statement(database, username, &grant, &revoke)).await
    }

    pub async fn revoke_database_permissions(
        &self,
        database: &str,
        username: &str,
        permissions: &[String],
    ) -> ConnectorResult<()> {
        let (_, revoke) = permissions_diff(permissions, &[]);
        if revoke.is_empty() {
            return Ok(());
        }
        self.exec(permission_statement(database, username, &[], &revoke)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn test_permissions_diff() {
        let (grant, revoke) = permissions_diff(
            &strings(&["SELECT", "INSERT", "CONNECT"]),
            &strings(&["SELECT", "UPDATE", "VIEW DEFINITION"]),
        );
        assert_eq!(grant, strings(&["UPDATE", "VIEW DEFINITION"]));
        assert_eq!(revoke, strings(&["INSERT"]));
    }

    #[test]
    fn test_connect_is_never_managed() {
        let (grant, revoke) = permissions_diff(&strings(&["CONNECT"]), &strings(&[]));
        assert!(grant.is_empty());
        assert!(revoke.is_empty());
    }

    #[test]
    fn test_permission_statement_commands() {
        let stmt = permission_statement("app", "reader", &strings(&["SELECT"]), &strings(&["DELETE"]));
        let sql = stmt.sql();
        assert!(sql.contains("N'GRANT SELECT TO ' + QUOTENAME(@P1)"));
        assert!(sql.contains("N'REVOKE DELETE FROM ' + QUOTENAME(@P2)"));
        assert_eq!(sql.matches("EXEC (@stmt)").count(), 2);
        assert_eq!(stmt.database(), "app");
    }
}
