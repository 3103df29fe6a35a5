//! SQL authentication logins (`sys.sql_logins`).

use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use mssql_connector::error::ConnectorResult;
use mssql_connector::statement::{DynamicSql, Statement, DEFAULT_DATABASE};

use super::SqlConnector;

/// A SQL login as read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub login_name: String,
    pub principal_id: i64,
    /// Hex literal, e.g. `0x01A2...`.
    pub sid: String,
    pub default_database: String,
    pub default_language: String,
}

/// Desired state of a login to create.
#[derive(Debug, Clone)]
pub struct NewLogin {
    pub login_name: String,
    pub password: SecretString,
    /// Validated hex literal.
    pub sid: Option<String>,
    pub default_database: Option<String>,
    pub default_language: Option<String>,
}

/// Mutable login attributes that changed.
#[derive(Debug, Clone, Default)]
pub struct LoginChanges {
    pub password: Option<SecretString>,
    pub default_database: Option<String>,
    pub default_language: Option<String>,
}

impl LoginChanges {
    pub fn is_empty(&self) -> bool {
        self.password.is_none() && self.default_database.is_none() && self.default_language.is_none()
    }
}

impl SqlConnector<'_> {
    pub async fn get_login(&self, login_name: &str) -> ConnectorResult<Option<Login>> {
        let stmt = Statement::new(
            "SELECT [name], [principal_id], CONVERT(VARCHAR(1000), [sid], 1), [default_database_name], [default_language_name] \
             FROM [master].[sys].[sql_logins] WHERE [name] = @P1",
        )
        .bind(login_name);

        self.query_row(stmt, |row| {
            Ok(Login {
                login_name: row.text(0)?,
                principal_id: row.int(1)?,
                sid: row.text(2)?,
                default_database: row.opt_text(3)?.unwrap_or_default(),
                default_language: row.opt_text(4)?.unwrap_or_default(),
            })
        })
        .await
    }

    /// `CREATE LOGIN`. Default database and language are only applied on
    /// servers that support them (not Azure SQL Database).
    pub async fn create_login(&self, login: &NewLogin) -> ConnectorResult<()> {
        let azure = self.is_azure().await?;

        let mut sql = DynamicSql::new();
        sql.text("CREATE LOGIN ")
            .ident(&login.login_name)
            .text(" WITH PASSWORD = ")
            .literal(login.password.expose_secret());
        if let Some(sid) = login.sid.as_deref().filter(|s| !s.is_empty()) {
            sql.text(&format!(", SID = {sid}"));
        }
        if !azure {
            if let Some(database) = login.default_database.as_deref().filter(|s| !s.is_empty()) {
                sql.text(", DEFAULT_DATABASE = ").ident(database);
            }
            if let Some(language) = login.default_language.as_deref().filter(|s| !s.is_empty()) {
                sql.text(", DEFAULT_LANGUAGE = ").ident(language);
            }
        }
        self.exec(sql.into_statement(DEFAULT_DATABASE)).await
    }

    /// `ALTER LOGIN` for each changed attribute.
    pub async fn update_login(&self, login_name: &str, changes: &LoginChanges) -> ConnectorResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let azure = self.is_azure().await?;

        let mut sql = DynamicSql::new();
        if let Some(password) = &changes.password {
            sql.text("ALTER LOGIN ")
                .ident(login_name)
                .text(" WITH PASSWORD = ")
                .literal(password.expose_secret())
                .then();
        }
        if !azure {
            if let Some(database) = &changes.default_database {
                sql.text("ALTER LOGIN ")
                    .ident(login_name)
                    .text(" WITH DEFAULT_DATABASE = ")
                    .ident(database)
                    .then();
            }
            if let Some(language) = &changes.default_language {
                sql.text("ALTER LOGIN ")
                    .ident(login_name)
                    .text(" WITH DEFAULT_LANGUAGE = ")
                    .ident(language)
                    .then();
            }
        }
        self.exec(sql.into_statement(DEFAULT_DATABASE)).await
    }

    /// Kill the login's sessions, then drop it if it exists.
    pub async fn delete_login(&self, login_name: &str) -> ConnectorResult<()> {
        if let Err(err) = self.kill_sessions_for_login(login_name).await {
            warn!(login = login_name, error = %err, "Failed to kill sessions before dropping login");
        }
        self.exec(drop_login_statement(login_name)).await
    }
}

/// Guarded `DROP LOGIN` shared by SQL and Entra ID logins.
pub(crate) fn drop_login_statement(login_name: &str) -> Statement {
    let mut sql = DynamicSql::new();
    let name = sql.bind(login_name);
    sql.guard(format!(
        "EXISTS (SELECT 1 FROM [master].[sys].[server_principals] WHERE [name] = {name})"
    ));
    sql.text("DROP LOGIN ").ident(login_name);
    sql.into_statement(DEFAULT_DATABASE)
}
