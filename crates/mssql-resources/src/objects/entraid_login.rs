//! Microsoft Entra ID logins (`CREATE LOGIN ... FROM EXTERNAL PROVIDER`).

use tracing::warn;
use uuid::Uuid;

use mssql_connector::error::ConnectorResult;
use mssql_connector::statement::{DynamicSql, Statement, DEFAULT_DATABASE};

use super::login::drop_login_statement;
use super::{decode_hex, SqlConnector};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntraIdLogin {
    pub login_name: String,
    pub principal_id: i64,
    pub sid: String,
    /// Entra object id carried in the SID, when the SID is a GUID.
    pub object_id: Option<String>,
    pub default_database: String,
    pub default_language: String,
}

/// Entra object ids are stored in the SID as a little-endian GUID.
pub(crate) fn object_id_from_sid(sid: &str) -> Option<String> {
    let bytes: [u8; 16] = decode_hex(sid)?.try_into().ok()?;
    Some(Uuid::from_bytes_le(bytes).to_string())
}

impl SqlConnector<'_> {
    pub async fn get_entraid_login(&self, login_name: &str) -> ConnectorResult<Option<EntraIdLogin>> {
        let stmt = Statement::new(
            "SELECT [name], [default_database_name], [default_language_name], [principal_id], CONVERT(VARCHAR(85), [sid], 1) \
             FROM [master].[sys].[server_principals] WHERE [type] NOT IN ('G', 'R') AND [name] = @P1",
        )
        .bind(login_name);

        self.query_row(stmt, |row| {
            let sid = row.text(4)?;
            Ok(EntraIdLogin {
                login_name: row.text(0)?,
                default_database: row.opt_text(1)?.unwrap_or_default(),
                default_language: row.opt_text(2)?.unwrap_or_default(),
                principal_id: row.int(3)?,
                object_id: object_id_from_sid(&sid),
                sid,
            })
        })
        .await
    }

    /// Create a login from the external provider. `object_id` is only sent
    /// to Azure SQL, which supports `WITH OBJECT_ID`.
    pub async fn create_entraid_login(&self, login_name: &str, object_id: Option<&str>) -> ConnectorResult<()> {
        let object_id = object_id.filter(|id| !id.is_empty());
        let azure = match object_id {
            Some(_) => self.is_azure().await?,
            None => false,
        };

        let mut sql = DynamicSql::new();
        sql.text("CREATE LOGIN ")
            .ident(login_name)
            .text(" FROM EXTERNAL PROVIDER");
        if let (true, Some(object_id)) = (azure, object_id) {
            sql.text(" WITH OBJECT_ID = ").literal(object_id);
        }
        self.exec(sql.into_statement(DEFAULT_DATABASE)).await
    }

    /// Kill the login's sessions (best effort), then drop it if it exists.
    pub async fn delete_entraid_login(&self, login_name: &str) -> ConnectorResult<()> {
        if let Err(err) = self.kill_sessions_for_login(login_name).await {
            warn!(login = login_name, error = %err, "Failed to kill sessions before dropping Entra ID login");
        }
        self.exec(drop_login_statement(login_name)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_from_sid() {
        let object_id = Uuid::parse_str("3f2504e0-4f89-11d3-9a0c-0305e82c3301").unwrap();
        let sid: String = std::iter::once("0x".to_string())
            .chain(object_id.to_bytes_le().iter().map(|b| format!("{b:02X}")))
            .collect();
        assert_eq!(
            object_id_from_sid(&sid).as_deref(),
            Some("3f2504e0-4f89-11d3-9a0c-0305e82c3301")
        );
    }

    #[test]
    fn test_object_id_from_non_guid_sid() {
        assert_eq!(object_id_from_sid("0x0105000000000005"), None);
        assert_eq!(object_id_from_sid(""), None);
    }
}
