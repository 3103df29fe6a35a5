//! Object kinds and their stable external identifiers.
//!
//! Identifiers have the shape
//! `sqlserver://<host>:<port>/[<database>/]<kind-path>/<key>` and are the
//! sole input to import. Path segments are percent-encoded so that every
//! valid SQL identifier (which may contain `#` or `@`) round-trips.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::config::ServerEndpoint;
use crate::error::{ConnectorError, ConnectorResult};

/// URI scheme written into identifiers.
pub const ID_SCHEME: &str = "sqlserver";

/// Alternative scheme accepted on import.
const ID_SCHEME_ALIAS: &str = "mssql";

/// Administrative object kinds managed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Login,
    EntraIdLogin,
    DatabaseCredential,
    AzureExternalDatasource,
    ExternalDatasource,
    DatabasePermissions,
    DatabaseRole,
    DatabaseSchema,
    SqlScript,
}

impl ObjectKind {
    /// All kinds, in registration order.
    pub const ALL: [ObjectKind; 9] = [
        ObjectKind::Login,
        ObjectKind::EntraIdLogin,
        ObjectKind::DatabaseCredential,
        ObjectKind::AzureExternalDatasource,
        ObjectKind::ExternalDatasource,
        ObjectKind::DatabasePermissions,
        ObjectKind::DatabaseRole,
        ObjectKind::DatabaseSchema,
        ObjectKind::SqlScript,
    ];

    /// Resource type name as exposed to the declarative framework.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Login => "mssql_login",
            ObjectKind::EntraIdLogin => "mssql_entraid_login",
            ObjectKind::DatabaseCredential => "mssql_database_credential",
            ObjectKind::AzureExternalDatasource => "mssql_azure_external_datasource",
            ObjectKind::ExternalDatasource => "mssql_external_datasource",
            ObjectKind::DatabasePermissions => "mssql_database_permissions",
            ObjectKind::DatabaseRole => "mssql_database_role",
            ObjectKind::DatabaseSchema => "mssql_database_schema",
            ObjectKind::SqlScript => "mssql_database_sqlscript",
        }
    }

    /// Parse a resource type name.
    pub fn parse_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Path segment naming the kind inside an identifier.
    ///
    /// Both login kinds share `login`, and both external data source kinds
    /// share `externaldatasource`: they address the same catalog rows.
    pub fn path_segment(&self) -> &'static str {
        match self {
            ObjectKind::Login | ObjectKind::EntraIdLogin => "login",
            ObjectKind::DatabaseCredential => "credential",
            ObjectKind::AzureExternalDatasource | ObjectKind::ExternalDatasource => {
                "externaldatasource"
            }
            ObjectKind::DatabasePermissions => "permission",
            ObjectKind::DatabaseRole => "role",
            ObjectKind::DatabaseSchema => "schema",
            ObjectKind::SqlScript => "sqlscript",
        }
    }

    /// Server-level kinds have no database segment.
    pub fn is_server_scoped(&self) -> bool {
        matches!(self, ObjectKind::Login | ObjectKind::EntraIdLogin)
    }

    /// Number of path segments an identifier of this kind must have.
    pub fn path_arity(&self) -> usize {
        if self.is_server_scoped() {
            2
        } else {
            3
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed or built external identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalId {
    kind: ObjectKind,
    host: String,
    port: u16,
    database: Option<String>,
    key: String,
}

impl ExternalId {
    /// Identifier of a server-level object (logins).
    pub fn server_scoped(endpoint: &ServerEndpoint, kind: ObjectKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            host: endpoint.host.clone(),
            port: endpoint.port,
            database: None,
            key: key.into(),
        }
    }

    /// Identifier of an object living inside `database`.
    pub fn database_scoped(
        endpoint: &ServerEndpoint,
        kind: ObjectKind,
        database: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            host: endpoint.host.clone(),
            port: endpoint.port,
            database: Some(database.into()),
            key: key.into(),
        }
    }

    /// Parse an identifier of the given kind.
    ///
    /// The path must have exactly [`ObjectKind::path_arity`] segments and the
    /// kind segment must match.
    pub fn parse(id: &str, kind: ObjectKind) -> ConnectorResult<Self> {
        let url = Url::parse(id).map_err(|e| ConnectorError::invalid_id(id, e.to_string()))?;

        if url.scheme() != ID_SCHEME && url.scheme() != ID_SCHEME_ALIAS {
            return Err(ConnectorError::invalid_id(
                id,
                format!("expected scheme '{ID_SCHEME}', got '{}'", url.scheme()),
            ));
        }

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(ConnectorError::invalid_id(id, "missing host")),
        };
        let port = url
            .port()
            .ok_or_else(|| ConnectorError::invalid_id(id, "missing port"))?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.collect())
            .unwrap_or_default();

        if segments.len() != kind.path_arity() || segments.iter().any(|s| s.is_empty()) {
            return Err(ConnectorError::invalid_id(
                id,
                format!(
                    "expected {} path segments for {kind}, got {}",
                    kind.path_arity(),
                    segments.len()
                ),
            ));
        }

        let decode = |segment: &str| -> ConnectorResult<String> {
            urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .map_err(|e| ConnectorError::invalid_id(id, e.to_string()))
        };

        let (database, kind_segment, key) = if kind.is_server_scoped() {
            (None, segments[0], segments[1])
        } else {
            (Some(decode(segments[0])?), segments[1], segments[2])
        };

        if kind_segment != kind.path_segment() {
            return Err(ConnectorError::invalid_id(
                id,
                format!(
                    "expected '{}' path segment, got '{kind_segment}'",
                    kind.path_segment()
                ),
            ));
        }

        Ok(Self {
            kind,
            host,
            port,
            database,
            key: decode(key)?,
        })
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Object key (decoded).
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ID_SCHEME}://{}:{}/", self.host, self.port)?;
        if let Some(database) = &self.database {
            write!(f, "{}/", urlencoding::encode(database))?;
        }
        write!(
            f,
            "{}/{}",
            self.kind.path_segment(),
            urlencoding::encode(&self.key)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    fn endpoint(host: &str, port: u16) -> ServerEndpoint {
        ServerEndpoint::new(host, port, AuthConfig::AzureDefault)
    }

    #[test]
    fn test_login_id_format() {
        let id = ExternalId::server_scoped(&endpoint("localhost", 1433), ObjectKind::Login, "app");
        assert_eq!(id.to_string(), "sqlserver://localhost:1433/login/app");
    }

    #[test]
    fn test_database_scoped_id_format() {
        let id = ExternalId::database_scoped(
            &endpoint("sql.example.com", 1433),
            ObjectKind::ExternalDatasource,
            "sales",
            "remote_ds",
        );
        assert_eq!(
            id.to_string(),
            "sqlserver://sql.example.com:1433/sales/externaldatasource/remote_ds"
        );
    }

    #[test]
    fn test_id_is_deterministic_and_injective() {
        let e = endpoint("db", 1433);
        let a = ExternalId::database_scoped(&e, ObjectKind::DatabaseRole, "db1", "reader");
        let b = ExternalId::database_scoped(&e, ObjectKind::DatabaseRole, "db1", "reader");
        assert_eq!(a.to_string(), b.to_string());

        let variants = [
            ExternalId::database_scoped(&e, ObjectKind::DatabaseRole, "db2", "reader"),
            ExternalId::database_scoped(&e, ObjectKind::DatabaseRole, "db1", "writer"),
            ExternalId::database_scoped(&endpoint("db", 1434), ObjectKind::DatabaseRole, "db1", "reader"),
            ExternalId::database_scoped(&endpoint("db2", 1433), ObjectKind::DatabaseRole, "db1", "reader"),
        ];
        for other in variants {
            assert_ne!(a.to_string(), other.to_string());
        }
    }

    #[test]
    fn test_special_characters_round_trip() {
        let e = endpoint("db", 1433);
        let id = ExternalId::database_scoped(&e, ObjectKind::DatabaseCredential, "my#db", "cred@x/y");
        let parsed = ExternalId::parse(&id.to_string(), ObjectKind::DatabaseCredential).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.database(), Some("my#db"));
        assert_eq!(parsed.key(), "cred@x/y");
    }

    #[test]
    fn test_parse_login_id() {
        let parsed = ExternalId::parse("sqlserver://localhost:1433/login/app", ObjectKind::EntraIdLogin).unwrap();
        assert_eq!(parsed.host(), "localhost");
        assert_eq!(parsed.port(), 1433);
        assert_eq!(parsed.database(), None);
        assert_eq!(parsed.key(), "app");
    }

    #[test]
    fn test_parse_accepts_mssql_scheme() {
        let parsed = ExternalId::parse("mssql://localhost:1433/login/app", ObjectKind::Login).unwrap();
        assert_eq!(parsed.to_string(), "sqlserver://localhost:1433/login/app");
    }

    #[test]
    fn test_parse_rejects_wrong_arity() {
        let cases = [
            ("sqlserver://localhost:1433/login", ObjectKind::Login),
            ("sqlserver://localhost:1433/master/login/app", ObjectKind::Login),
            ("sqlserver://localhost:1433/credential/c", ObjectKind::DatabaseCredential),
            ("sqlserver://localhost:1433/db/credential/c/extra", ObjectKind::DatabaseCredential),
            ("sqlserver://localhost:1433/db//c", ObjectKind::DatabaseCredential),
        ];
        for (id, kind) in cases {
            let err = ExternalId::parse(id, kind).unwrap_err();
            assert!(
                matches!(err, ConnectorError::InvalidIdentifier { .. }),
                "expected invalid ID for {id}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_wrong_kind_segment() {
        let err = ExternalId::parse("sqlserver://localhost:1433/db/role/r", ObjectKind::DatabaseSchema)
            .unwrap_err();
        assert!(err.to_string().contains("'schema'"));
    }

    #[test]
    fn test_parse_rejects_bad_scheme_and_missing_port() {
        assert!(ExternalId::parse("https://localhost:1433/login/app", ObjectKind::Login).is_err());
        assert!(ExternalId::parse("sqlserver://localhost/login/app", ObjectKind::Login).is_err());
        assert!(ExternalId::parse("not a uri", ObjectKind::Login).is_err());
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in ObjectKind::ALL {
            assert_eq!(ObjectKind::parse_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ObjectKind::parse_str("mssql_user"), None);
    }
}
