//! Ad-hoc SQL scripts verified by the existence of one object they create.

use std::fmt;

use tracing::{debug, info};

use mssql_connector::classify::ErrorClassifier;
use mssql_connector::error::{ConnectorError, ConnectorResult};
use mssql_connector::statement::Statement;
use mssql_connector::validate::ValidationError;

use super::SqlConnector;

const BATCH_PREVIEW_CHARS: usize = 100;

/// Split a script into batches on `GO` separator lines.
///
/// A line whose trimmed, uppercased text starts with `GO` ends the current
/// batch. Empty batches are dropped. The split is line based, so a line
/// starting with e.g. `GOTO` also separates batches.
pub fn split_batches(script: &str) -> Vec<String> {
    let script = script.replace("\r\n", "\n");
    let mut batches = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    let mut flush = |current: &mut Vec<&str>| {
        let batch = current.join("\n");
        let batch = batch.trim();
        if !batch.is_empty() {
            batches.push(batch.to_string());
        }
        current.clear();
    };

    for line in script.split('\n') {
        if line.trim().to_uppercase().starts_with("GO") {
            flush(&mut current);
        } else {
            current.push(line);
        }
    }
    flush(&mut current);

    batches
}

fn preview(batch: &str) -> String {
    if batch.chars().count() <= BATCH_PREVIEW_CHARS {
        return batch.to_string();
    }
    let head: String = batch.chars().take(BATCH_PREVIEW_CHARS).collect();
    format!("{head}...")
}

/// Object kinds a script can be verified by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyObjectType {
    Table,
    View,
    Procedure,
    Function,
    Schema,
    Trigger,
}

impl VerifyObjectType {
    /// Parse a type keyword, accepting the `PROC`, `FUNC` and `TRG` aliases.
    pub fn parse(value: &str) -> ConnectorResult<Self> {
        match value.to_uppercase().as_str() {
            "TABLE" => Ok(Self::Table),
            "VIEW" => Ok(Self::View),
            "PROCEDURE" | "PROC" => Ok(Self::Procedure),
            "FUNCTION" | "FUNC" => Ok(Self::Function),
            "SCHEMA" => Ok(Self::Schema),
            "TRIGGER" | "TRG" => Ok(Self::Trigger),
            _ => Err(ConnectorError::UnsupportedObjectType {
                object_type: value.to_uppercase(),
            }),
        }
    }

    /// Keywords that may follow `CREATE` for this type.
    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Table => &["table"],
            Self::View => &["view"],
            Self::Procedure => &["procedure", "proc"],
            Self::Function => &["function"],
            Self::Schema => &["schema"],
            Self::Trigger => &["trigger"],
        }
    }

    /// Catalog view and extra predicate used by the existence query.
    fn catalog(&self) -> (&'static str, &'static str) {
        match self {
            Self::Table => ("[sys].[tables]", ""),
            Self::View => ("[sys].[views]", ""),
            Self::Procedure => ("[sys].[procedures]", ""),
            Self::Function => ("[sys].[objects]", " AND o.[type] IN ('FN', 'IF', 'TF')"),
            Self::Schema => ("[sys].[schemas]", ""),
            Self::Trigger => ("[sys].[triggers]", ""),
        }
    }

    /// Join reaching `[sys].[schemas]` as `s` from the catalog row `o`.
    ///
    /// `sys.triggers` has no `schema_id`; a DML trigger takes the schema of
    /// its parent object.
    fn schema_join(&self) -> &'static str {
        match self {
            Self::Trigger => {
                "INNER JOIN [sys].[objects] p ON o.[parent_id] = p.[object_id] INNER JOIN [sys].[schemas] s ON p.[schema_id] = s.[schema_id]"
            }
            _ => "INNER JOIN [sys].[schemas] s ON o.[schema_id] = s.[schema_id]",
        }
    }
}

/// Parsed `verify_object` descriptor: `TYPE NAME`, where the name may be
/// schema-qualified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyObject {
    pub object_type: VerifyObjectType,
    /// Type keyword as written, uppercased.
    pub type_name: String,
    pub schema: Option<String>,
    pub name: String,
    raw_name: String,
}

impl VerifyObject {
    pub fn parse(value: &str) -> ConnectorResult<Self> {
        let parts: Vec<&str> = value.split_whitespace().collect();
        let [type_part, name_part] = parts.as_slice() else {
            return Err(ConnectorError::invalid_configuration(format!(
                "verify_object must be in format 'TYPE NAME', got: {value}"
            )));
        };

        let object_type = VerifyObjectType::parse(type_part)?;
        let (schema, name) = match name_part.split('.').collect::<Vec<_>>().as_slice() {
            [schema, name] => (Some((*schema).to_string()), (*name).to_string()),
            _ => (None, (*name_part).to_string()),
        };

        Ok(Self {
            object_type,
            type_name: type_part.to_uppercase(),
            schema: schema.filter(|_| object_type != VerifyObjectType::Schema),
            name,
            raw_name: (*name_part).to_string(),
        })
    }

    /// Parameterized existence query; one row when the object exists.
    pub fn existence_statement(&self, database: &str) -> Statement {
        let (view, predicate) = self.object_type.catalog();
        let join = self.object_type.schema_join();
        let stmt = match (&self.object_type, &self.schema) {
            (VerifyObjectType::Schema, _) => {
                Statement::new("SELECT 1 FROM [sys].[schemas] s WHERE s.[name] = @P1").bind(&self.name)
            }
            (_, Some(schema)) => Statement::new(format!(
                "SELECT 1 FROM {view} o {join} WHERE o.[name] = @P1 AND s.[name] = @P2{predicate}"
            ))
            .bind(&self.name)
            .bind(schema),
            (_, None) => Statement::new(format!("SELECT 1 FROM {view} o WHERE o.[name] = @P1{predicate}"))
                .bind(&self.name),
        };
        stmt.in_database(database)
    }

    /// Name spellings accepted after `CREATE <type>`, lowercased.
    fn name_forms(&self) -> Vec<String> {
        let name = self.raw_name.to_lowercase();
        let mut forms = vec![
            name.clone(),
            format!("'{name}'"),
            format!("\"{name}\""),
            format!("[{name}]"),
        ];
        if name.contains('.') {
            let bracketed: Vec<String> = name.split('.').map(|part| format!("[{part}]")).collect();
            forms.push(bracketed.join("."));
        }
        forms
    }
}

impl fmt::Display for VerifyObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.type_name, self.raw_name)
    }
}

/// Check that `script` creates or alters the object named by `verify_object`.
///
/// The script is lowercased with whitespace collapsed, then searched for
/// `create|alter|create or alter <type> <name>`.
pub fn lint_verify_object(script: &str, verify_object: &str) -> Result<(), ValidationError> {
    let object = VerifyObject::parse(verify_object).map_err(|e| {
        let code = match e {
            ConnectorError::UnsupportedObjectType { .. } => "unsupported_object_type",
            _ => "invalid_format",
        };
        ValidationError::new("verify_object", code, e.to_string())
    })?;

    let normalized = script
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let forms = object.name_forms();
    let found = ["create", "alter", "create or alter"].iter().any(|verb| {
        object.object_type.keywords().iter().any(|keyword| {
            forms
                .iter()
                .any(|form| normalized.contains(&format!("{verb} {keyword} {form}")))
        })
    });

    if found {
        return Ok(());
    }
    Err(ValidationError::new(
        "verify_object",
        "no_matching_statement",
        format!(
            "verify_object '{object}' is specified but no matching 'CREATE', 'ALTER', or 'CREATE OR ALTER' statement for this object was found in the script"
        ),
    ))
}

/// Outcome of reading a script resource: the verification object exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlScriptOutcome {
    pub database: String,
    pub verify_object: String,
}

impl SqlConnector<'_> {
    /// Run every batch in order through `sp_executesql`, stopping at the
    /// first failure. Earlier batches are not rolled back.
    ///
    /// A script starting with `SELECT` is a verification query instead: it
    /// runs once and must return a row.
    pub async fn execute_script(&self, database: &str, script: &str) -> ConnectorResult<usize> {
        if script.trim_start().to_uppercase().starts_with("SELECT") {
            debug!(database, "Running verification query");
            let stmt = Statement::new(script.trim()).in_database(database);
            return match self.query_row(stmt, |_| Ok(())).await? {
                Some(()) => Ok(1),
                None => Err(ConnectorError::operation_failed(
                    "no rows returned from verification query",
                )),
            };
        }

        let batches = split_batches(script);
        for (index, batch) in batches.iter().enumerate() {
            debug!(database, batch = index + 1, total = batches.len(), "Executing script batch");
            let stmt = Statement::new("EXEC sp_executesql @P1")
                .bind(batch.as_str())
                .in_database(database);
            if let Err(err) = self.exec(stmt).await {
                return Err(ConnectorError::operation_failed_with_source(
                    format!("failed to execute batch: {}", preview(batch)),
                    err,
                ));
            }
        }
        Ok(batches.len())
    }

    /// Whether the verification object exists. Missing database, no row and
    /// errors classified as "object missing" all mean absent.
    pub async fn get_sqlscript_outcome(
        &self,
        database: &str,
        object: &VerifyObject,
        classifier: &dyn ErrorClassifier,
    ) -> ConnectorResult<Option<SqlScriptOutcome>> {
        if !self.database_exists(database).await? {
            info!(database, "Database does not exist");
            return Ok(None);
        }

        match self.query_row(object.existence_statement(database), |_| Ok(())).await {
            Ok(Some(())) => Ok(Some(SqlScriptOutcome {
                database: database.to_string(),
                verify_object: object.to_string(),
            })),
            Ok(None) => Ok(None),
            Err(err) if classifier.is_missing_object(&err) => {
                debug!(database, error = %err, "Verification query reports missing object");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mssql_connector::statement::SqlParam;

    #[test]
    fn test_split_batches_on_go_lines() {
        let script = "CREATE TABLE a (id int)\r\nGO\r\nCREATE TABLE b (id int)\n  go  \n\nGO 2\nSELECT 1\n";
        assert_eq!(
            split_batches(script),
            vec!["CREATE TABLE a (id int)", "CREATE TABLE b (id int)", "SELECT 1"]
        );
    }

    #[test]
    fn test_split_batches_drops_empty_batches() {
        assert!(split_batches("GO\n\nGO\n").is_empty());
        assert_eq!(split_batches("SELECT 1"), vec!["SELECT 1"]);
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(150);
        let shown = preview(&long);
        assert_eq!(shown.len(), 103);
        assert!(shown.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_verify_object_parse() {
        let object = VerifyObject::parse("table dbo.Users").unwrap();
        assert_eq!(object.object_type, VerifyObjectType::Table);
        assert_eq!(object.schema.as_deref(), Some("dbo"));
        assert_eq!(object.name, "Users");
        assert_eq!(object.to_string(), "TABLE dbo.Users");

        let object = VerifyObject::parse("PROC usp_load").unwrap();
        assert_eq!(object.object_type, VerifyObjectType::Procedure);
        assert_eq!(object.schema, None);
    }

    #[test]
    fn test_verify_object_parse_errors() {
        let err = VerifyObject::parse("SEQUENCE seq").unwrap_err();
        assert_eq!(err.to_string(), "unsupported object type: SEQUENCE");

        let err = VerifyObject::parse("TABLE").unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_existence_statement_schema_qualified() {
        let stmt = VerifyObject::parse("FUNCTION dbo.fn_total").unwrap().existence_statement("app");
        assert!(stmt.sql().contains("[sys].[objects]"));
        assert!(stmt.sql().contains("o.[type] IN ('FN', 'IF', 'TF')"));
        assert!(stmt.sql().contains("s.[name] = @P2"));
        assert_eq!(stmt.params().len(), 2);
        assert_eq!(stmt.database(), "app");
    }

    #[test]
    fn test_existence_statement_per_kind() {
        let cases = [
            ("TABLE dbo.Orders", "FROM [sys].[tables] o INNER JOIN [sys].[schemas] s ON o.[schema_id] = s.[schema_id]"),
            ("VIEW dbo.v_orders", "FROM [sys].[views] o INNER JOIN [sys].[schemas] s ON o.[schema_id] = s.[schema_id]"),
            ("PROC dbo.usp_load", "FROM [sys].[procedures] o INNER JOIN [sys].[schemas] s ON o.[schema_id] = s.[schema_id]"),
            ("FUNC dbo.fn_total", "FROM [sys].[objects] o INNER JOIN [sys].[schemas] s ON o.[schema_id] = s.[schema_id]"),
            ("TABLE Orders", "FROM [sys].[tables] o WHERE o.[name] = @P1"),
            ("VIEW v_orders", "FROM [sys].[views] o WHERE o.[name] = @P1"),
            ("PROCEDURE usp_load", "FROM [sys].[procedures] o WHERE o.[name] = @P1"),
            ("FUNCTION fn_total", "FROM [sys].[objects] o WHERE o.[name] = @P1 AND o.[type] IN"),
        ];
        for (verify_object, expected) in cases {
            let stmt = VerifyObject::parse(verify_object).unwrap().existence_statement("app");
            assert!(stmt.sql().contains(expected), "{verify_object}: {}", stmt.sql());
        }
    }

    #[test]
    fn test_existence_statement_trigger_joins_parent_schema() {
        let stmt = VerifyObject::parse("TRIGGER dbo.trg_audit").unwrap().existence_statement("app");
        assert!(stmt.sql().contains(
            "FROM [sys].[triggers] o INNER JOIN [sys].[objects] p ON o.[parent_id] = p.[object_id] INNER JOIN [sys].[schemas] s ON p.[schema_id] = s.[schema_id]"
        ));
        assert!(!stmt.sql().contains("o.[schema_id]"));
        assert_eq!(
            stmt.params(),
            &[SqlParam::from("trg_audit"), SqlParam::from("dbo")]
        );

        let stmt = VerifyObject::parse("TRG trg_ddl_log").unwrap().existence_statement("app");
        assert_eq!(
            stmt.sql(),
            "SELECT 1 FROM [sys].[triggers] o WHERE o.[name] = @P1"
        );
        assert_eq!(stmt.params(), &[SqlParam::from("trg_ddl_log")]);
    }

    #[test]
    fn test_existence_statement_schema_kind() {
        let stmt = VerifyObject::parse("SCHEMA reporting").unwrap().existence_statement("app");
        assert!(stmt.sql().contains("FROM [sys].[schemas] s WHERE s.[name] = @P1"));
        assert_eq!(stmt.params().len(), 1);
    }

    #[test]
    fn test_lint_accepts_name_forms() {
        assert!(lint_verify_object("CREATE TABLE TestTable (id INT)", "TABLE TestTable").is_ok());
        assert!(lint_verify_object("create   table\n[TestTable] (id int)", "TABLE TestTable").is_ok());
        assert!(lint_verify_object("CREATE OR ALTER VIEW \"v_users\" AS SELECT 1", "VIEW v_users").is_ok());
        assert!(lint_verify_object("ALTER PROCEDURE dbo.usp_x AS SELECT 1", "PROC dbo.usp_x").is_ok());
        assert!(lint_verify_object("CREATE PROC [dbo].[usp_x] AS SELECT 1", "PROCEDURE dbo.usp_x").is_ok());
    }

    #[test]
    fn test_lint_rejects_other_object() {
        let err = lint_verify_object("CREATE TABLE TestTable (id INT)", "TABLE OtherTable").unwrap_err();
        assert_eq!(err.code, "no_matching_statement");
        assert!(err.message.contains("verify_object 'TABLE OtherTable' is specified"));
    }

    #[test]
    fn test_lint_rejects_unsupported_type() {
        let err = lint_verify_object("CREATE SEQUENCE s", "SEQUENCE s").unwrap_err();
        assert_eq!(err.code, "unsupported_object_type");
    }
}
