//! Script resource: batch execution, lint, verification and import.

mod common;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use common::{init_test_logging, row, server_block, MockFactory};
use mssql_connector::prelude::*;
use mssql_resources::objects::SqlConnector;
use mssql_resources::{attrs, Provider, ResourceData, SharedConfig};

const SCRIPT: &str = "CREATE TABLE dbo.Orders (id int)\r\nGO\r\nINSERT INTO dbo.Orders VALUES (1)\r\ngo\r\nCREATE INDEX ix_orders ON dbo.Orders (id)\r\n";

fn provider() -> Provider {
    init_test_logging();
    Provider::new(SharedConfig::default(), ConnectionSettings::new())
}

fn ctx() -> OperationContext {
    OperationContext::new()
}

fn planned_script(script: &str, verify_object: &str) -> AttributeSet {
    AttributeSet::new()
        .with(attrs::SERVER, server_block())
        .with(attrs::DATABASE, "sales")
        .with(attrs::SQLSCRIPT, STANDARD.encode(script))
        .with(attrs::VERIFY_OBJECT, verify_object)
}

fn script_id(verify_object: &str) -> String {
    let key = URL_SAFE.encode(format!("sales:{verify_object}"));
    format!(
        "sqlserver://sql.example.test:1433/sales/sqlscript/{}",
        escape_key(&key)
    )
}

// `=` padding is the only character of a URL-safe key that needs escaping.
fn escape_key(key: &str) -> String {
    key.replace('=', "%3D")
}

fn table_exists(factory: &MockFactory) {
    factory
        .databases_exist()
        .on("[sys].[tables]", vec![row([SqlValue::Int(1)])]);
}

#[tokio::test]
async fn test_create_runs_batches_in_order_then_verifies() {
    let provider = provider();
    let factory = MockFactory::new();
    table_exists(&factory);

    let mut data = ResourceData::new(planned_script(SCRIPT, "TABLE dbo.Orders"));
    provider
        .create(&ctx(), ObjectKind::SqlScript, &factory, &mut data)
        .await
        .unwrap();

    let batches: Vec<SqlParam> = factory
        .matching("sp_executesql")
        .iter()
        .map(|s| s.params()[0].clone())
        .collect();
    assert_eq!(
        batches,
        vec![
            SqlParam::from("CREATE TABLE dbo.Orders (id int)"),
            SqlParam::from("INSERT INTO dbo.Orders VALUES (1)"),
            SqlParam::from("CREATE INDEX ix_orders ON dbo.Orders (id)"),
        ]
    );
    assert!(factory.statements().iter().all(|s| s.database() == "sales" || s.database() == "master"));
    assert_eq!(data.id(), Some(script_id("TABLE dbo.Orders").as_str()));
}

#[tokio::test]
async fn test_create_aborts_at_first_failing_batch() {
    let provider = provider();
    let factory = MockFactory::new();
    factory
        .once("sp_executesql", vec![])
        .fail("sp_executesql", "Invalid object name 'dbo.Orderz'.", Some(208));

    let mut data = ResourceData::new(planned_script(SCRIPT, "TABLE dbo.Orders"));
    let err = provider
        .create(&ctx(), ObjectKind::SqlScript, &factory, &mut data)
        .await
        .unwrap_err();

    assert_eq!(factory.matching("sp_executesql").len(), 2);
    assert!(err
        .chain_text()
        .contains("failed to execute batch: INSERT INTO dbo.Orders VALUES (1)"));
    assert_eq!(err.root_cause().sql_error_number(), Some(208));
    assert_eq!(data.id(), None);
}

#[tokio::test]
async fn test_lint_rejects_script_without_matching_object() {
    let provider = provider();
    let factory = MockFactory::new();

    let script = "CREATE TABLE TestTable (id int)";
    let mut data = ResourceData::new(planned_script(script, "TABLE OtherTable"));
    let err = provider
        .create(&ctx(), ObjectKind::SqlScript, &factory, &mut data)
        .await
        .unwrap_err();

    match err {
        ConnectorError::Validation(e) => {
            assert_eq!(e.field, "verify_object");
            assert_eq!(e.code, "no_matching_statement");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(factory.statements().is_empty());
}

#[tokio::test]
async fn test_lint_accepts_bracketed_names() {
    let provider = provider();
    let script = "CREATE OR ALTER PROCEDURE [dbo].[usp_refresh]\nAS\nBEGIN\n  SELECT 1\nEND";
    let data = ResourceData::new(planned_script(script, "PROC dbo.usp_refresh"));
    assert!(provider.validate(ObjectKind::SqlScript, &data).is_ok());
}

#[tokio::test]
async fn test_sqlscript_must_be_base64() {
    let provider = provider();
    let data = ResourceData::new(
        planned_script(SCRIPT, "TABLE dbo.Orders").with(attrs::SQLSCRIPT, "CREATE TABLE x"),
    );
    match provider.validate(ObjectKind::SqlScript, &data) {
        Err(ConnectorError::Validation(e)) => assert_eq!(e.code, "invalid_encoding"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_read_treats_missing_object_error_as_absent() {
    let provider = provider();
    let factory = MockFactory::new();
    factory
        .databases_exist()
        .fail("[sys].[tables]", "Invalid object name 'sys.tables'.", Some(208));

    let id = script_id("TABLE dbo.Orders");
    let mut data = ResourceData::from_state(&id, planned_script(SCRIPT, "TABLE dbo.Orders"));
    provider
        .read(&ctx(), ObjectKind::SqlScript, &factory, &mut data)
        .await
        .unwrap();

    assert_eq!(data.id(), None);
}

#[tokio::test]
async fn test_read_propagates_other_errors() {
    let provider = provider();
    let factory = MockFactory::new();
    factory.databases_exist().fail(
        "[sys].[tables]",
        "The SELECT permission was denied on the object 'tables'.",
        Some(229),
    );

    let id = script_id("TABLE dbo.Orders");
    let mut data = ResourceData::from_state(&id, planned_script(SCRIPT, "TABLE dbo.Orders"));
    let err = provider
        .read(&ctx(), ObjectKind::SqlScript, &factory, &mut data)
        .await
        .unwrap_err();

    assert_eq!(err.root_cause().sql_error_number(), Some(229));
    assert_eq!(data.id(), Some(id.as_str()));
}

#[tokio::test]
async fn test_read_with_missing_database_is_absent() {
    let provider = provider();
    let factory = MockFactory::new();

    let id = script_id("TABLE dbo.Orders");
    let mut data = ResourceData::from_state(&id, planned_script(SCRIPT, "TABLE dbo.Orders"));
    provider
        .read(&ctx(), ObjectKind::SqlScript, &factory, &mut data)
        .await
        .unwrap();

    assert_eq!(data.id(), None);
    assert!(factory.matching("[sys].[tables]").is_empty());
}

#[tokio::test]
async fn test_update_without_script_change_does_not_execute() {
    let provider = provider();
    let factory = MockFactory::new();
    table_exists(&factory);

    let state = planned_script(SCRIPT, "TABLE dbo.Orders");
    let id = script_id("TABLE dbo.Orders");
    let mut data = ResourceData::for_update(&id, state.clone(), state);
    provider
        .update(&ctx(), ObjectKind::SqlScript, &factory, &mut data)
        .await
        .unwrap();

    assert!(factory.matching("sp_executesql").is_empty());
    assert_eq!(data.id(), Some(id.as_str()));
}

#[tokio::test]
async fn test_failed_update_reverts_script() {
    let provider = provider();
    let factory = MockFactory::new();
    factory.fail("sp_executesql", "Incorrect syntax near 'TABLEE'.", Some(102));

    let prior = planned_script(SCRIPT, "TABLE dbo.Orders");
    let changed = format!("{SCRIPT}GO\nALTER TABLE dbo.Orders ADD total money\n");
    let planned = planned_script(&changed, "TABLE dbo.Orders");
    let id = script_id("TABLE dbo.Orders");
    let mut data = ResourceData::for_update(&id, prior, planned);

    assert!(provider
        .update(&ctx(), ObjectKind::SqlScript, &factory, &mut data)
        .await
        .is_err());
    assert_eq!(data.get_string(attrs::SQLSCRIPT), STANDARD.encode(SCRIPT));
}

#[tokio::test]
async fn test_delete_only_clears_state() {
    let provider = provider();
    let factory = MockFactory::new();

    let id = script_id("TABLE dbo.Orders");
    let mut data = ResourceData::from_state(&id, planned_script(SCRIPT, "TABLE dbo.Orders"));
    provider
        .delete(&ctx(), ObjectKind::SqlScript, &factory, &mut data)
        .await
        .unwrap();

    assert_eq!(data.id(), None);
    assert!(factory.statements().is_empty());
}

#[tokio::test]
async fn test_import_script() {
    let provider = provider();
    let factory = MockFactory::new();
    table_exists(&factory);

    let id = script_id("TABLE dbo.Orders");
    let data = provider
        .import(&ctx(), ObjectKind::SqlScript, &factory, &id, Some(server_block()))
        .await
        .unwrap();

    assert_eq!(data.id(), Some(id.as_str()));
    assert_eq!(data.get_string(attrs::DATABASE), "sales");
    assert_eq!(data.get_string(attrs::VERIFY_OBJECT), "TABLE dbo.Orders");
}

#[tokio::test]
async fn test_import_script_with_mismatched_database() {
    let provider = provider();
    let factory = MockFactory::new();

    let key = URL_SAFE.encode("hr:TABLE dbo.Orders");
    let id = format!(
        "sqlserver://sql.example.test:1433/sales/sqlscript/{}",
        escape_key(&key)
    );
    let err = provider
        .import(&ctx(), ObjectKind::SqlScript, &factory, &id, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectorError::InvalidIdentifier { .. }));
    assert!(factory.statements().is_empty());
}

#[tokio::test]
async fn test_import_script_with_unsupported_type() {
    let provider = provider();
    let factory = MockFactory::new();

    let key = URL_SAFE.encode("sales:INDEX ix_orders");
    let id = format!(
        "sqlserver://sql.example.test:1433/sales/sqlscript/{}",
        escape_key(&key)
    );
    let err = provider
        .import(&ctx(), ObjectKind::SqlScript, &factory, &id, None)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "unsupported object type: INDEX");
}

#[tokio::test]
async fn test_import_missing_script_object() {
    let provider = provider();
    let factory = MockFactory::new();
    factory.databases_exist();

    let id = script_id("VIEW dbo.v_orders");
    let err = provider
        .import(&ctx(), ObjectKind::SqlScript, &factory, &id, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectorError::ObjectNotFound { .. }));
}

fn executor(factory: &MockFactory) -> Box<dyn Executor> {
    let block: ServerBlock =
        serde_json::from_value(serde_json::Value::Object(server_block())).unwrap();
    let endpoint = ServerEndpoint::from_block(block, None).unwrap();
    factory.executor(&endpoint).unwrap()
}

#[tokio::test]
async fn test_select_script_runs_as_verification_query() {
    let factory = MockFactory::new();
    factory.on("FROM sys.tables", vec![row([SqlValue::Int(1)])]);
    let executor = executor(&factory);
    let ctx = ctx();
    let connector = SqlConnector::new(executor.as_ref(), &ctx);

    let count = connector
        .execute_script("sales", "  select 1 FROM sys.tables WHERE name = 'Orders'\n")
        .await
        .unwrap();

    assert_eq!(count, 1);
    let statements = factory.statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].sql(), "select 1 FROM sys.tables WHERE name = 'Orders'");
    assert_eq!(statements[0].database(), "sales");
    assert!(factory.matching("sp_executesql").is_empty());
}

#[tokio::test]
async fn test_select_script_without_rows_fails() {
    let factory = MockFactory::new();
    let executor = executor(&factory);
    let ctx = ctx();
    let connector = SqlConnector::new(executor.as_ref(), &ctx);

    let err = connector
        .execute_script("sales", "SELECT 1 FROM sys.tables WHERE name = 'Missing'")
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "no rows returned from verification query");
}
