//! Common test utilities for mssql-resources integration tests.
//!
//! `MockFactory` hands out executors sharing one scripted state: every
//! statement is recorded, and replies are chosen by the first rule whose
//! pattern occurs in the SQL text. Statements matching no rule succeed
//! (`exec`) or return no rows (`query`).

#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use mssql_connector::config::ServerEndpoint;
use mssql_connector::context::OperationContext;
use mssql_connector::error::{ConnectorError, ConnectorResult};
use mssql_connector::row::{SqlRow, SqlValue};
use mssql_connector::statement::Statement;
use mssql_connector::traits::{Executor, ExecutorFactory};

pub const AZURE_VERSION: &str =
    "Microsoft SQL Azure (RTM) - 12.0.2000.8 \n\tCopyright (C) 2022 Microsoft Corporation";
pub const ONPREM_VERSION: &str =
    "Microsoft SQL Server 2022 (RTM) - 16.0.1000.6 (X64) \n\tDeveloper Edition (64-bit)";

#[derive(Debug, Clone)]
pub enum Reply {
    Rows(Vec<SqlRow>),
    Error { message: String, code: Option<u32> },
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    reply: Reply,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct MockState {
    rules: Vec<Rule>,
    statements: Vec<Statement>,
    endpoints: Vec<ServerEndpoint>,
}

impl MockState {
    fn reply_for(&mut self, stmt: &Statement) -> Option<Reply> {
        self.statements.push(stmt.clone());
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.remaining != Some(0) && stmt.sql().contains(&r.pattern))?;
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(rule.reply.clone())
    }
}

fn into_result(reply: Option<Reply>) -> ConnectorResult<Vec<SqlRow>> {
    match reply {
        None => Ok(Vec::new()),
        Some(Reply::Rows(rows)) => Ok(rows),
        Some(Reply::Error { message, code: Some(code) }) => {
            Err(ConnectorError::database_with_code(message, code))
        }
        Some(Reply::Error { message, code: None }) => Err(ConnectorError::database(message)),
    }
}

/// Scripted executor.
#[derive(Debug, Clone)]
pub struct MockExecutor {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl Executor for MockExecutor {
    async fn exec(&self, ctx: &OperationContext, stmt: &Statement) -> ConnectorResult<()> {
        ctx.check()?;
        let reply = self.state.lock().unwrap().reply_for(stmt);
        into_result(reply).map(|_| ())
    }

    async fn query(&self, ctx: &OperationContext, stmt: &Statement) -> ConnectorResult<Vec<SqlRow>> {
        ctx.check()?;
        let reply = self.state.lock().unwrap().reply_for(stmt);
        into_result(reply)
    }
}

/// Factory handing out [`MockExecutor`]s over shared state.
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, pattern: &str, reply: Reply, remaining: Option<usize>) {
        self.state.lock().unwrap().rules.push(Rule {
            pattern: pattern.to_string(),
            reply,
            remaining,
        });
    }

    /// Every statement containing `pattern` returns `rows`.
    pub fn on(&self, pattern: &str, rows: Vec<SqlRow>) -> &Self {
        self.push(pattern, Reply::Rows(rows), None);
        self
    }

    /// The next statement containing `pattern` returns `rows`.
    pub fn once(&self, pattern: &str, rows: Vec<SqlRow>) -> &Self {
        self.push(pattern, Reply::Rows(rows), Some(1));
        self
    }

    /// Every statement containing `pattern` fails.
    pub fn fail(&self, pattern: &str, message: &str, code: Option<u32>) -> &Self {
        self.push(
            pattern,
            Reply::Error {
                message: message.to_string(),
                code,
            },
            None,
        );
        self
    }

    /// `@@VERSION` reports Azure SQL Database.
    pub fn azure(&self) -> &Self {
        self.on("@@VERSION", vec![row([SqlValue::from(AZURE_VERSION)])])
    }

    /// `@@VERSION` reports an on-premises server.
    pub fn on_premises(&self) -> &Self {
        self.on("@@VERSION", vec![row([SqlValue::from(ONPREM_VERSION)])])
    }

    /// Every database exists.
    pub fn databases_exist(&self) -> &Self {
        self.on("[sys].[databases]", vec![row([SqlValue::Int(1)])])
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements().iter().map(|s| s.sql().to_string()).collect()
    }

    /// Statements containing `pattern`.
    pub fn matching(&self, pattern: &str) -> Vec<Statement> {
        self.statements()
            .into_iter()
            .filter(|s| s.sql().contains(pattern))
            .collect()
    }

    pub fn endpoints(&self) -> Vec<ServerEndpoint> {
        self.state.lock().unwrap().endpoints.clone()
    }
}

impl ExecutorFactory for MockFactory {
    fn executor(&self, endpoint: &ServerEndpoint) -> ConnectorResult<Box<dyn Executor>> {
        self.state.lock().unwrap().endpoints.push(endpoint.clone());
        Ok(Box::new(MockExecutor {
            state: self.state.clone(),
        }))
    }
}

/// Row with positional columns.
pub fn row<const N: usize>(values: [SqlValue; N]) -> SqlRow {
    values
        .into_iter()
        .enumerate()
        .fold(SqlRow::new(), |row, (i, value)| row.with(format!("c{i}"), value))
}

/// `server` block with a SQL login.
pub fn server_block() -> Map<String, Value> {
    match json!({
        "host": "sql.example.test",
        "port": "1433",
        "login": { "username": "sa", "password": "Adm1n!Passw0rd" }
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Install a test subscriber once per test binary.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
