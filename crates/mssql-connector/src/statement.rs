//! Statements, bound parameters and the dynamic SQL builder.
//!
//! DDL cannot bind identifiers as parameters, so statements that embed user
//! supplied names are rendered as
//!
//! ```sql
//! DECLARE @stmt nvarchar(max)
//! SET @stmt = N'CREATE ROLE ' + QUOTENAME(@P1)
//! EXEC (@stmt)
//! ```
//!
//! Names and literals travel as bound parameters and are quoted by the
//! server (`QUOTENAME` / `REPLACE`). Static fragments are escaped here. This
//! module is the only place where SQL text is concatenated with values.

use std::fmt::Write as _;

/// Database used when a statement does not name one.
pub const DEFAULT_DATABASE: &str = "master";

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Null,
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<&String> for SqlParam {
    fn from(value: &String) -> Self {
        SqlParam::Text(value.clone())
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlParam::Null, Into::into)
    }
}

/// SQL text with positional parameters (`@P1`, `@P2`, ...) and the database
/// it must run in.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<SqlParam>,
    database: Option<String>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            database: None,
        }
    }

    /// Append the next positional parameter.
    #[must_use]
    pub fn bind(mut self, value: impl Into<SqlParam>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Run in `database`; an empty name means [`DEFAULT_DATABASE`].
    #[must_use]
    pub fn in_database(mut self, database: impl Into<String>) -> Self {
        let database = database.into();
        self.database = if database.is_empty() {
            None
        } else {
            Some(database)
        };
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    /// Target database.
    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or(DEFAULT_DATABASE)
    }
}

/// Quote a name the way `QUOTENAME` does: `[` + name with `]` doubled + `]`.
pub fn quote_name(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a Unicode string literal: `N'` + value with `'` doubled + `'`.
pub fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// Builder for `EXEC (@stmt)` dynamic statements.
///
/// Each command is a concatenation of static text, quoted identifiers and
/// escaped literals; [`DynamicSql::then`] starts the next command in the same
/// batch. An optional guard wraps all commands in `IF <condition> BEGIN ... END`.
#[derive(Debug, Clone, Default)]
pub struct DynamicSql {
    params: Vec<SqlParam>,
    guard: Option<String>,
    commands: Vec<Vec<String>>,
}

impl DynamicSql {
    pub fn new() -> Self {
        Self {
            params: Vec::new(),
            guard: None,
            commands: vec![Vec::new()],
        }
    }

    /// Bind a value and return its placeholder for use in a guard.
    pub fn bind(&mut self, value: impl Into<SqlParam>) -> String {
        self.params.push(value.into());
        format!("@P{}", self.params.len())
    }

    /// Only run the commands when `condition` holds.
    pub fn guard(&mut self, condition: impl Into<String>) -> &mut Self {
        self.guard = Some(condition.into());
        self
    }

    /// Append static text. Must not contain user input.
    pub fn text(&mut self, fragment: &str) -> &mut Self {
        if !fragment.is_empty() {
            self.current().push(quote_literal(fragment));
        }
        self
    }

    /// Append a name quoted server-side with `QUOTENAME`.
    pub fn ident(&mut self, name: &str) -> &mut Self {
        let placeholder = self.bind(name);
        self.current().push(format!("QUOTENAME({placeholder})"));
        self
    }

    /// Append a Unicode string literal (`N'...'`) escaped server-side.
    pub fn literal(&mut self, value: &str) -> &mut Self {
        let placeholder = self.bind(value);
        self.current()
            .push(format!("N'N''' + REPLACE({placeholder}, N'''', N'''''') + N''''"));
        self
    }

    /// Start a new command.
    pub fn then(&mut self) -> &mut Self {
        if self.commands.last().is_some_and(|c| !c.is_empty()) {
            self.commands.push(Vec::new());
        }
        self
    }

    fn current(&mut self) -> &mut Vec<String> {
        if self.commands.is_empty() {
            self.commands.push(Vec::new());
        }
        let last = self.commands.len() - 1;
        &mut self.commands[last]
    }

    /// Render the batch text.
    pub fn render(&self) -> String {
        let mut sql = String::from("DECLARE @stmt nvarchar(max)\n");
        if let Some(guard) = &self.guard {
            let _ = writeln!(sql, "IF {guard}\nBEGIN");
        }
        for command in self.commands.iter().filter(|c| !c.is_empty()) {
            let _ = writeln!(sql, "SET @stmt = {}", command.join(" + "));
            sql.push_str("EXEC (@stmt)\n");
        }
        if self.guard.is_some() {
            sql.push_str("END\n");
        }
        sql
    }

    /// Finish into a [`Statement`] for `database`.
    pub fn into_statement(self, database: impl Into<String>) -> Statement {
        let sql = self.render();
        Statement {
            sql,
            params: self.params,
            database: None,
        }
        .in_database(database)
    }
}
