//! Driver-independent result rows.

use uuid::Uuid;

use crate::error::{ConnectorError, ConnectorResult};

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Bool(bool),
    Text(String),
    Binary(Vec<u8>),
    Guid(Uuid),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// One result row; columns are addressed by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlRow {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.columns.push(column.into());
        self.values.push(value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn value(&self, index: usize) -> ConnectorResult<&SqlValue> {
        self.values.get(index).ok_or_else(|| {
            ConnectorError::invalid_data(format!(
                "row has {} columns, column {index} requested",
                self.values.len()
            ))
        })
    }

    fn column_name(&self, index: usize) -> &str {
        self.columns.get(index).map_or("?", String::as_str)
    }

    /// Nullable text column.
    pub fn opt_text(&self, index: usize) -> ConnectorResult<Option<String>> {
        match self.value(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            SqlValue::Int(i) => Ok(Some(i.to_string())),
            SqlValue::Guid(g) => Ok(Some(g.to_string())),
            other => Err(ConnectorError::invalid_data(format!(
                "column {} is not text: {other:?}",
                self.column_name(index)
            ))),
        }
    }

    /// Non-null text column.
    pub fn text(&self, index: usize) -> ConnectorResult<String> {
        self.opt_text(index)?.ok_or_else(|| {
            ConnectorError::invalid_data(format!("column {} is NULL", self.column_name(index)))
        })
    }

    /// Nullable integer column.
    pub fn opt_int(&self, index: usize) -> ConnectorResult<Option<i64>> {
        match self.value(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Int(i) => Ok(Some(*i)),
            SqlValue::Bool(b) => Ok(Some(i64::from(*b))),
            other => Err(ConnectorError::invalid_data(format!(
                "column {} is not an integer: {other:?}",
                self.column_name(index)
            ))),
        }
    }

    /// Non-null integer column.
    pub fn int(&self, index: usize) -> ConnectorResult<i64> {
        self.opt_int(index)?.ok_or_else(|| {
            ConnectorError::invalid_data(format!("column {} is NULL", self.column_name(index)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let row = SqlRow::new()
            .with("principal_id", 267)
            .with("name", "app")
            .with("default_language_name", None::<String>);

        assert_eq!(row.int(0).unwrap(), 267);
        assert_eq!(row.text(1).unwrap(), "app");
        assert_eq!(row.opt_text(2).unwrap(), None);
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn test_null_in_required_column_is_error() {
        let row = SqlRow::new().with("name", None::<String>);
        let err = row.text(0).unwrap_err();
        assert!(err.to_string().contains("column name is NULL"));
    }

    #[test]
    fn test_out_of_range_and_type_mismatch() {
        let row = SqlRow::new().with("flag", true);
        assert!(row.text(3).is_err());
        assert!(row.opt_text(0).is_err());
        assert_eq!(row.int(0).unwrap(), 1);
    }
}
