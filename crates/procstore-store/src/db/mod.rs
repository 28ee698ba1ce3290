//! Database connection abstraction
//!
//! Every physical store, file-based or client/server, is driven through the
//! [`Store`] trait. SQL text comes from the dialect-aware builder in
//! [`dialect`], so callers never hand-write per-engine string literals and
//! row values always travel as bound parameters.

pub mod dialect;
pub mod postgres;
pub mod sqlite;

pub use dialect::{Dialect, Query};
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

use crate::errors::Result;
use chrono::{DateTime, Utc};
use std::fmt;

/// A single column value, independent of the engine it came from
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Real(r) => write!(f, "{}", r),
            SqlValue::Text(s) => write!(f, "'{}'", s),
            SqlValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
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
        SqlValue::Integer(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// One result row with its column names
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(SqlValue::as_text)
    }

    /// Value at position `index`
    pub fn at(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    pub fn into_pairs(self) -> impl Iterator<Item = (String, SqlValue)> {
        self.columns.into_iter().zip(self.values)
    }
}

/// A physical store connection
///
/// Implementations are single-threaded; the boot pass is strictly sequential.
pub trait Store {
    /// SQL dialect spoken by this store
    fn dialect(&self) -> Dialect;

    /// Human-readable location for logs (never includes credentials)
    fn label(&self) -> String;

    /// Run a script of one or more statements without parameters
    fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Run one parameterized statement, returning affected rows
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Run one parameterized query, returning all rows
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Close the physical connection; later calls fail
    fn close(&self) -> Result<()>;

    fn run(&self, query: &Query) -> Result<u64> {
        self.execute(&query.sql, &query.params)
    }

    fn fetch(&self, query: &Query) -> Result<Vec<Row>> {
        self.query(&query.sql, &query.params)
    }
}

/// Run `f` inside a transaction on `store`
///
/// Commits when `f` succeeds and rolls back otherwise. The rollback's own
/// failure is logged; the original error is what the caller sees.
pub fn with_transaction<T>(store: &dyn Store, f: impl FnOnce(&dyn Store) -> Result<T>) -> Result<T> {
    store.execute_batch("BEGIN")?;
    match f(store) {
        Ok(value) => {
            store.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = store.execute_batch("ROLLBACK") {
                tracing::warn!(
                    store = %store.label(),
                    error = %rollback_err,
                    "rollback failed"
                );
            }
            Err(err)
        }
    }
}

/// Whether `table` exists in `store`
pub fn table_exists(store: &dyn Store, table: &str) -> Result<bool> {
    let rows = store.fetch(&store.dialect().table_exists(table))?;
    Ok(!rows.is_empty())
}

/// Column names of `table` in declaration order (empty if absent)
pub fn table_columns(store: &dyn Store, table: &str) -> Result<Vec<String>> {
    let rows = store.fetch(&store.dialect().table_columns(table))?;
    Ok(rows
        .iter()
        .filter_map(|row| row.at(0).and_then(SqlValue::as_text).map(str::to_string))
        .collect())
}

/// Number of rows in `table`
pub fn count_rows(store: &dyn Store, table: &str) -> Result<i64> {
    let rows = store.fetch(&store.dialect().count_rows(table))?;
    Ok(rows
        .first()
        .and_then(|row| row.at(0))
        .and_then(SqlValue::as_integer)
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup_by_name() {
        let row = Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![SqlValue::Integer(3), SqlValue::from("Order")],
        );
        assert_eq!(row.get("id"), Some(&SqlValue::Integer(3)));
        assert_eq!(row.text("name"), Some("Order"));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(SqlValue::from(None::<String>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".to_string()));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .unwrap();

        let result: Result<()> = with_transaction(&store, |tx| {
            tx.execute("INSERT INTO t (id) VALUES (?1)", &[SqlValue::Integer(1)])?;
            tx.execute_batch("INSERT INTO missing_table VALUES (1)")
        });

        assert!(result.is_err());
        assert_eq!(count_rows(&store, "t").unwrap(), 0);
    }

    #[test]
    fn test_table_probes() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(!table_exists(&store, "ProcessTokens").unwrap());

        store
            .execute_batch(r#"CREATE TABLE "ProcessTokens" ("id" INTEGER PRIMARY KEY, "payload" TEXT)"#)
            .unwrap();

        assert!(table_exists(&store, "ProcessTokens").unwrap());
        assert_eq!(
            table_columns(&store, "ProcessTokens").unwrap(),
            vec!["id".to_string(), "payload".to_string()]
        );
        assert_eq!(count_rows(&store, "ProcessTokens").unwrap(), 0);
    }
}
