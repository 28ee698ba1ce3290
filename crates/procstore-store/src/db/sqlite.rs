//! SQLite store
//!
//! Opens SQLite database files and applies the dialect flags resolved for them

#![allow(clippy::result_large_err)]

use super::{Dialect, Row, SqlValue, Store};
use crate::errors::{closed_store, from_rusqlite, io_error, Result};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::cell::RefCell;
use std::fs;
use std::path::Path;

/// A SQLite database file (or in-memory database)
pub struct SqliteStore {
    label: String,
    conn: RefCell<Option<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path, creating parent directories
    pub fn open(path: &Path, journal_mode: &str, foreign_keys: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| io_error("create_store_dir", e))?;
            }
        }

        let conn = Connection::open(path).map_err(from_rusqlite)?;
        configure(&conn, journal_mode, foreign_keys)?;

        Ok(Self {
            label: format!("sqlite:{}", path.display()),
            conn: RefCell::new(Some(conn)),
        })
    }

    /// Open an in-memory SQLite database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(from_rusqlite)?;
        Ok(Self {
            label: "sqlite::memory:".to_string(),
            conn: RefCell::new(Some(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.borrow();
        let conn = guard.as_ref().ok_or_else(|| closed_store(&self.label))?;
        f(conn)
    }
}

/// Apply connection flags
fn configure(conn: &Connection, journal_mode: &str, foreign_keys: bool) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", foreign_keys)
        .map_err(from_rusqlite)?;
    conn.pragma_update(None, "journal_mode", journal_mode)
        .map_err(from_rusqlite)?;
    Ok(())
}

impl Store for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with_conn(|conn| conn.execute_batch(sql).map_err(from_rusqlite))
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.with_conn(|conn| {
            let affected = conn
                .execute(sql, params_from_iter(params.iter()))
                .map_err(from_rusqlite)?;
            Ok(affected as u64)
        })
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(from_rusqlite)?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
            let mut rows = stmt
                .query(params_from_iter(params.iter()))
                .map_err(from_rusqlite)?;

            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(from_rusqlite)? {
                let mut values = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    let value = row.get_ref(i).map_err(from_rusqlite)?;
                    values.push(from_value_ref(value)?);
                }
                out.push(Row::new(columns.clone(), values));
            }
            Ok(out)
        })
    }

    fn close(&self) -> Result<()> {
        let conn = self.conn.borrow_mut().take();
        match conn {
            Some(conn) => conn.close().map_err(|(_, e)| from_rusqlite(e)),
            None => Ok(()),
        }
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Result<SqlValue> {
    Ok(match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(r) => SqlValue::Real(r),
        ValueRef::Text(bytes) => SqlValue::Text(
            std::str::from_utf8(bytes)
                .map_err(|e| from_rusqlite(rusqlite::Error::Utf8Error(e)))?
                .to_string(),
        ),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    })
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            SqlValue::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            SqlValue::Timestamp(t) => ToSqlOutput::Owned(Value::Text(t.to_rfc3339())),
        })
    }
}
