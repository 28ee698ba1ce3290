//! PostgreSQL store
//!
//! sqlx is async; the store owns a current-thread tokio runtime and blocks on
//! each statement so the rest of the crate keeps a synchronous API.

#![allow(clippy::result_large_err)]

use super::{Dialect, Row, SqlValue, Store};
use crate::errors::{closed_store, connection_error, from_sqlx, Result};
use crate::target::SslMode;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use procstore_core::{ExError, ExErrorKind};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow, PgSslMode};
use sqlx::query::Query as SqlxQuery;
use sqlx::{Column, Connection, Executor, Postgres, Row as _, TypeInfo, ValueRef};
use std::cell::RefCell;
use tokio::runtime::{Builder, Runtime};

/// A connection to a PostgreSQL database
pub struct PostgresStore {
    label: String,
    runtime: Runtime,
    conn: RefCell<Option<PgConnection>>,
}

impl PostgresStore {
    /// Connect to `database` on `host:port` as `username`
    pub fn connect(
        host: &str,
        port: u16,
        database: &str,
        username: &str,
        password: &str,
        ssl_mode: SslMode,
    ) -> Result<Self> {
        let label = format!("postgres://{}@{}:{}/{}", username, host, port, database);
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| connection_error(&label, e.to_string()))?;

        let mut options = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database)
            .username(username)
            .ssl_mode(match ssl_mode {
                SslMode::Disable => PgSslMode::Disable,
                SslMode::Prefer => PgSslMode::Prefer,
                SslMode::Require => PgSslMode::Require,
            });
        if !password.is_empty() {
            options = options.password(password);
        }

        let conn = runtime
            .block_on(PgConnection::connect_with(&options))
            .map_err(|e| connection_error(&label, e.to_string()))?;

        Ok(Self {
            label,
            runtime,
            conn: RefCell::new(Some(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Runtime, &mut PgConnection) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.conn.borrow_mut();
        let conn = guard.as_mut().ok_or_else(|| closed_store(&self.label))?;
        f(&self.runtime, conn)
    }
}

impl Store for PostgresStore {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with_conn(|runtime, conn| {
            runtime
                .block_on(Executor::execute(&mut *conn, sql))
                .map(|_| ())
                .map_err(from_sqlx)
        })
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.with_conn(|runtime, conn| {
            let query = bind_all(sqlx::query(sql), params);
            let result = runtime
                .block_on(query.execute(&mut *conn))
                .map_err(from_sqlx)?;
            Ok(result.rows_affected())
        })
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.with_conn(|runtime, conn| {
            let query = bind_all(sqlx::query(sql), params);
            let rows = runtime
                .block_on(query.fetch_all(&mut *conn))
                .map_err(from_sqlx)?;
            rows.iter().map(decode_row).collect()
        })
    }

    fn close(&self) -> Result<()> {
        let conn = self.conn.borrow_mut().take();
        match conn {
            Some(conn) => self.runtime.block_on(conn.close()).map_err(from_sqlx),
            None => Ok(()),
        }
    }
}

fn bind_all<'q>(
    mut query: SqlxQuery<'q, Postgres, PgArguments>,
    params: &[SqlValue],
) -> SqlxQuery<'q, Postgres, PgArguments> {
    for param in params {
        query = match param.clone() {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Integer(i) => query.bind(i),
            SqlValue::Real(r) => query.bind(r),
            SqlValue::Text(s) => query.bind(s),
            SqlValue::Blob(b) => query.bind(b),
            SqlValue::Bool(b) => query.bind(b),
            SqlValue::Timestamp(t) => query.bind(t),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for (i, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());

        let raw = row.try_get_raw(i).map_err(from_sqlx)?;
        if raw.is_null() {
            values.push(SqlValue::Null);
            continue;
        }

        let type_name = column.type_info().name().to_string();
        let value = match type_name.as_str() {
            "BOOL" => SqlValue::Bool(row.try_get(i).map_err(from_sqlx)?),
            "INT2" => SqlValue::Integer(i64::from(row.try_get::<i16, _>(i).map_err(from_sqlx)?)),
            "INT4" => SqlValue::Integer(i64::from(row.try_get::<i32, _>(i).map_err(from_sqlx)?)),
            "INT8" => SqlValue::Integer(row.try_get(i).map_err(from_sqlx)?),
            "FLOAT4" => SqlValue::Real(f64::from(row.try_get::<f32, _>(i).map_err(from_sqlx)?)),
            "FLOAT8" => SqlValue::Real(row.try_get(i).map_err(from_sqlx)?),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                SqlValue::Text(row.try_get(i).map_err(from_sqlx)?)
            }
            "BYTEA" => SqlValue::Blob(row.try_get(i).map_err(from_sqlx)?),
            "TIMESTAMPTZ" => {
                SqlValue::Timestamp(row.try_get::<DateTime<Utc>, _>(i).map_err(from_sqlx)?)
            }
            "TIMESTAMP" => {
                let naive: NaiveDateTime = row.try_get(i).map_err(from_sqlx)?;
                SqlValue::Timestamp(Utc.from_utc_datetime(&naive))
            }
            other => {
                return Err(ExError::new(ExErrorKind::Persistence)
                    .with_op("postgres")
                    .with_message(format!(
                        "column '{}' has unsupported type {}",
                        column.name(),
                        other
                    )))
            }
        };
        values.push(value);
    }

    Ok(Row::new(columns, values))
}
