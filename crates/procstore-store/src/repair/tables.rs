//! Table-level steps shared by repairs: probe, copy, drop

#![allow(clippy::result_large_err)]

use crate::db::{count_rows, table_columns, table_exists, SqlValue, Store};
use crate::errors::{data_integrity, Result};
use std::collections::HashSet;

/// What a store holds under a table name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Absent,
    Empty,
    Populated(i64),
}

pub fn probe(store: &dyn Store, table: &str) -> Result<TableState> {
    if !table_exists(store, table)? {
        return Ok(TableState::Absent);
    }
    Ok(match count_rows(store, table)? {
        0 => TableState::Empty,
        n => TableState::Populated(n),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub copied: u64,
    /// Rows already present, identical, in the destination
    pub skipped: u64,
}

/// Copy every row of `table` from `source` into the same table of `destination`
///
/// Rows are matched on `key_column`. A row already present in the
/// destination with identical values is left alone, so the copy can be
/// repeated after an interruption; a different row under the same key is a
/// data integrity error and nothing is dropped. All source columns are
/// written verbatim. The caller owns the destination transaction.
pub fn copy_rows(
    procedure: &str,
    source: &dyn Store,
    destination: &dyn Store,
    table: &str,
    key_column: &str,
) -> Result<CopyStats> {
    if !table_exists(destination, table)? {
        return Err(data_integrity(
            procedure,
            table,
            None,
            format!("destination {} has no such table", destination.label()),
        ));
    }

    let source_columns = table_columns(source, table)?;
    let destination_columns: HashSet<String> =
        table_columns(destination, table)?.into_iter().collect();
    let missing: Vec<&str> = source_columns
        .iter()
        .filter(|c| !destination_columns.contains(*c))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(data_integrity(
            procedure,
            table,
            None,
            format!("destination lacks columns {}", missing.join(", ")),
        ));
    }
    if !source_columns.iter().any(|c| c == key_column) {
        return Err(data_integrity(
            procedure,
            table,
            None,
            format!("source has no '{}' column", key_column),
        ));
    }

    let dialect = destination.dialect();
    let projection: Vec<&str> = source_columns.iter().map(String::as_str).collect();

    let mut stats = CopyStats::default();
    let rows = source.fetch(&source.dialect().select_all(table, Some(key_column)))?;
    for row in rows {
        let key = row.get(key_column).cloned().unwrap_or(SqlValue::Null);
        if key.is_null() {
            return Err(data_integrity(
                procedure,
                table,
                None,
                format!("row without '{}'", key_column),
            ));
        }
        let key_text = key.to_string();

        let present = destination.fetch(&dialect.select_where_eq(
            table,
            &projection,
            key_column,
            key.clone(),
        ))?;
        if let Some(existing) = present.first() {
            if existing.values() != row.values() {
                return Err(data_integrity(
                    procedure,
                    table,
                    Some(format!("{}={}", key_column, key_text)),
                    format!(
                        "destination {} holds a different row under the same key",
                        destination.label()
                    ),
                ));
            }
            stats.skipped += 1;
            continue;
        }

        let (columns, values): (Vec<String>, Vec<SqlValue>) = row.into_pairs().unzip();
        destination
            .run(&dialect.insert(table, &columns, values))
            .map_err(|err| {
                data_integrity(
                    procedure,
                    table,
                    Some(format!("{}={}", key_column, key_text)),
                    err.message(),
                )
                .with_source(err)
            })?;
        stats.copied += 1;
    }

    if stats.copied > 0 {
        if let Some(sql) = dialect.sync_identity(table, key_column) {
            destination.execute_batch(&sql)?;
        }
    }

    tracing::debug!(
        table,
        copied = stats.copied,
        skipped = stats.skipped,
        "copied rows"
    );
    Ok(stats)
}

pub fn drop_table(store: &dyn Store, table: &str) -> Result<()> {
    store.execute_batch(&store.dialect().drop_table(table))
}
