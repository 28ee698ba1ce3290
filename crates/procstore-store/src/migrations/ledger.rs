//! Migration ledger
//!
//! One `MigrationLedger` table per physical store records every applied
//! schema unit and every completed repair procedure. Names are qualified so
//! that repositories sharing a store never collide:
//!
//! - schema units: `<repository>/<unit-id>`
//! - repair markers: `repair/<procedure-name>`

#![allow(clippy::result_large_err)]

use crate::db::{SqlValue, Store};
use crate::errors::Result;
use crate::repository::Repository;
use chrono::Utc;

pub const LEDGER_TABLE: &str = "MigrationLedger";

const REPAIR_PREFIX: &str = "repair";

/// One applied unit or repair marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub name: String,
    pub applied_at: String,
    pub checksum: Option<String>,
}

/// Ledger name of a schema unit
pub fn unit_ledger_name(repository: Repository, unit_id: &str) -> String {
    format!("{}/{}", repository.as_str(), unit_id)
}

/// Ledger name of a repair procedure's completion marker
pub fn repair_ledger_name(procedure: &str) -> String {
    format!("{}/{}", REPAIR_PREFIX, procedure)
}

/// Create the ledger table if it does not exist yet
pub fn ensure(store: &dyn Store) -> Result<()> {
    store.execute_batch(
        r#"CREATE TABLE IF NOT EXISTS "MigrationLedger" (
            "name" VARCHAR(255) PRIMARY KEY,
            "appliedAt" VARCHAR(64) NOT NULL,
            "checksum" VARCHAR(64)
        )"#,
    )
}

/// All entries, ordered by name
pub fn entries(store: &dyn Store) -> Result<Vec<LedgerEntry>> {
    let rows = store.fetch(&store.dialect().select_all(LEDGER_TABLE, Some("name")))?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let name = row.text("name")?.to_string();
            let applied_at = row.text("appliedAt").unwrap_or_default().to_string();
            let checksum = row.text("checksum").map(str::to_string);
            Some(LedgerEntry {
                name,
                applied_at,
                checksum,
            })
        })
        .collect())
}

/// Entries recorded for `repository`'s schema units
pub fn repository_entries(store: &dyn Store, repository: Repository) -> Result<Vec<LedgerEntry>> {
    let prefix = format!("{}/", repository.as_str());
    Ok(entries(store)?
        .into_iter()
        .filter(|e| e.name.starts_with(&prefix))
        .collect())
}

/// Whether `name` has been recorded (a single query)
pub fn contains(store: &dyn Store, name: &str) -> Result<bool> {
    let query = store.dialect().select_where_eq(
        LEDGER_TABLE,
        &["name"],
        "name",
        SqlValue::from(name),
    );
    Ok(!store.fetch(&query)?.is_empty())
}

/// Record `name` as applied now
///
/// The primary key rejects a second entry for the same name, so a unit that
/// was somehow applied twice fails instead of being double-counted.
pub fn record(store: &dyn Store, name: &str, checksum: Option<&str>) -> Result<()> {
    let query = store.dialect().insert(
        LEDGER_TABLE,
        &[
            "name".to_string(),
            "appliedAt".to_string(),
            "checksum".to_string(),
        ],
        vec![
            SqlValue::from(name),
            SqlValue::from(Utc::now().to_rfc3339()),
            SqlValue::from(checksum),
        ],
    );
    store.run(&query)?;
    Ok(())
}
