//! Migration runner
//!
//! Applies a repository's pending units in order, each inside its own
//! transaction together with its ledger entry.

#![allow(clippy::result_large_err)]

use crate::db::{table_exists, with_transaction, Dialect, Store};
use crate::errors::{migration_unit_error, Result};
use crate::migrations::checksums::{verify, ChecksumCheck};
use crate::migrations::discovery::{discover, MigrationUnit};
use crate::migrations::ledger::{self, unit_ledger_name, LedgerEntry, LEDGER_TABLE};
use crate::repository::Repository;
use procstore_core::{log_op_end, log_op_error, log_op_start};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

/// Lifecycle of one unit against one store
///
/// `Pending -> Running -> Applied`, or `Running -> Failed`. A failed unit
/// leaves no ledger entry and is `Pending` again on the next boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Running,
    Applied,
    Failed,
}

/// A unit together with its ledger state
#[derive(Debug, Clone)]
pub struct UnitStatus {
    pub id: String,
    pub ledger_name: String,
    pub state: UnitState,
    pub applied_at: Option<String>,
}

/// What one migration pass did for one repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub repository: Option<Repository>,
    /// Units applied during this pass, in order
    pub applied: Vec<String>,
    /// Units already recorded in the ledger
    pub skipped: Vec<String>,
}

fn applied_index(entries: Vec<LedgerEntry>) -> HashMap<String, LedgerEntry> {
    entries.into_iter().map(|e| (e.name.clone(), e)).collect()
}

/// Bring `repository`'s schema in `store` up to date
///
/// Stops at the first failing unit; nothing is recorded for it and the
/// error names the repository and unit.
pub fn migrate_repository(
    store: &dyn Store,
    repository: Repository,
    migrations_root: &Path,
) -> Result<MigrationReport> {
    let start = Instant::now();
    log_op_start!(
        "migrate_repository",
        repository = repository.as_str(),
        store = %store.label()
    );

    let result = run_units(store, repository, migrations_root);
    let duration_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(report) => {
            log_op_end!(
                "migrate_repository",
                duration_ms = duration_ms,
                repository = repository.as_str(),
                applied = report.applied.len(),
                skipped = report.skipped.len()
            );
        }
        Err(err) => {
            log_op_error!(
                "migrate_repository",
                err.clone(),
                duration_ms = duration_ms,
                repository = repository.as_str()
            );
        }
    }
    result
}

fn run_units(
    store: &dyn Store,
    repository: Repository,
    migrations_root: &Path,
) -> Result<MigrationReport> {
    ledger::ensure(store)?;
    let units = discover(migrations_root, repository, store.dialect())?;
    let applied = applied_index(ledger::repository_entries(store, repository)?);

    let mut report = MigrationReport {
        repository: Some(repository),
        ..Default::default()
    };

    for unit in units {
        let ledger_name = unit_ledger_name(repository, &unit.id);
        if let Some(entry) = applied.get(&ledger_name) {
            if let ChecksumCheck::Drifted { recorded, current } =
                verify(entry.checksum.as_deref(), &unit.checksum)
            {
                tracing::warn!(
                    repository = repository.as_str(),
                    unit = %unit.id,
                    recorded = %recorded,
                    current = %current,
                    "applied migration unit changed on disk; not re-run"
                );
            }
            report.skipped.push(unit.id);
            continue;
        }

        apply_unit(store, repository, &unit, &ledger_name)?;
        report.applied.push(unit.id);
    }

    Ok(report)
}

fn apply_unit(
    store: &dyn Store,
    repository: Repository,
    unit: &MigrationUnit,
    ledger_name: &str,
) -> Result<()> {
    tracing::debug!(
        repository = repository.as_str(),
        unit = %unit.id,
        path = %unit.path.display(),
        state = ?UnitState::Running,
        "applying migration unit"
    );

    let outcome = with_transaction(store, |tx| {
        tx.execute_batch(&unit.sql)?;
        ledger::record(tx, ledger_name, Some(&unit.checksum))
    });

    match outcome {
        Ok(()) => {
            tracing::info!(
                repository = repository.as_str(),
                unit = %unit.id,
                state = ?UnitState::Applied,
                "migration unit applied"
            );
            Ok(())
        }
        Err(cause) => {
            tracing::debug!(
                repository = repository.as_str(),
                unit = %unit.id,
                state = ?UnitState::Failed,
                "migration unit rolled back"
            );
            Err(migration_unit_error(repository.as_str(), &unit.id, cause))
        }
    }
}

/// Every discovered unit of `repository` with its ledger state
///
/// Read-only: a store without a ledger table reports everything pending.
pub fn unit_statuses(
    store: &dyn Store,
    repository: Repository,
    migrations_root: &Path,
) -> Result<Vec<UnitStatus>> {
    let units = discover(migrations_root, repository, store.dialect())?;
    let applied = if table_exists(store, LEDGER_TABLE)? {
        applied_index(ledger::repository_entries(store, repository)?)
    } else {
        HashMap::new()
    };
    Ok(with_states(repository, units, &applied))
}

/// Unit states for a store that was never created: everything is pending
pub fn unopened_statuses(
    repository: Repository,
    dialect: Dialect,
    migrations_root: &Path,
) -> Result<Vec<UnitStatus>> {
    let units = discover(migrations_root, repository, dialect)?;
    Ok(with_states(repository, units, &HashMap::new()))
}

fn with_states(
    repository: Repository,
    units: Vec<MigrationUnit>,
    applied: &HashMap<String, LedgerEntry>,
) -> Vec<UnitStatus> {
    units
        .into_iter()
        .map(|unit| {
            let ledger_name = unit_ledger_name(repository, &unit.id);
            let entry = applied.get(&ledger_name);
            UnitStatus {
                state: if entry.is_some() {
                    UnitState::Applied
                } else {
                    UnitState::Pending
                },
                applied_at: entry.map(|e| e.applied_at.clone()),
                id: unit.id,
                ledger_name,
            }
        })
        .collect()
}

/// Units of `repository` not yet recorded in `store`'s ledger
pub fn pending_units(
    store: &dyn Store,
    repository: Repository,
    migrations_root: &Path,
) -> Result<Vec<String>> {
    Ok(unit_statuses(store, repository, migrations_root)?
        .into_iter()
        .filter(|s| s.state == UnitState::Pending)
        .map(|s| s.id)
        .collect())
}
