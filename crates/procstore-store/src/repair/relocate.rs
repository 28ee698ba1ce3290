//! Relocation of tables written into the wrong store
//!
//! A past configuration defect created `ProcessDefinitions` inside the
//! flow-node-instance store and `FlowNodeInstances`/`ProcessTokens` inside
//! the process-model store. Each direction is repaired on its own: stray
//! rows are copied into the owning store and the stray tables dropped.

#![allow(clippy::result_large_err)]

use super::tables::{copy_rows, drop_table, probe, TableState};
use super::{RepairContext, RepairOutcome, RepairProcedure, RepairSummary};
use crate::db::with_transaction;
use crate::errors::{repair_precondition, Result};
use crate::repository::Repository;

const KEY_COLUMN: &str = "id";

/// Tables that belong in `owner` but may have been written to `stray`
///
/// Parents come first; dropping walks the list backwards.
struct TableGroup {
    owner: Repository,
    stray: Repository,
    tables: &'static [&'static str],
}

const GROUPS: [TableGroup; 2] = [
    TableGroup {
        owner: Repository::ProcessModel,
        stray: Repository::FlowNodeInstance,
        tables: &["ProcessDefinitions"],
    },
    TableGroup {
        owner: Repository::FlowNodeInstance,
        stray: Repository::ProcessModel,
        tables: &["FlowNodeInstances", "ProcessTokens"],
    },
];

pub struct RelocateStrayTables;

impl RepairProcedure for RelocateStrayTables {
    fn name(&self) -> &'static str {
        "0001_relocate_stray_tables"
    }

    fn home(&self) -> Repository {
        Repository::ProcessModel
    }

    fn run(&self, ctx: &mut RepairContext<'_>) -> Result<RepairOutcome> {
        if ctx.shares_store(Repository::ProcessModel, Repository::FlowNodeInstance)? {
            return Ok(RepairOutcome::SharedStore);
        }

        let mut summary = RepairSummary::default();
        for group in &GROUPS {
            relocate_group(ctx, group, &mut summary)?;
        }
        Ok(RepairOutcome::Completed(summary))
    }
}

fn relocate_group(
    ctx: &mut RepairContext<'_>,
    group: &TableGroup,
    summary: &mut RepairSummary,
) -> Result<()> {
    let procedure = ctx.procedure();
    let stray = ctx.store(group.stray)?;
    let owner = ctx.store(group.owner)?;

    let mut to_drop = Vec::new();
    for table in group.tables {
        match probe(stray.as_ref(), table)? {
            TableState::Absent => {
                let skipped = repair_precondition(procedure, table);
                tracing::debug!(
                    procedure,
                    table = *table,
                    repository = group.stray.as_str(),
                    reason = %skipped,
                    "no stray table"
                );
            }
            TableState::Empty => to_drop.push(*table),
            TableState::Populated(rows) => {
                tracing::info!(
                    procedure,
                    table = *table,
                    rows,
                    from = group.stray.as_str(),
                    to = group.owner.as_str(),
                    "relocating stray rows"
                );
                let stats = with_transaction(owner.as_ref(), |tx| {
                    copy_rows(procedure, stray.as_ref(), tx, table, KEY_COLUMN)
                })?;
                summary.rows_copied += stats.copied;
                summary.rows_skipped += stats.skipped;
                to_drop.push(*table);
            }
        }
    }

    for table in to_drop.into_iter().rev() {
        drop_table(stray.as_ref(), table)?;
        summary
            .tables_dropped
            .push(format!("{}.{}", group.stray.as_str(), table));
    }
    Ok(())
}
