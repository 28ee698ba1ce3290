//! One-time data repairs
//!
//! Each procedure is guarded by a `repair/<name>` marker in the ledger of its
//! home store. The marker is written only after the procedure finished, so an
//! interrupted or failed repair runs again on the next boot. Repairs never
//! stop the process from starting: failures are logged as warnings and
//! reported.

#![allow(clippy::result_large_err)]

pub mod bpmn;
pub mod flow_node_labels;
pub mod relocate;
pub mod tables;

pub use flow_node_labels::BackfillFlowNodeLabels;
pub use relocate::RelocateStrayTables;

use crate::connections::{ConnectionManager, StoreHandle};
use crate::errors::Result;
use crate::migrations::ledger::{self, repair_ledger_name};
use crate::repository::Repository;
use crate::resolver::StoreTargetResolver;
use crate::target::StoreTarget;
use procstore_core::{log_op_end, log_op_start, ExError};
use std::collections::BTreeMap;
use std::time::Instant;

/// A named, versioned one-time repair
pub trait RepairProcedure {
    /// Stable name; the ledger marker is `repair/<name>`
    fn name(&self) -> &'static str;

    /// Repository whose store holds the marker
    fn home(&self) -> Repository;

    fn run(&self, ctx: &mut RepairContext<'_>) -> Result<RepairOutcome>;
}

/// Counters reported by a completed repair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairSummary {
    pub rows_copied: u64,
    pub rows_updated: u64,
    /// Rows left alone (already present, or not resolvable)
    pub rows_skipped: u64,
    pub tables_dropped: Vec<String>,
}

/// What a procedure's `run` concluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// The stores involved are one physical store; nothing to do
    SharedStore,
    Completed(RepairSummary),
}

/// Final state of one procedure in a boot pass
#[derive(Debug, Clone)]
pub enum RepairStatus {
    /// Marker already present; the procedure was not run
    AlreadyApplied,
    SharedStore,
    Completed(RepairSummary),
    /// Not recorded; will run again next boot
    Failed(ExError),
}

impl RepairStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, RepairStatus::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct RepairReport {
    pub procedure: String,
    pub status: RepairStatus,
}

/// Store access for a running procedure
///
/// Stores are acquired through the connection manager on first use and
/// released when the procedure ends, whatever its outcome.
pub struct RepairContext<'a> {
    procedure: &'static str,
    resolver: &'a StoreTargetResolver,
    connections: &'a mut ConnectionManager,
    acquired: BTreeMap<Repository, (StoreTarget, StoreHandle)>,
}

impl<'a> RepairContext<'a> {
    pub fn new(
        procedure: &'static str,
        resolver: &'a StoreTargetResolver,
        connections: &'a mut ConnectionManager,
    ) -> Self {
        Self {
            procedure,
            resolver,
            connections,
            acquired: BTreeMap::new(),
        }
    }

    pub fn procedure(&self) -> &'static str {
        self.procedure
    }

    /// Resolved target of `repository` (no connection is opened)
    pub fn target(&self, repository: Repository) -> Result<StoreTarget> {
        self.resolver.resolve(repository)
    }

    /// Whether two repositories live in the same physical store
    pub fn shares_store(&self, a: Repository, b: Repository) -> Result<bool> {
        Ok(self.target(a)?.fingerprint() == self.target(b)?.fingerprint())
    }

    /// Open store of `repository`
    pub fn store(&mut self, repository: Repository) -> Result<StoreHandle> {
        if let Some((_, handle)) = self.acquired.get(&repository) {
            return Ok(StoreHandle::clone(handle));
        }
        let target = self.resolver.resolve(repository)?;
        let handle = self.connections.acquire(&target.descriptor)?;
        self.acquired
            .insert(repository, (target, StoreHandle::clone(&handle)));
        Ok(handle)
    }

    fn release_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for (_, (target, _)) in std::mem::take(&mut self.acquired) {
            if let Err(err) = self.connections.release(&target.descriptor) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Every shipped procedure, in execution order
pub fn registered_procedures() -> Vec<Box<dyn RepairProcedure>> {
    vec![
        Box::new(RelocateStrayTables),
        Box::new(BackfillFlowNodeLabels),
    ]
}

/// Run `procedures` in order; one failing never prevents the next
pub fn run_procedures(
    procedures: &[Box<dyn RepairProcedure>],
    resolver: &StoreTargetResolver,
    connections: &mut ConnectionManager,
) -> Vec<RepairReport> {
    procedures
        .iter()
        .map(|procedure| {
            let start = Instant::now();
            log_op_start!("repair", procedure = procedure.name());

            let status = match run_one(procedure.as_ref(), resolver, connections) {
                Ok(status) => status,
                Err(err) => {
                    tracing::warn!(
                        procedure = procedure.name(),
                        table = err.table().unwrap_or(""),
                        err_code = err.code(),
                        error = %err,
                        "repair failed; it will be retried on next boot"
                    );
                    RepairStatus::Failed(err)
                }
            };

            log_op_end!(
                "repair",
                duration_ms = start.elapsed().as_millis() as u64,
                procedure = procedure.name(),
                status = ?status
            );
            RepairReport {
                procedure: procedure.name().to_string(),
                status,
            }
        })
        .collect()
}

fn run_one(
    procedure: &dyn RepairProcedure,
    resolver: &StoreTargetResolver,
    connections: &mut ConnectionManager,
) -> Result<RepairStatus> {
    let marker = repair_ledger_name(procedure.name());
    let mut ctx = RepairContext::new(procedure.name(), resolver, connections);

    let result = guarded_run(procedure, &marker, &mut ctx);
    let released = ctx.release_all();
    let status = result?;
    released?;
    Ok(status)
}

fn guarded_run(
    procedure: &dyn RepairProcedure,
    marker: &str,
    ctx: &mut RepairContext<'_>,
) -> Result<RepairStatus> {
    let home = ctx.store(procedure.home())?;
    if ledger::contains(home.as_ref(), marker)? {
        tracing::debug!(procedure = procedure.name(), "repair already applied");
        return Ok(RepairStatus::AlreadyApplied);
    }

    let outcome = procedure.run(ctx)?;
    ledger::record(home.as_ref(), marker, None)?;

    Ok(match outcome {
        RepairOutcome::SharedStore => {
            tracing::info!(
                procedure = procedure.name(),
                "stores are shared; nothing to repair"
            );
            RepairStatus::SharedStore
        }
        RepairOutcome::Completed(summary) => {
            tracing::info!(
                procedure = procedure.name(),
                rows_copied = summary.rows_copied,
                rows_updated = summary.rows_updated,
                rows_skipped = summary.rows_skipped,
                "repair completed"
            );
            RepairStatus::Completed(summary)
        }
    })
}
