//! Boot sequence
//!
//! Runs before anything else in the process: resolve every repository's
//! store, migrate each one in enumeration order, then run the one-time
//! repairs. Migration failures abort the boot; repair failures are only
//! reported.

#![allow(clippy::result_large_err)]

use crate::connections::ConnectionManager;
use crate::errors::Result;
use crate::migrations::{
    ensure_root, migrate_repository, unit_statuses, unopened_statuses, MigrationReport, UnitStatus,
};
use crate::repair::{registered_procedures, run_procedures, RepairProcedure, RepairReport};
use crate::resolver::{DeploymentSettings, StoreEnvironment, StoreTargetResolver};
use crate::target::{StoreLocation, StoreTarget};
use procstore_core::{log_op_end, log_op_error, log_op_start};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Inputs of a boot pass
#[derive(Debug, Clone)]
pub struct BootConfig {
    /// Already-resolved root holding `<repository>/<unit>.sql`
    pub migrations_root: PathBuf,
    pub settings: DeploymentSettings,
}

#[derive(Debug, Clone)]
pub struct BootReport {
    pub migrations: Vec<MigrationReport>,
    pub repairs: Vec<RepairReport>,
}

impl BootReport {
    pub fn applied_units(&self) -> usize {
        self.migrations.iter().map(|m| m.applied.len()).sum()
    }

    pub fn failed_repairs(&self) -> impl Iterator<Item = &RepairReport> {
        self.repairs.iter().filter(|r| r.status.is_failed())
    }
}

/// Migrate every repository, then run the shipped repairs
pub fn run(config: &BootConfig, connections: &mut ConnectionManager) -> Result<BootReport> {
    run_with_procedures(config, connections, &registered_procedures())
}

/// [`run`] with an explicit repair list
pub fn run_with_procedures(
    config: &BootConfig,
    connections: &mut ConnectionManager,
    procedures: &[Box<dyn RepairProcedure>],
) -> Result<BootReport> {
    let start = Instant::now();
    log_op_start!("boot", migrations_root = %config.migrations_root.display());

    let result = boot_pass(config, connections, procedures);
    let duration_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(report) => {
            log_op_end!(
                "boot",
                duration_ms = duration_ms,
                applied = report.applied_units(),
                failed_repairs = report.failed_repairs().count()
            );
        }
        Err(err) => {
            log_op_error!("boot", err.clone(), duration_ms = duration_ms);
        }
    }
    result
}

fn boot_pass(
    config: &BootConfig,
    connections: &mut ConnectionManager,
    procedures: &[Box<dyn RepairProcedure>],
) -> Result<BootReport> {
    // Every configuration error surfaces before the first connection.
    let resolver = StoreTargetResolver::new(&config.settings)?;
    let targets = resolver.resolve_all()?;
    ensure_root(&config.migrations_root)?;

    let mut migrations = Vec::with_capacity(targets.len());
    for target in &targets {
        migrations.push(migrate_target(target, &config.migrations_root, connections)?);
    }

    let repairs = run_procedures(procedures, &resolver, connections);
    Ok(BootReport {
        migrations,
        repairs,
    })
}

fn migrate_target(
    target: &StoreTarget,
    migrations_root: &Path,
    connections: &mut ConnectionManager,
) -> Result<MigrationReport> {
    let store = connections.acquire(&target.descriptor)?;
    let result = migrate_repository(store.as_ref(), target.repository, migrations_root);
    drop(store);
    let released = connections.release(&target.descriptor);
    let report = result?;
    released?;
    Ok(report)
}

/// Boot with settings from `env` and a fresh connection manager
pub fn run_with_defaults(env: &StoreEnvironment, migrations_root: &Path) -> Result<BootReport> {
    let config = BootConfig {
        migrations_root: migrations_root.to_path_buf(),
        settings: env.load()?,
    };
    let mut connections = ConnectionManager::default();
    let result = run(&config, &mut connections);
    let closed = connections.close_all();
    let report = result?;
    closed?;
    Ok(report)
}

/// Per-repository unit states, without applying anything
///
/// SQLite files that do not exist yet are reported as all pending and are
/// not created.
pub fn inspect(
    config: &BootConfig,
    connections: &mut ConnectionManager,
) -> Result<Vec<(StoreTarget, Vec<UnitStatus>)>> {
    let resolver = StoreTargetResolver::new(&config.settings)?;
    let targets = resolver.resolve_all()?;
    ensure_root(&config.migrations_root)?;

    let mut out = Vec::new();
    for target in targets {
        if let StoreLocation::File(path) = &target.descriptor.location {
            if !path.exists() {
                let statuses = unopened_statuses(
                    target.repository,
                    target.descriptor.engine.dialect(),
                    &config.migrations_root,
                )?;
                out.push((target, statuses));
                continue;
            }
        }

        let store = connections.acquire(&target.descriptor)?;
        let statuses = unit_statuses(store.as_ref(), target.repository, &config.migrations_root);
        drop(store);
        let released = connections.release(&target.descriptor);
        let statuses = statuses?;
        released?;
        out.push((target, statuses));
    }
    Ok(out)
}
