//! Migration framework
//!
//! Provides:
//! - On-disk unit discovery with per-dialect variants
//! - A per-store ledger of applied units and repair markers
//! - Transactional, idempotent application with checksum drift warnings

pub mod checksums;
pub mod discovery;
pub mod ledger;
pub mod runner;

pub use discovery::{discover, ensure_root, MigrationUnit};
pub use ledger::{repair_ledger_name, unit_ledger_name, LedgerEntry, LEDGER_TABLE};
pub use runner::{
    migrate_repository, pending_units, unit_statuses, unopened_statuses, MigrationReport, UnitState,
    UnitStatus,
};
