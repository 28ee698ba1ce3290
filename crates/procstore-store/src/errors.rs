//! Error handling for procstore-store
//!
//! Wraps procstore-core's `ExError` with store-specific constructors

use procstore_core::errors::{ExError, ExErrorKind, StoreError};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Unsupported or incomplete deployment profile
pub fn configuration_error(reason: impl Into<String>) -> ExError {
    StoreError::Configuration {
        reason: reason.into(),
    }
    .into()
}

/// A store could not be opened
pub fn connection_error(target: impl Into<String>, reason: impl Into<String>) -> ExError {
    StoreError::Connection {
        target: target.into(),
        reason: reason.into(),
    }
    .into()
}

/// A schema migration unit failed; the cause is kept as the source
pub fn migration_unit_error(repository: &str, unit: &str, cause: ExError) -> ExError {
    ExError::from(StoreError::MigrationUnit {
        repository: repository.to_string(),
        unit: unit.to_string(),
        reason: cause.message().to_string(),
    })
    .with_source(cause)
}

/// An expected table was not there; callers skip the step
pub fn repair_precondition(procedure: &str, table: &str) -> ExError {
    StoreError::RepairPrecondition {
        procedure: procedure.to_string(),
        table: table.to_string(),
    }
    .into()
}

/// A row could not be safely copied or rewritten
pub fn data_integrity(
    procedure: &str,
    table: &str,
    row: Option<String>,
    reason: impl Into<String>,
) -> ExError {
    StoreError::DataIntegrity {
        procedure: procedure.to_string(),
        table: table.to_string(),
        row,
        reason: reason.into(),
    }
    .into()
}

/// Create a database error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Create a database error from sqlx::Error
pub fn from_sqlx(err: sqlx::Error) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("postgres")
        .with_message(err.to_string())
}

/// Create an IO error
pub fn io_error(operation: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}

/// Operation on a connection that was already closed
pub fn closed_store(label: &str) -> ExError {
    ExError::new(ExErrorKind::Internal)
        .with_op("store")
        .with_message(format!("store {} is closed", label))
}
