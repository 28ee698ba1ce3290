//! Canonical logging macros
//!
//! Every boot step (the whole pass, each repository's migration, each
//! repair) is bracketed by one start event and exactly one end or
//! end_error event carrying the same `op`. Callers must depend on
//! `procstore-types` and `tracing`.

/// Log the start of an operation
///
/// # Example
///
/// ```
/// # use procstore_core::log_op_start;
/// log_op_start!("migrate_repository", repository = "process_model");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = procstore_types::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = procstore_types::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// # Example
///
/// ```
/// # use procstore_core::log_op_end;
/// log_op_end!("migrate_repository", duration_ms = 42, applied = 2);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = procstore_types::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = procstore_types::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log the failed end of an operation
///
/// Accepts anything convertible into `ExError` (including a clone of one).
/// The repository, unit and table the error names are emitted as
/// `err_repository`, `err_unit` and `err_table`.
///
/// # Example
///
/// ```
/// # use procstore_core::log_op_error;
/// use procstore_core::{ExError, ExErrorKind};
///
/// let err = ExError::new(ExErrorKind::MigrationUnit)
///     .with_repository("process_model")
///     .with_unit("0002_add_hash_column");
/// log_op_error!("migrate_repository", err, duration_ms = 7);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        use $crate::errors::ExError;
        let ex_err: ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = procstore_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?ex_err.kind(),
            err_code = ex_err.code(),
            err_repository = ex_err.repository(),
            err_unit = ex_err.unit(),
            err_table = ex_err.table(),
            error = %ex_err,
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        use $crate::errors::ExError;
        let ex_err: ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = procstore_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?ex_err.kind(),
            err_code = ex_err.code(),
            err_repository = ex_err.repository(),
            err_unit = ex_err.unit(),
            err_table = ex_err.table(),
            error = %ex_err,
            $($field)*
        );
    }};
}
