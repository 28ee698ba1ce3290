//! procstore core - error and logging facilities
//!
//! Everything the boot-time migration pass reports goes through this crate:
//! - `errors`: the `StoreError` taxonomy and the structured `ExError` with stable codes
//! - `logging_facility`: subscriber initialisation, canonical op macros, test capture

pub mod errors;
pub mod logging_facility;

pub use errors::{ExError, ExErrorKind, StoreError};
