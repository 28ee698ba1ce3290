//! Types shared by the procstore facilities
//!
//! - **Schema constants**: canonical field keys and event names for structured logs
//! - **Sensitive data**: `Sensitive<T>` marker for credentials that must never be logged

pub mod schema;
pub mod sensitive;

pub use sensitive::Sensitive;
