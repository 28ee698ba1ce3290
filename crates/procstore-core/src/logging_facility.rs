//! Structured logging facility
//!
//! - Single initialization point via `init(profile)`
//! - Canonical operation macros (`log_op_start!`, `log_op_end!`, `log_op_error!`)
//! - Test capture mode for deterministic assertions on boot logs
//!
//! # Usage
//!
//! ```rust
//! use procstore_core::logging_facility::{init, Profile};
//!
//! // Initialize once, before the boot migration pass
//! init(Profile::Development);
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
