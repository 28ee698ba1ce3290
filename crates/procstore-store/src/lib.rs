//! procstore store - schema migration and data repair for the engine's
//! persistence layer
//!
//! Provides:
//! - Store target resolution from deployment settings (SQLite files or a
//!   shared PostgreSQL database)
//! - A reference-counted connection manager keyed by store fingerprint
//! - Ledger-tracked, transactional schema migrations per repository
//! - Guarded one-time data repairs
//! - The boot sequence tying them together

pub mod boot;
pub mod connections;
pub mod db;
pub mod errors;
pub mod migrations;
pub mod repair;
pub mod repository;
pub mod resolver;
pub mod target;

// Re-export key types
pub use boot::{BootConfig, BootReport};
pub use connections::{ConnectionManager, Connector, DefaultConnector, StoreHandle};
pub use errors::Result;
pub use repository::Repository;
pub use resolver::{DeploymentSettings, StoreEnvironment, StoreTargetResolver};
pub use target::{StoreDescriptor, StoreTarget};
