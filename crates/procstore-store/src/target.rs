//! Store targets and connection descriptors
//!
//! A descriptor says how to reach one physical store. Its fingerprint is the
//! store's identity: two repositories whose descriptors fingerprint equal
//! live in the same physical database.

use crate::db::Dialect;
use crate::repository::Repository;
use procstore_types::Sensitive;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Engine family of a physical store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Single-writer file database
    Sqlite,
    /// Client/server relational database
    Postgres,
}

impl EngineKind {
    pub fn dialect(&self) -> Dialect {
        match self {
            EngineKind::Sqlite => Dialect::Sqlite,
            EngineKind::Postgres => Dialect::Postgres,
        }
    }
}

/// TLS negotiation for client/server stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SslMode {
    Disable,
    Prefer,
    Require,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "disable" => Some(SslMode::Disable),
            "prefer" => Some(SslMode::Prefer),
            "require" => Some(SslMode::Require),
            _ => None,
        }
    }
}

/// Dialect-specific connection flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialectFlags {
    Sqlite {
        journal_mode: String,
        foreign_keys: bool,
    },
    Postgres {
        ssl_mode: SslMode,
    },
}

/// Where the store lives
#[derive(Debug, Clone)]
pub enum StoreLocation {
    File(PathBuf),
    Server {
        host: String,
        port: u16,
        database: String,
        username: String,
        password: Sensitive<String>,
    },
}

/// Everything needed to open a physical store
#[derive(Debug, Clone)]
pub struct StoreDescriptor {
    pub engine: EngineKind,
    pub location: StoreLocation,
    pub flags: DialectFlags,
}

impl StoreDescriptor {
    /// Stable identity of the physical store (hex SHA-256)
    ///
    /// Covers engine, location and flags. Passwords are excluded: the same
    /// server, database and user is the same store whatever the credential.
    pub fn fingerprint(&self) -> String {
        let mut canonical = String::from(match self.engine {
            EngineKind::Sqlite => "sqlite",
            EngineKind::Postgres => "postgres",
        });
        match &self.location {
            StoreLocation::File(path) => {
                canonical.push('|');
                canonical.push_str(&path.to_string_lossy());
            }
            StoreLocation::Server {
                host,
                port,
                database,
                username,
                ..
            } => {
                canonical.push_str(&format!("|{}|{}|{}|{}", host, port, database, username));
            }
        }
        match &self.flags {
            DialectFlags::Sqlite {
                journal_mode,
                foreign_keys,
            } => {
                canonical.push_str(&format!(
                    "|journal_mode={}|foreign_keys={}",
                    journal_mode.to_ascii_uppercase(),
                    foreign_keys
                ));
            }
            DialectFlags::Postgres { ssl_mode } => {
                canonical.push_str(&format!("|ssl_mode={}", ssl_mode.as_str()));
            }
        }

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Whether both descriptors address the same physical store
    pub fn same_store(&self, other: &StoreDescriptor) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl fmt::Display for StoreDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            StoreLocation::File(path) => write!(f, "sqlite:{}", path.display()),
            StoreLocation::Server {
                host,
                port,
                database,
                username,
                ..
            } => write!(f, "postgres://{}@{}:{}/{}", username, host, port, database),
        }
    }
}

/// A repository bound to the store it resolved to
#[derive(Debug, Clone)]
pub struct StoreTarget {
    pub repository: Repository,
    pub descriptor: StoreDescriptor,
}

impl StoreTarget {
    pub fn fingerprint(&self) -> String {
        self.descriptor.fingerprint()
    }
}
