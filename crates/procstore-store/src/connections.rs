//! Connection manager
//!
//! Physical connections are cached by descriptor fingerprint and reference
//! counted, so repositories that share a store share one connection. The
//! manager is an ordinary value owned by the boot sequence; there is no
//! process-wide cache.

#![allow(clippy::result_large_err)]

use crate::db::{PostgresStore, SqliteStore, Store};
use crate::errors::{connection_error, Result};
use crate::target::{DialectFlags, StoreDescriptor, StoreLocation};
use procstore_core::ExErrorKind;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared handle to an open store
pub type StoreHandle = Rc<dyn Store>;

/// Opens physical connections
pub trait Connector {
    fn open(&self, descriptor: &StoreDescriptor) -> Result<StoreHandle>;
}

/// Opens SQLite files and PostgreSQL servers
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConnector;

impl Connector for DefaultConnector {
    fn open(&self, descriptor: &StoreDescriptor) -> Result<StoreHandle> {
        let opened: Result<StoreHandle> = match (&descriptor.location, &descriptor.flags) {
            (
                StoreLocation::File(path),
                DialectFlags::Sqlite {
                    journal_mode,
                    foreign_keys,
                },
            ) => SqliteStore::open(path, journal_mode, *foreign_keys)
                .map(|s| Rc::new(s) as StoreHandle),
            (
                StoreLocation::Server {
                    host,
                    port,
                    database,
                    username,
                    password,
                },
                DialectFlags::Postgres { ssl_mode },
            ) => PostgresStore::connect(host, *port, database, username, password.expose(), *ssl_mode)
                .map(|s| Rc::new(s) as StoreHandle),
            _ => Err(connection_error(
                descriptor.to_string(),
                "location and dialect flags belong to different engines",
            )),
        };

        opened.map_err(|err| {
            if err.kind() == ExErrorKind::Connection {
                err
            } else {
                connection_error(descriptor.to_string(), err.message()).with_source(err)
            }
        })
    }
}

struct CachedConnection {
    store: StoreHandle,
    refs: usize,
}

/// Reference-counted cache of open stores keyed by fingerprint
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    cache: HashMap<String, CachedConnection>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(DefaultConnector)
    }
}

impl ConnectionManager {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            cache: HashMap::new(),
        }
    }

    /// Connection for `descriptor`, opened on first use
    pub fn acquire(&mut self, descriptor: &StoreDescriptor) -> Result<StoreHandle> {
        let fingerprint = descriptor.fingerprint();
        if let Some(cached) = self.cache.get_mut(&fingerprint) {
            cached.refs += 1;
            tracing::debug!(
                store = %descriptor,
                refs = cached.refs,
                "reusing connection"
            );
            return Ok(Rc::clone(&cached.store));
        }

        let store = self.connector.open(descriptor)?;
        tracing::debug!(store = %descriptor, "opened connection");
        self.cache.insert(
            fingerprint,
            CachedConnection {
                store: Rc::clone(&store),
                refs: 1,
            },
        );
        Ok(store)
    }

    /// Give back one reference; the last one closes the connection
    pub fn release(&mut self, descriptor: &StoreDescriptor) -> Result<()> {
        let fingerprint = descriptor.fingerprint();
        let Some(cached) = self.cache.get_mut(&fingerprint) else {
            tracing::debug!(store = %descriptor, "release of unknown connection ignored");
            return Ok(());
        };

        cached.refs = cached.refs.saturating_sub(1);
        if cached.refs > 0 {
            return Ok(());
        }

        if let Some(cached) = self.cache.remove(&fingerprint) {
            tracing::debug!(store = %descriptor, "closing connection");
            cached.store.close()?;
        }
        Ok(())
    }

    /// Outstanding references to `descriptor`'s connection
    pub fn ref_count(&self, descriptor: &StoreDescriptor) -> usize {
        self.cache
            .get(&descriptor.fingerprint())
            .map_or(0, |c| c.refs)
    }

    /// Number of physical connections currently open
    pub fn open_connections(&self) -> usize {
        self.cache.len()
    }

    /// Close everything still open; reports the first failure after trying all
    pub fn close_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for (_, cached) in self.cache.drain() {
            if let Err(err) = cached.store.close() {
                tracing::warn!(store = %cached.store.label(), error = %err, "close failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
