// Shared helpers for procstore-store integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use procstore_store::boot::BootConfig;
use procstore_store::connections::{Connector, DefaultConnector, StoreHandle};
use procstore_store::db::{Dialect, Row, SqlValue, SqliteStore, Store};
use procstore_store::errors::{connection_error, Result};
use procstore_store::target::StoreLocation;
use procstore_store::{StoreDescriptor, StoreEnvironment};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Units shipped with the crate
pub fn shipped_migrations() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

/// SQLite environment rooted at `dir`, plus extra `PROCSTORE_*` variables
pub fn sqlite_env(dir: &Path, extra: &[(&str, &str)]) -> StoreEnvironment {
    let mut env = StoreEnvironment::new().with_var("PROCSTORE_SQLITE__DIR", dir.to_string_lossy());
    for (key, value) in extra {
        env = env.with_var(*key, *value);
    }
    env
}

/// Environment where process_model and flow_node_instance share one file
pub fn shared_store_env(dir: &Path) -> StoreEnvironment {
    sqlite_env(
        dir,
        &[
            ("PROCSTORE_SQLITE__FILES__PROCESS_MODEL", "shared.sqlite"),
            ("PROCSTORE_SQLITE__FILES__FLOW_NODE_INSTANCE", "shared.sqlite"),
        ],
    )
}

pub fn boot_config(env: &StoreEnvironment, migrations_root: &Path) -> BootConfig {
    BootConfig {
        migrations_root: migrations_root.to_path_buf(),
        settings: env.load().unwrap(),
    }
}

/// Open a database file under `dir` directly
pub fn open_file(dir: &Path, file: &str) -> SqliteStore {
    SqliteStore::open(&dir.join(file), "WAL", true).unwrap()
}

/// Open a repository's default database file directly
pub fn open_repository(dir: &Path, repository: &str) -> SqliteStore {
    open_file(dir, &format!("{}.sqlite", repository))
}

pub fn ledger_names(store: &dyn Store) -> Vec<String> {
    procstore_store::migrations::ledger::entries(store)
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect()
}

pub fn count(store: &dyn Store, table: &str) -> i64 {
    procstore_store::db::count_rows(store, table).unwrap()
}

pub fn exists(store: &dyn Store, table: &str) -> bool {
    procstore_store::db::table_exists(store, table).unwrap()
}

/// One statement seen by a recording store
#[derive(Debug, Clone)]
pub struct Statement {
    pub store: String,
    pub sql: String,
}

pub type StatementLog = Rc<RefCell<Vec<Statement>>>;

/// Store wrapper that logs every statement before delegating
pub struct RecordingStore {
    inner: StoreHandle,
    log: StatementLog,
}

impl RecordingStore {
    fn record(&self, sql: &str) {
        self.log.borrow_mut().push(Statement {
            store: self.inner.label(),
            sql: sql.to_string(),
        });
    }
}

impl Store for RecordingStore {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn label(&self) -> String {
        self.inner.label()
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        self.record(sql);
        self.inner.execute_batch(sql)
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.record(sql);
        self.inner.execute(sql, params)
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.record(sql);
        self.inner.query(sql, params)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

/// Connector that opens real stores and records everything sent to them
#[derive(Default)]
pub struct RecordingConnector {
    pub log: StatementLog,
    pub opened: Rc<RefCell<Vec<String>>>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connector for RecordingConnector {
    fn open(&self, descriptor: &StoreDescriptor) -> Result<StoreHandle> {
        let inner = DefaultConnector.open(descriptor)?;
        self.opened.borrow_mut().push(descriptor.to_string());
        Ok(Rc::new(RecordingStore {
            inner,
            log: Rc::clone(&self.log),
        }))
    }
}

/// Connector that refuses the SQLite file of one repository
pub struct RefusingConnector {
    pub refuse: &'static str,
    pub opened: Rc<RefCell<Vec<String>>>,
}

impl RefusingConnector {
    pub fn new(refuse: &'static str) -> Self {
        Self {
            refuse,
            opened: Rc::default(),
        }
    }
}

impl Connector for RefusingConnector {
    fn open(&self, descriptor: &StoreDescriptor) -> Result<StoreHandle> {
        if let StoreLocation::File(path) = &descriptor.location {
            if path.file_stem().and_then(|s| s.to_str()) == Some(self.refuse) {
                return Err(connection_error(descriptor.to_string(), "unable to open database file"));
            }
        }
        self.opened.borrow_mut().push(descriptor.to_string());
        DefaultConnector.open(descriptor)
    }
}

/// Statements in `log` that mention any of `tables`
pub fn statements_touching(log: &StatementLog, tables: &[&str]) -> Vec<String> {
    log.borrow()
        .iter()
        .filter(|s| tables.iter().any(|t| s.sql.contains(&format!("\"{}\"", t))))
        .map(|s| s.sql.clone())
        .collect()
}

pub const DATA_TABLES: [&str; 5] = [
    "ProcessDefinitions",
    "FlowNodeInstances",
    "ProcessTokens",
    "Correlations",
    "ExternalTasks",
];

pub const ORDER_PROCESS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bpmn:definitions xmlns:bpmn="http://www.omg.org/spec/BPMN/20100524/MODEL" id="Definitions_1">
  <bpmn:process id="Order_Process" isExecutable="true">
    <bpmn:laneSet id="LaneSet_1">
      <bpmn:lane id="Lane_Sales" name="Sales">
        <bpmn:flowNodeRef>StartEvent_1</bpmn:flowNodeRef>
        <bpmn:flowNodeRef>Task_Approve</bpmn:flowNodeRef>
      </bpmn:lane>
    </bpmn:laneSet>
    <bpmn:startEvent id="StartEvent_1" name="Order received" />
    <bpmn:userTask id="Task_Approve" name="Approve order" />
    <bpmn:endEvent id="EndEvent_1" name="Done" />
  </bpmn:process>
</bpmn:definitions>"#;
