// Integration tests for relocating stray tables between stores
// Covers: row-preserving move, retry after interruption, shared-store
// shortcut, guarded re-entry and contained failures

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::*;
use procstore_core::logging_facility::init_test_capture;
use procstore_store::boot;
use procstore_store::db::{SqlValue, SqliteStore, Store};
use procstore_store::repair::{RelocateStrayTables, RepairProcedure, RepairStatus, RepairSummary};
use procstore_store::{BootConfig, ConnectionManager};
use std::path::Path;
use tempfile::TempDir;

const RELOCATE: &str = "0001_relocate_stray_tables";

fn seed_stray_flow_node_tables(store: &SqliteStore) {
    store
        .execute_batch(
            r#"CREATE TABLE "FlowNodeInstances" (
                   "id" INTEGER PRIMARY KEY,
                   "flowNodeInstanceId" TEXT NOT NULL,
                   "flowNodeId" TEXT NOT NULL,
                   "processInstanceId" TEXT,
                   "state" TEXT,
                   "createdAt" TEXT
               );
               CREATE TABLE "ProcessTokens" (
                   "id" INTEGER PRIMARY KEY,
                   "flowNodeInstanceId" TEXT,
                   "type" TEXT,
                   "payload" TEXT,
                   "createdAt" TEXT
               );
               INSERT INTO "FlowNodeInstances" VALUES (1, 'fni-1', 'StartEvent_1', 'pi-1', 'finished', '2019-03-01T10:00:00Z');
               INSERT INTO "FlowNodeInstances" VALUES (2, 'fni-2', 'Task_Approve', 'pi-1', 'running', '2019-03-01T10:00:01Z');
               INSERT INTO "FlowNodeInstances" VALUES (3, 'fni-3', 'StartEvent_1', 'pi-2', 'finished', '2019-03-02T08:30:00Z');
               INSERT INTO "ProcessTokens" VALUES (10, 'fni-1', 'onExit', '{"order":"it''s 42"}', '2019-03-01T10:00:00Z');
               INSERT INTO "ProcessTokens" VALUES (11, 'fni-2', 'onEnter', NULL, '2019-03-01T10:00:01Z');"#,
        )
        .unwrap();
}

fn seed_stray_definitions(store: &SqliteStore) {
    store
        .execute_batch(
            r#"CREATE TABLE "ProcessDefinitions" (
                   "id" INTEGER PRIMARY KEY,
                   "name" TEXT NOT NULL,
                   "xml" TEXT NOT NULL,
                   "hash" TEXT
               );
               INSERT INTO "ProcessDefinitions" VALUES (7, 'Order_Process', '<definitions/>', 'h-7');"#,
        )
        .unwrap();
}

fn relocate_status(report: &procstore_store::BootReport) -> RepairStatus {
    report
        .repairs
        .iter()
        .find(|r| r.procedure == RELOCATE)
        .map(|r| r.status.clone())
        .unwrap()
}

fn migrate_only(config: &BootConfig) {
    let mut connections = ConnectionManager::default();
    boot::run_with_procedures(config, &mut connections, &[]).unwrap();
}

fn token_rows(store: &dyn Store) -> Vec<Vec<SqlValue>> {
    store
        .query(
            r#"SELECT "id", "flowNodeInstanceId", "type", "payload", "createdAt" FROM "ProcessTokens" ORDER BY "id""#,
            &[],
        )
        .unwrap()
        .into_iter()
        .map(|r| r.values().to_vec())
        .collect()
}

#[test]
fn test_stray_rows_move_to_owning_store() {
    // Given: stray tables in both directions, present before the first boot
    let data = TempDir::new().unwrap();
    seed_stray_flow_node_tables(&open_repository(data.path(), "process_model"));
    seed_stray_definitions(&open_repository(data.path(), "flow_node_instance"));
    let expected_tokens = token_rows(&open_repository(data.path(), "process_model"));

    // When: the boot pass runs
    let report = boot::run_with_defaults(&sqlite_env(data.path(), &[]), &shipped_migrations()).unwrap();

    // Then: every row arrived in its owning store with its values intact
    let flow_nodes = open_repository(data.path(), "flow_node_instance");
    let process_model = open_repository(data.path(), "process_model");
    assert_eq!(count(&flow_nodes, "FlowNodeInstances"), 3);
    assert_eq!(token_rows(&flow_nodes), expected_tokens);
    assert_eq!(count(&process_model, "ProcessDefinitions"), 1);
    let definition = process_model
        .query(r#"SELECT "id", "hash" FROM "ProcessDefinitions""#, &[])
        .unwrap();
    assert_eq!(definition[0].get("id"), Some(&SqlValue::Integer(7)));
    assert_eq!(definition[0].text("hash"), Some("h-7"));

    // And: the stray tables are gone
    assert!(!exists(&process_model, "FlowNodeInstances"));
    assert!(!exists(&process_model, "ProcessTokens"));
    assert!(!exists(&flow_nodes, "ProcessDefinitions"));

    // And: the marker sits in the home store
    match relocate_status(&report) {
        RepairStatus::Completed(summary) => {
            assert_eq!(summary.rows_copied, 6);
            assert_eq!(summary.rows_skipped, 0);
        }
        other => panic!("expected completed repair, got {:?}", other),
    }
    assert!(ledger_names(&process_model).contains(&format!("repair/{}", RELOCATE)));
}

#[test]
fn test_interrupted_relocation_resumes_without_duplicates() {
    // Given: schemas migrated, a stray table, and one row already copied
    // by an earlier attempt that never finished
    let data = TempDir::new().unwrap();
    let config = boot_config(&sqlite_env(data.path(), &[]), &shipped_migrations());
    migrate_only(&config);

    seed_stray_flow_node_tables(&open_repository(data.path(), "process_model"));
    open_repository(data.path(), "flow_node_instance")
        .execute_batch(
            r#"INSERT INTO "FlowNodeInstances" ("id", "flowNodeInstanceId", "flowNodeId", "processInstanceId", "state", "createdAt")
               VALUES (1, 'fni-1', 'StartEvent_1', 'pi-1', 'finished', '2019-03-01T10:00:00Z');"#,
        )
        .unwrap();

    // When: the repair runs again
    let mut connections = ConnectionManager::default();
    let report = boot::run(&config, &mut connections).unwrap();

    // Then: each row exists exactly once in the destination
    let flow_nodes = open_repository(data.path(), "flow_node_instance");
    assert_eq!(count(&flow_nodes, "FlowNodeInstances"), 3);
    assert_eq!(count(&flow_nodes, "ProcessTokens"), 2);
    match relocate_status(&report) {
        RepairStatus::Completed(RepairSummary {
            rows_copied,
            rows_skipped,
            ..
        }) => {
            assert_eq!(rows_copied, 4);
            assert_eq!(rows_skipped, 1);
        }
        other => panic!("expected completed repair, got {:?}", other),
    }
}

#[test]
fn test_shared_store_short_circuits_without_touching_data() {
    // Given: process_model and flow_node_instance resolve to one file
    let data = TempDir::new().unwrap();
    let config = boot_config(&shared_store_env(data.path()), &shipped_migrations());
    migrate_only(&config);

    let connector = RecordingConnector::new();
    let log = std::rc::Rc::clone(&connector.log);
    let mut connections = ConnectionManager::new(connector);
    let procedures: Vec<Box<dyn RepairProcedure>> = vec![Box::new(RelocateStrayTables)];

    // When: the relocation runs
    let report = boot::run_with_procedures(&config, &mut connections, &procedures).unwrap();

    // Then: it short-circuits, records its marker and never touches a data table
    assert!(matches!(relocate_status(&report), RepairStatus::SharedStore));
    assert!(statements_touching(&log, &DATA_TABLES).is_empty());
    assert!(ledger_names(&open_file(data.path(), "shared.sqlite"))
        .contains(&format!("repair/{}", RELOCATE)));
}

#[test]
fn test_applied_repairs_are_not_reentered() {
    // Given: a deployment that already booted once
    let data = TempDir::new().unwrap();
    seed_stray_flow_node_tables(&open_repository(data.path(), "process_model"));
    let config = boot_config(&sqlite_env(data.path(), &[]), &shipped_migrations());
    boot::run(&config, &mut ConnectionManager::default()).unwrap();

    // When: it boots again
    let connector = RecordingConnector::new();
    let log = std::rc::Rc::clone(&connector.log);
    let mut connections = ConnectionManager::new(connector);
    let report = boot::run(&config, &mut connections).unwrap();

    // Then: every repair is skipped on its guard alone
    assert!(report
        .repairs
        .iter()
        .all(|r| matches!(r.status, RepairStatus::AlreadyApplied)));
    assert!(statements_touching(&log, &DATA_TABLES).is_empty());
}

#[test]
fn test_empty_stray_table_is_dropped() {
    let data = TempDir::new().unwrap();
    open_repository(data.path(), "process_model")
        .execute_batch(r#"CREATE TABLE "ProcessTokens" ("id" INTEGER PRIMARY KEY, "payload" TEXT)"#)
        .unwrap();

    let report = boot::run_with_defaults(&sqlite_env(data.path(), &[]), &shipped_migrations()).unwrap();

    assert!(!exists(&open_repository(data.path(), "process_model"), "ProcessTokens"));
    match relocate_status(&report) {
        RepairStatus::Completed(summary) => {
            assert_eq!(summary.rows_copied, 0);
            assert_eq!(summary.tables_dropped, ["process_model.ProcessTokens"]);
        }
        other => panic!("expected completed repair, got {:?}", other),
    }
}

fn seed_incompatible_stray(dir: &Path) {
    open_repository(dir, "process_model")
        .execute_batch(
            r#"CREATE TABLE "ProcessTokens" ("id" INTEGER PRIMARY KEY, "legacyBlob" BLOB);
               INSERT INTO "ProcessTokens" VALUES (1, x'00ff');"#,
        )
        .unwrap();
}

#[test]
fn test_failed_repair_warns_and_retries_next_boot() {
    // Given: a stray table with a column the destination does not have
    let data = TempDir::new().unwrap();
    seed_incompatible_stray(data.path());
    let env = sqlite_env(data.path(), &[]);
    let capture = init_test_capture();

    // When: the boot pass runs
    let report = boot::run_with_defaults(&env, &shipped_migrations()).unwrap();

    // Then: boot succeeded, the repair failed with a data integrity error
    match relocate_status(&report) {
        RepairStatus::Failed(err) => {
            assert_eq!(err.code(), "ERR_DATA_INTEGRITY");
            assert_eq!(err.table(), Some("ProcessTokens"));
        }
        other => panic!("expected failed repair, got {:?}", other),
    }

    // And: a warning names procedure and table
    let warnings = capture.at_level(tracing::Level::WARN);
    assert!(warnings.iter().any(|w| w.field("procedure") == Some(RELOCATE)
        && w.field("table") == Some("ProcessTokens")));

    // And: nothing was marked or dropped, so the next boot tries again
    let process_model = open_repository(data.path(), "process_model");
    assert!(exists(&process_model, "ProcessTokens"));
    assert!(!ledger_names(&process_model).contains(&format!("repair/{}", RELOCATE)));

    let again = boot::run_with_defaults(&env, &shipped_migrations()).unwrap();
    assert!(relocate_status(&again).is_failed());
}

#[test]
fn test_colliding_id_with_different_row_keeps_stray_table() {
    // Given: the owning store already has its own definition under id 1,
    // and the stray table holds a different definition under the same id
    let data = TempDir::new().unwrap();
    let config = boot_config(&sqlite_env(data.path(), &[]), &shipped_migrations());
    migrate_only(&config);
    open_repository(data.path(), "process_model")
        .execute_batch(
            r#"INSERT INTO "ProcessDefinitions" ("id", "name", "xml", "hash")
               VALUES (1, 'Owned', '<definitions/>', 'h-owned');"#,
        )
        .unwrap();
    open_repository(data.path(), "flow_node_instance")
        .execute_batch(
            r#"CREATE TABLE "ProcessDefinitions" (
                   "id" INTEGER PRIMARY KEY,
                   "name" TEXT NOT NULL,
                   "xml" TEXT NOT NULL,
                   "hash" TEXT
               );
               INSERT INTO "ProcessDefinitions" VALUES (1, 'StrayOnly', '<definitions/>', 'h-stray');"#,
        )
        .unwrap();

    // When: the relocation runs
    let report = boot::run(&config, &mut ConnectionManager::default()).unwrap();

    // Then: it fails on the collision instead of counting the row as copied
    match relocate_status(&report) {
        RepairStatus::Failed(err) => {
            assert_eq!(err.code(), "ERR_DATA_INTEGRITY");
            assert_eq!(err.table(), Some("ProcessDefinitions"));
            assert!(err.message().contains("id=1"));
        }
        other => panic!("expected failed repair, got {:?}", other),
    }

    // And: the stray row survives and the owner's row is untouched
    let flow_nodes = open_repository(data.path(), "flow_node_instance");
    assert!(exists(&flow_nodes, "ProcessDefinitions"));
    let stray = flow_nodes
        .query(r#"SELECT "name" FROM "ProcessDefinitions""#, &[])
        .unwrap();
    assert_eq!(stray[0].text("name"), Some("StrayOnly"));

    let process_model = open_repository(data.path(), "process_model");
    let owned = process_model
        .query(r#"SELECT "name" FROM "ProcessDefinitions""#, &[])
        .unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].text("name"), Some("Owned"));
    assert!(!ledger_names(&process_model).contains(&format!("repair/{}", RELOCATE)));
}
