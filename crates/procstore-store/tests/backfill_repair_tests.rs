// Integration tests for backfilling flow node names and lanes
// Covers: lookup through correlation and definition stores, rows that
// cannot be resolved, malformed definitions

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::*;
use procstore_core::logging_facility::init_test_capture;
use procstore_store::boot;
use procstore_store::db::{SqlValue, Store};
use procstore_store::repair::{BackfillFlowNodeLabels, RepairProcedure, RepairStatus};
use procstore_store::{BootConfig, ConnectionManager};
use std::path::Path;
use tempfile::TempDir;

const BACKFILL: &str = "0002_backfill_flow_node_labels";

fn migrated(dir: &Path) -> BootConfig {
    let config = boot_config(&sqlite_env(dir, &[]), &shipped_migrations());
    boot::run_with_procedures(&config, &mut ConnectionManager::default(), &[]).unwrap();
    config
}

fn seed(dir: &Path, definition_xml: &str) {
    open_repository(dir, "correlation")
        .execute_batch(
            r#"INSERT INTO "Correlations" ("correlationId", "processInstanceId", "processModelHash")
               VALUES ('c-1', 'pi-1', 'h-order');
               INSERT INTO "Correlations" ("correlationId", "processInstanceId", "processModelHash")
               VALUES ('c-2', 'pi-2', 'h-deleted');"#,
        )
        .unwrap();

    open_repository(dir, "process_model")
        .execute(
            r#"INSERT INTO "ProcessDefinitions" ("name", "xml", "hash") VALUES (?1, ?2, ?3)"#,
            &[
                SqlValue::from("Order_Process"),
                SqlValue::from(definition_xml),
                SqlValue::from("h-order"),
            ],
        )
        .unwrap();

    open_repository(dir, "flow_node_instance")
        .execute_batch(
            r#"INSERT INTO "FlowNodeInstances" ("id", "flowNodeInstanceId", "flowNodeId", "processInstanceId")
               VALUES (1, 'fni-1', 'StartEvent_1', 'pi-1');
               INSERT INTO "FlowNodeInstances" ("id", "flowNodeInstanceId", "flowNodeId", "processInstanceId", "flowNodeName")
               VALUES (2, 'fni-2', 'Task_Approve', 'pi-1', 'Renamed by user');
               INSERT INTO "FlowNodeInstances" ("id", "flowNodeInstanceId", "flowNodeId", "processInstanceId")
               VALUES (3, 'fni-3', 'StartEvent_1', 'pi-unknown');
               INSERT INTO "FlowNodeInstances" ("id", "flowNodeInstanceId", "flowNodeId", "processInstanceId")
               VALUES (4, 'fni-4', 'StartEvent_1', 'pi-2');
               INSERT INTO "FlowNodeInstances" ("id", "flowNodeInstanceId", "flowNodeId", "processInstanceId", "flowNodeName", "flowNodeLane")
               VALUES (5, 'fni-5', 'EndEvent_1', 'pi-1', 'Done', 'Manual');"#,
        )
        .unwrap();
}

fn labels(store: &dyn Store, id: i64) -> (Option<String>, Option<String>) {
    let rows = store
        .query(
            r#"SELECT "flowNodeName", "flowNodeLane" FROM "FlowNodeInstances" WHERE "id" = ?1"#,
            &[SqlValue::Integer(id)],
        )
        .unwrap();
    (
        rows[0].text("flowNodeName").map(str::to_string),
        rows[0].text("flowNodeLane").map(str::to_string),
    )
}

fn backfill_only(config: &BootConfig) -> RepairStatus {
    let procedures: Vec<Box<dyn RepairProcedure>> = vec![Box::new(BackfillFlowNodeLabels)];
    let report =
        boot::run_with_procedures(config, &mut ConnectionManager::default(), &procedures).unwrap();
    report.repairs[0].status.clone()
}

fn some(value: &str) -> Option<String> {
    Some(value.to_string())
}

#[test]
fn test_labels_recovered_from_definition() {
    // Given: instances with missing labels and their correlation/definition
    let data = TempDir::new().unwrap();
    let config = migrated(data.path());
    seed(data.path(), ORDER_PROCESS_XML);
    let capture = init_test_capture();

    // When: the backfill runs
    let status = backfill_only(&config);

    // Then: missing labels are filled, existing ones kept
    let store = open_repository(data.path(), "flow_node_instance");
    assert_eq!(labels(&store, 1), (some("Order received"), some("Sales")));
    assert_eq!(labels(&store, 2), (some("Renamed by user"), some("Sales")));
    assert_eq!(labels(&store, 5), (some("Done"), some("Manual")));

    // And: unresolvable rows are left as they were, with a warning each
    assert_eq!(labels(&store, 3), (None, None));
    assert_eq!(labels(&store, 4), (None, None));
    let warned_rows: Vec<_> = capture
        .at_level(tracing::Level::WARN)
        .into_iter()
        .filter(|w| w.field("procedure") == Some(BACKFILL))
        .filter_map(|w| w.field("row").map(str::to_string))
        .collect();
    assert!(warned_rows.contains(&"3".to_string()));
    assert!(warned_rows.contains(&"4".to_string()));

    match status {
        RepairStatus::Completed(summary) => {
            assert_eq!(summary.rows_updated, 2);
            assert_eq!(summary.rows_skipped, 2);
        }
        other => panic!("expected completed repair, got {:?}", other),
    }
    assert!(ledger_names(&store).contains(&format!("repair/{}", BACKFILL)));
}

#[test]
fn test_malformed_definition_fails_the_repair_only() {
    let data = TempDir::new().unwrap();
    let config = migrated(data.path());
    seed(data.path(), "<bpmn:definitions><bpmn:process>");

    let status = backfill_only(&config);

    match status {
        RepairStatus::Failed(err) => {
            assert_eq!(err.code(), "ERR_DATA_INTEGRITY");
            assert_eq!(err.table(), Some("ProcessDefinitions"));
        }
        other => panic!("expected failed repair, got {:?}", other),
    }
    let store = open_repository(data.path(), "flow_node_instance");
    assert_eq!(labels(&store, 1), (None, None));
    assert!(!ledger_names(&store).contains(&format!("repair/{}", BACKFILL)));
}

#[test]
fn test_backfill_is_not_repeated() {
    let data = TempDir::new().unwrap();
    let config = migrated(data.path());
    seed(data.path(), ORDER_PROCESS_XML);

    backfill_only(&config);
    let second = backfill_only(&config);

    assert!(matches!(second, RepairStatus::AlreadyApplied));
}
