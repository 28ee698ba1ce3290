//! Backfill of flow node names and lanes
//!
//! Older flow node instances were stored without `flowNodeName` and
//! `flowNodeLane`. Both can be recovered from the BPMN definition the
//! instance ran: instance -> correlation -> definition hash -> XML.

#![allow(clippy::result_large_err)]

use super::bpmn::DefinitionIndex;
use super::{RepairContext, RepairOutcome, RepairProcedure, RepairSummary};
use crate::db::{table_columns, Row, SqlValue, Store};
use crate::errors::{data_integrity, repair_precondition, Result};
use crate::repository::Repository;
use std::collections::HashMap;
use std::rc::Rc;

const FLOW_NODE_INSTANCES: &str = "FlowNodeInstances";
const CORRELATIONS: &str = "Correlations";
const PROCESS_DEFINITIONS: &str = "ProcessDefinitions";

const NAME_COLUMN: &str = "flowNodeName";
const LANE_COLUMN: &str = "flowNodeLane";

pub struct BackfillFlowNodeLabels;

impl RepairProcedure for BackfillFlowNodeLabels {
    fn name(&self) -> &'static str {
        "0002_backfill_flow_node_labels"
    }

    fn home(&self) -> Repository {
        Repository::FlowNodeInstance
    }

    fn run(&self, ctx: &mut RepairContext<'_>) -> Result<RepairOutcome> {
        let procedure = ctx.procedure();
        let instances = ctx.store(Repository::FlowNodeInstance)?;
        let correlations = ctx.store(Repository::Correlation)?;
        let definitions = ctx.store(Repository::ProcessModel)?;

        let columns = table_columns(instances.as_ref(), FLOW_NODE_INSTANCES)?;
        if columns.is_empty() {
            let skipped = repair_precondition(procedure, FLOW_NODE_INSTANCES);
            tracing::info!(procedure, reason = %skipped, "nothing to backfill");
            return Ok(RepairOutcome::Completed(RepairSummary::default()));
        }
        for required in [NAME_COLUMN, LANE_COLUMN] {
            if !columns.iter().any(|c| c == required) {
                return Err(data_integrity(
                    procedure,
                    FLOW_NODE_INSTANCES,
                    None,
                    format!("column '{}' is missing; schema not migrated", required),
                ));
            }
        }

        let mut backfill = Backfill {
            procedure,
            correlations: correlations.as_ref(),
            definitions: definitions.as_ref(),
            cache: HashMap::new(),
        };

        let rows = instances.fetch(&instances.dialect().select_where_any_null(
            FLOW_NODE_INSTANCES,
            &["id", "flowNodeId", "processInstanceId", NAME_COLUMN, LANE_COLUMN],
            &[NAME_COLUMN, LANE_COLUMN],
            "id",
        ))?;

        let mut summary = RepairSummary::default();
        for row in rows {
            if backfill.apply(instances.as_ref(), &row)? {
                summary.rows_updated += 1;
            } else {
                summary.rows_skipped += 1;
            }
        }
        Ok(RepairOutcome::Completed(summary))
    }
}

struct Backfill<'s> {
    procedure: &'static str,
    correlations: &'s dyn Store,
    definitions: &'s dyn Store,
    /// Parsed definitions by hash; `None` when no definition has that hash
    cache: HashMap<String, Option<Rc<DefinitionIndex>>>,
}

impl Backfill<'_> {
    /// Fill the row's missing labels; false when the row was left unmodified
    fn apply(&mut self, instances: &dyn Store, row: &Row) -> Result<bool> {
        let id = row.get("id").cloned().unwrap_or(SqlValue::Null);
        let (Some(flow_node_id), Some(process_instance_id)) =
            (row.text("flowNodeId"), row.text("processInstanceId"))
        else {
            tracing::warn!(procedure = self.procedure, row = %id, "flow node instance lacks ids; skipped");
            return Ok(false);
        };

        let Some(hash) = self.model_hash(process_instance_id)? else {
            tracing::warn!(
                procedure = self.procedure,
                row = %id,
                process_instance_id,
                "no correlation for process instance; skipped"
            );
            return Ok(false);
        };
        let Some(index) = self.definition(&hash)? else {
            tracing::warn!(
                procedure = self.procedure,
                row = %id,
                hash = %hash,
                "no process definition with this hash; skipped"
            );
            return Ok(false);
        };
        let Some(label) = index.get(flow_node_id) else {
            tracing::warn!(
                procedure = self.procedure,
                row = %id,
                flow_node_id,
                "flow node not found in definition; skipped"
            );
            return Ok(false);
        };

        let mut assignments = Vec::new();
        if row.get(NAME_COLUMN).map_or(true, SqlValue::is_null) {
            if let Some(name) = &label.name {
                assignments.push((NAME_COLUMN, SqlValue::from(name.as_str())));
            }
        }
        if row.get(LANE_COLUMN).map_or(true, SqlValue::is_null) {
            if let Some(lane) = &label.lane {
                assignments.push((LANE_COLUMN, SqlValue::from(lane.as_str())));
            }
        }
        if assignments.is_empty() {
            return Ok(false);
        }

        let update = instances
            .dialect()
            .update_where_eq(FLOW_NODE_INSTANCES, assignments, "id", id.clone());
        instances.run(&update).map_err(|err| {
            data_integrity(
                self.procedure,
                FLOW_NODE_INSTANCES,
                Some(format!("id={}", id)),
                err.message(),
            )
            .with_source(err)
        })?;
        Ok(true)
    }

    fn model_hash(&self, process_instance_id: &str) -> Result<Option<String>> {
        let query = self.correlations.dialect().select_where_eq(
            CORRELATIONS,
            &["processModelHash"],
            "processInstanceId",
            SqlValue::from(process_instance_id),
        );
        Ok(self
            .correlations
            .fetch(&query)?
            .iter()
            .find_map(|r| r.text("processModelHash").map(str::to_string)))
    }

    fn definition(&mut self, hash: &str) -> Result<Option<Rc<DefinitionIndex>>> {
        if let Some(cached) = self.cache.get(hash) {
            return Ok(cached.clone());
        }

        let query = self.definitions.dialect().select_where_eq(
            PROCESS_DEFINITIONS,
            &["xml"],
            "hash",
            SqlValue::from(hash),
        );
        let xml = self
            .definitions
            .fetch(&query)?
            .iter()
            .find_map(|r| r.text("xml").map(str::to_string));

        let index = match xml {
            None => None,
            Some(xml) => Some(Rc::new(DefinitionIndex::parse(&xml).map_err(|e| {
                data_integrity(
                    self.procedure,
                    PROCESS_DEFINITIONS,
                    Some(format!("hash={}", hash)),
                    format!("unparseable BPMN: {}", e),
                )
            })?)),
        };
        self.cache.insert(hash.to_string(), index.clone());
        Ok(index)
    }
}
