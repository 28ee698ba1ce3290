//! Flow node labels from BPMN definitions
//!
//! Only what the label backfill needs: each flow node's `name`, and the
//! `name` of the lane whose `flowNodeRef` list contains it.

use roxmltree::{Document, Node};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowNodeLabel {
    pub name: Option<String>,
    pub lane: Option<String>,
}

/// Flow node labels of one definition, by flow node id
#[derive(Debug, Clone, Default)]
pub struct DefinitionIndex {
    nodes: HashMap<String, FlowNodeLabel>,
}

fn is_flow_node(local_name: &str) -> bool {
    local_name.ends_with("Task")
        || local_name.ends_with("Event")
        || local_name.ends_with("Gateway")
        || matches!(
            local_name,
            "task" | "subProcess" | "callActivity" | "transaction"
        )
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn lane_refs<'a>(lane: Node<'a, 'a>) -> impl Iterator<Item = String> + 'a {
    lane.children()
        .filter(|n| n.is_element() && n.tag_name().name() == "flowNodeRef")
        .filter_map(|n| non_empty(n.text()))
}

impl DefinitionIndex {
    pub fn parse(xml: &str) -> Result<Self, roxmltree::Error> {
        let doc = Document::parse(xml)?;

        // Document order visits outer lanes before their child lane sets,
        // so a nested lane overwrites its parent's entry.
        let mut lanes: HashMap<String, String> = HashMap::new();
        for lane in doc
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "lane")
        {
            let Some(lane_name) = non_empty(lane.attribute("name")) else {
                continue;
            };
            for node_id in lane_refs(lane) {
                lanes.insert(node_id, lane_name.clone());
            }
        }

        let nodes = doc
            .descendants()
            .filter(|n| n.is_element() && is_flow_node(n.tag_name().name()))
            .filter_map(|n| {
                let id = n.attribute("id")?.to_string();
                let label = FlowNodeLabel {
                    name: non_empty(n.attribute("name")),
                    lane: lanes.get(&id).cloned(),
                };
                Some((id, label))
            })
            .collect();

        Ok(Self { nodes })
    }

    pub fn get(&self, flow_node_id: &str) -> Option<&FlowNodeLabel> {
        self.nodes.get(flow_node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
