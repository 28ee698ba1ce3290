//! The fixed set of logical repositories

use crate::errors::{configuration_error, Result};
use std::fmt;
use std::str::FromStr;

/// A logical data domain, independent of the physical store holding it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Repository {
    Correlation,
    ExternalTask,
    FlowNodeInstance,
    ProcessModel,
}

impl Repository {
    /// Every repository, in the order the boot pass migrates them
    pub const ALL: [Repository; 4] = [
        Repository::Correlation,
        Repository::ExternalTask,
        Repository::FlowNodeInstance,
        Repository::ProcessModel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Repository::Correlation => "correlation",
            Repository::ExternalTask => "external_task",
            Repository::FlowNodeInstance => "flow_node_instance",
            Repository::ProcessModel => "process_model",
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Repository {
    type Err = procstore_core::ExError;

    fn from_str(s: &str) -> Result<Self> {
        Repository::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| configuration_error(format!("unknown repository '{}'", s)))
    }
}
