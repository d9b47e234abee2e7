//! Per-object outcomes streamed from plugin workers to the aggregator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PremisError;
use crate::model::{ArchivalObject, ObjectKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginState {
    Success,
    Failure,
    Running,
    Skipped,
}

impl PluginState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginState::Success => "SUCCESS",
            PluginState::Failure => "FAILURE",
            PluginState::Running => "RUNNING",
            PluginState::Skipped => "SKIPPED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, PremisError> {
        match value {
            "SUCCESS" => Ok(PluginState::Success),
            "FAILURE" => Ok(PluginState::Failure),
            "RUNNING" => Ok(PluginState::Running),
            "SKIPPED" => Ok(PluginState::Skipped),
            other => Err(PremisError::InvalidValue {
                field: "plugin state",
                value: other.to_string(),
            }),
        }
    }

    /// Whether the object counts as succeeded once its block has finished.
    /// A `RUNNING` item left at block end counts as failed.
    pub fn counts_as_success(&self) -> bool {
        matches!(self, PluginState::Success | PluginState::Skipped)
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportItem {
    pub object_id: String,
    pub object_kind: ObjectKind,
    pub state: PluginState,
    pub details: String,
    pub timestamp: DateTime<Utc>,
    /// Block that produced the item; stamped by the orchestrator.
    pub block_id: Option<u64>,
}

impl ReportItem {
    pub fn new(object: &ArchivalObject, state: PluginState, details: impl Into<String>) -> Self {
        Self::for_id(object.id(), object.kind(), state, details)
    }

    pub fn for_id(
        object_id: &str,
        object_kind: ObjectKind,
        state: PluginState,
        details: impl Into<String>,
    ) -> Self {
        Self {
            object_id: object_id.to_string(),
            object_kind,
            state,
            details: details.into(),
            timestamp: Utc::now(),
            block_id: None,
        }
    }

    pub fn success(object: &ArchivalObject) -> Self {
        Self::new(object, PluginState::Success, "")
    }

    pub fn failure(object: &ArchivalObject, details: impl Into<String>) -> Self {
        Self::new(object, PluginState::Failure, details)
    }
}

/// Ordered, append-only list of report items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub items: Vec<ReportItem>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: ReportItem) {
        self.items.push(item);
    }

    /// Appends another report, keeping arrival order.
    pub fn merge(&mut self, other: Report) {
        self.items.extend(other.items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn count(&self, state: PluginState) -> usize {
        self.items.iter().filter(|item| item.state == state).count()
    }
}

impl FromIterator<ReportItem> for Report {
    fn from_iter<I: IntoIterator<Item = ReportItem>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Aip;

    fn aip(id: &str) -> ArchivalObject {
        ArchivalObject::Aip(Aip {
            id: id.to_string(),
            ..Aip::default()
        })
    }

    #[test]
    fn test_merge_keeps_arrival_order() {
        let mut report: Report = vec![ReportItem::success(&aip("o3"))].into_iter().collect();
        report.merge(
            vec![
                ReportItem::success(&aip("o1")),
                ReportItem::failure(&aip("o2"), "bad"),
            ]
            .into_iter()
            .collect(),
        );
        let ids: Vec<_> = report.items.iter().map(|i| i.object_id.as_str()).collect();
        assert_eq!(ids, vec!["o3", "o1", "o2"]);
        assert_eq!(report.count(PluginState::Failure), 1);
    }

    #[test]
    fn test_state_accounting() {
        assert!(PluginState::Success.counts_as_success());
        assert!(PluginState::Skipped.counts_as_success());
        assert!(!PluginState::Failure.counts_as_success());
        assert!(!PluginState::Running.counts_as_success());
    }

    #[test]
    fn test_state_strings() {
        for state in [
            PluginState::Success,
            PluginState::Failure,
            PluginState::Running,
            PluginState::Skipped,
        ] {
            assert_eq!(PluginState::parse(state.as_str()).unwrap(), state);
        }
        assert_eq!(
            serde_json::to_string(&PluginState::Skipped).unwrap(),
            "\"SKIPPED\""
        );
    }
}
