//! Lineage event types.
//!
//! A lineage event links an artifact (identified by its storage location) to
//! the lineage node it was derived from and the action that produced it.
//! Events are immutable once built and are stored by the external lineage
//! service, never by the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The actions the workflow records lineage for.
///
/// Terminal success/failure is not recorded here; that belongs to whoever
/// observes the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineageAction {
    /// The raw input file entered the pipeline.
    RawDataInput,
    /// The raw file passed the data quality check.
    DqCheckPass,
    /// The raw file failed the data quality check.
    DqCheckFail,
    /// The bulk transform split the file into batches.
    GlueBatchSplit,
    /// One batch finished its emissions calculation.
    CalculationComplete,
}

impl LineageAction {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            LineageAction::RawDataInput => "RAW_DATA_INPUT",
            LineageAction::DqCheckPass => "DQ_CHECK_PASS",
            LineageAction::DqCheckFail => "DQ_CHECK_FAIL",
            LineageAction::GlueBatchSplit => "GLUE_BATCH_SPLIT",
            LineageAction::CalculationComplete => "CALCULATION_COMPLETE",
        }
    }
}

impl std::fmt::Display for LineageAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lineage record sent to the lineage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEvent {
    /// Identifier shared by every event of one run.
    pub root_id: String,
    /// Lineage node this event derives from.
    pub parent_id: String,
    /// Storage backend of the artifact (e.g. "s3").
    pub storage_type: String,
    /// Opaque location of the artifact.
    pub storage_location: String,
    /// What happened to the artifact.
    pub action: LineageAction,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

/// The chain position an event is recorded against.
///
/// Fan-out branches each receive a copy of the scope taken at the batch
/// split, so sibling batches never chain off one another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageScope {
    pub root_id: String,
    pub parent_id: String,
    pub storage_type: String,
}

impl LineageScope {
    /// Creates a new scope.
    pub fn new(
        root_id: impl Into<String>,
        parent_id: impl Into<String>,
        storage_type: impl Into<String>,
    ) -> Self {
        Self {
            root_id: root_id.into(),
            parent_id: parent_id.into(),
            storage_type: storage_type.into(),
        }
    }

    /// Builds an event for `action` on the artifact at `storage_location`,
    /// stamped with the current time.
    pub fn event(&self, action: LineageAction, storage_location: impl Into<String>) -> LineageEvent {
        LineageEvent {
            root_id: self.root_id.clone(),
            parent_id: self.parent_id.clone(),
            storage_type: self.storage_type.clone(),
            storage_location: storage_location.into(),
            action,
            timestamp: Utc::now(),
        }
    }
}

/// Acknowledgement from the lineage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageAck {
    /// Identifier of the lineage node created for the event.
    pub node_id: String,
}

impl LineageAck {
    /// Creates a new acknowledgement.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_names() {
        assert_eq!(LineageAction::RawDataInput.to_string(), "RAW_DATA_INPUT");
        assert_eq!(LineageAction::DqCheckPass.to_string(), "DQ_CHECK_PASS");
        assert_eq!(LineageAction::DqCheckFail.to_string(), "DQ_CHECK_FAIL");
        assert_eq!(LineageAction::GlueBatchSplit.to_string(), "GLUE_BATCH_SPLIT");
        assert_eq!(
            LineageAction::CalculationComplete.to_string(),
            "CALCULATION_COMPLETE"
        );
    }

    #[test]
    fn test_action_serde_matches_display() {
        let json = serde_json::to_string(&LineageAction::GlueBatchSplit).unwrap();
        assert_eq!(json, "\"GLUE_BATCH_SPLIT\"");

        let parsed: LineageAction = serde_json::from_str("\"DQ_CHECK_FAIL\"").unwrap();
        assert_eq!(parsed, LineageAction::DqCheckFail);
    }

    #[test]
    fn test_scope_builds_event() {
        let scope = LineageScope::new("root-1", "node-7", "s3");
        let event = scope.event(LineageAction::CalculationComplete, "s3://enriched/root-1/b1.json");

        assert_eq!(event.root_id, "root-1");
        assert_eq!(event.parent_id, "node-7");
        assert_eq!(event.storage_type, "s3");
        assert_eq!(event.storage_location, "s3://enriched/root-1/b1.json");
        assert_eq!(event.action, LineageAction::CalculationComplete);
    }

    #[test]
    fn test_event_json_shape() {
        let scope = LineageScope::new("r", "p", "s3");
        let event = scope.event(LineageAction::RawDataInput, "s3://raw/file.csv");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["root_id"], "r");
        assert_eq!(value["parent_id"], "p");
        assert_eq!(value["storage_type"], "s3");
        assert_eq!(value["storage_location"], "s3://raw/file.csv");
        assert_eq!(value["action"], "RAW_DATA_INPUT");
        assert!(value["timestamp"].is_string());
    }
}
