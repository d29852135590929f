//! In-memory lineage ledger.
//!
//! An append-only `LineageRecorder` that keeps every accepted event and can
//! walk the chain from any node back to its run's root. Used by the CLI when
//! no lineage service endpoint is configured, and by tests that need to
//! assert on the exact lineage a run produced.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use super::event::{LineageAck, LineageAction, LineageEvent};
use super::recorder::LineageRecorder;
use crate::error::LineageError;

/// One accepted event together with the node id it was assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageRecord {
    pub node_id: String,
    #[serde(flatten)]
    pub event: LineageEvent,
}

#[derive(Debug, Default)]
struct LedgerState {
    records: Vec<LineageRecord>,
    by_node: HashMap<String, usize>,
}

/// Append-only in-memory lineage store.
#[derive(Debug, Default)]
pub struct InMemoryLineageLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLineageLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in the order they were accepted.
    pub fn records(&self) -> Vec<LineageRecord> {
        self.read().records.clone()
    }

    /// All events in the order they were accepted.
    pub fn events(&self) -> Vec<LineageEvent> {
        self.read().records.iter().map(|r| r.event.clone()).collect()
    }

    /// The action of every accepted event, in order.
    pub fn actions(&self) -> Vec<LineageAction> {
        self.read().records.iter().map(|r| r.event.action).collect()
    }

    /// Records belonging to the run identified by `root_id`.
    pub fn records_for_root(&self, root_id: &str) -> Vec<LineageRecord> {
        self.read()
            .records
            .iter()
            .filter(|r| r.event.root_id == root_id)
            .cloned()
            .collect()
    }

    /// Events belonging to the run identified by `root_id`.
    pub fn events_for_root(&self, root_id: &str) -> Vec<LineageEvent> {
        self.records_for_root(root_id)
            .into_iter()
            .map(|r| r.event)
            .collect()
    }

    /// Looks up the record for `node_id`.
    pub fn get(&self, node_id: &str) -> Option<LineageRecord> {
        let state = self.read();
        state
            .by_node
            .get(node_id)
            .map(|&idx| state.records[idx].clone())
    }

    /// Number of accepted records.
    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ancestry of `node_id`, starting at the node and ending at the first
    /// record whose parent is not in the ledger (normally the run's
    /// `RAW_DATA_INPUT` record, whose parent is the root id).
    ///
    /// Returns an empty vector for unknown nodes.
    pub fn trace(&self, node_id: &str) -> Vec<LineageRecord> {
        let state = self.read();
        let mut chain = Vec::new();
        let mut current = state.by_node.get(node_id).copied();

        while let Some(idx) = current {
            let record = &state.records[idx];
            chain.push(record.clone());
            // Bounded by ledger size.
            if chain.len() > state.records.len() {
                break;
            }
            current = state.by_node.get(&record.event.parent_id).copied();
        }

        chain
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LineageRecorder for InMemoryLineageLedger {
    async fn record(&self, event: &LineageEvent) -> Result<LineageAck, LineageError> {
        let node_id = Uuid::new_v4().to_string();
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let idx = state.records.len();
        state.records.push(LineageRecord {
            node_id: node_id.clone(),
            event: event.clone(),
        });
        state.by_node.insert(node_id.clone(), idx);

        Ok(LineageAck::new(node_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lineage::LineageScope;

    #[tokio::test]
    async fn test_ledger_appends_in_order() {
        let ledger = InMemoryLineageLedger::new();
        assert!(ledger.is_empty());

        let scope = LineageScope::new("root", "root", "s3");
        ledger
            .record(&scope.event(LineageAction::RawDataInput, "s3://raw/a.csv"))
            .await
            .unwrap();
        ledger
            .record(&scope.event(LineageAction::DqCheckFail, "s3://raw/a.csv"))
            .await
            .unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(
            ledger.actions(),
            vec![LineageAction::RawDataInput, LineageAction::DqCheckFail]
        );
    }

    #[tokio::test]
    async fn test_trace_walks_to_root() {
        let ledger = InMemoryLineageLedger::new();

        let raw = ledger
            .record(
                &LineageScope::new("root", "root", "s3")
                    .event(LineageAction::RawDataInput, "s3://raw/a.csv"),
            )
            .await
            .unwrap();
        let pass = ledger
            .record(
                &LineageScope::new("root", &raw.node_id, "s3")
                    .event(LineageAction::DqCheckPass, "s3://raw/a.csv"),
            )
            .await
            .unwrap();
        let split = ledger
            .record(
                &LineageScope::new("root", &pass.node_id, "s3")
                    .event(LineageAction::GlueBatchSplit, "s3://t/root"),
            )
            .await
            .unwrap();

        let chain = ledger.trace(&split.node_id);
        let actions: Vec<_> = chain.iter().map(|r| r.event.action).collect();
        assert_eq!(
            actions,
            vec![
                LineageAction::GlueBatchSplit,
                LineageAction::DqCheckPass,
                LineageAction::RawDataInput
            ]
        );
        assert_eq!(chain.last().unwrap().event.parent_id, "root");
    }

    #[tokio::test]
    async fn test_trace_unknown_node_is_empty() {
        let ledger = InMemoryLineageLedger::new();
        assert!(ledger.trace("missing").is_empty());
        assert!(ledger.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_records_for_root_filters_runs() {
        let ledger = InMemoryLineageLedger::new();
        ledger
            .record(
                &LineageScope::new("a", "a", "s3")
                    .event(LineageAction::RawDataInput, "s3://raw/a"),
            )
            .await
            .unwrap();
        ledger
            .record(
                &LineageScope::new("b", "b", "s3")
                    .event(LineageAction::RawDataInput, "s3://raw/b"),
            )
            .await
            .unwrap();

        let for_a = ledger.records_for_root("a");
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].event.storage_location, "s3://raw/a");
    }
}
