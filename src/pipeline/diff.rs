//! Change detection between published snapshots
//!
//! Compares the previously published snapshot against the freshly merged
//! one and produces the ordered change feed the visualization client
//! consumes: threshold crossings first, then by current threat score.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::cmp::Ordering;
use thiserror::Error;

use crate::config::{DiffConfig, DuplicateKeyPolicy};
use crate::models::{ChangeReason, ChangeRecord, Node, NodeState, Snapshot};

/// Score jumps at or above this magnitude are priority changes even when
/// the status tier did not move.
const SIGNIFICANT_DELTA: f64 = 0.2;

#[derive(Error, Debug)]
pub enum DiffError {
    #[error("duplicate node key '{0}' in snapshot")]
    DuplicateKey(String),
}

/// Compare two snapshots and return the ordered change records.
///
/// `prev = None` means first run: every keyable current node yields a
/// `new_node` record. Neither input is mutated; the result length is the
/// run's `event_seq`.
pub fn compute_changes(
    prev: Option<&Snapshot>,
    curr: &Snapshot,
    config: &DiffConfig,
    now: DateTime<Utc>,
) -> Result<Vec<ChangeRecord>, DiffError> {
    let empty = Snapshot::default();
    let prev = prev.unwrap_or(&empty);

    let prev_idx = index_nodes(prev, config.duplicate_keys)?;
    let curr_idx = index_nodes(curr, config.duplicate_keys)?;

    let mut changes = Vec::new();
    for (key, curr_node) in &curr_idx {
        let Some(prev_node) = prev_idx.get(key) else {
            changes.push(record(
                key,
                curr_node,
                None,
                NodeState::of(curr_node),
                true,
                ChangeReason::NewNode,
                now,
            ));
            continue;
        };

        let prev_state = NodeState::of(prev_node);
        let curr_state = NodeState::of(curr_node);
        let delta = (curr_state.threat_score - prev_state.threat_score).abs();

        // A movement exactly equal to delta_min is not a change.
        let score_changed = delta > config.delta_min;
        let status_changed = curr_state.status != prev_state.status;
        let version_changed = curr_state.version != prev_state.version;
        if !(score_changed || status_changed || version_changed) {
            continue;
        }

        let (reason, threshold_crossed) = if status_changed {
            (ChangeReason::StatusChange, true)
        } else if score_changed && delta >= SIGNIFICANT_DELTA {
            (ChangeReason::SignificantScoreDelta, true)
        } else if score_changed {
            (ChangeReason::ScoreDelta, false)
        } else {
            (ChangeReason::VersionUpdate, false)
        };

        changes.push(record(
            key,
            curr_node,
            Some(prev_state),
            curr_state,
            threshold_crossed,
            reason,
            now,
        ));
    }

    if config.emit_removals {
        for (key, prev_node) in &prev_idx {
            if curr_idx.contains_key(key) {
                continue;
            }
            let state = NodeState::of(prev_node);
            changes.push(record(
                key,
                prev_node,
                Some(state),
                state,
                true,
                ChangeReason::RemovedNode,
                now,
            ));
        }
    }

    // Stable sort: ties keep emission order.
    changes.sort_by(|a, b| {
        b.threshold_crossed
            .cmp(&a.threshold_crossed)
            .then_with(|| {
                b.curr
                    .threat_score
                    .partial_cmp(&a.curr.threat_score)
                    .unwrap_or(Ordering::Equal)
            })
    });
    Ok(changes)
}

fn record(
    key: &str,
    node: &Node,
    prev: Option<NodeState>,
    curr: NodeState,
    threshold_crossed: bool,
    reason: ChangeReason,
    now: DateTime<Utc>,
) -> ChangeRecord {
    ChangeRecord {
        entity: "node".to_string(),
        id: key.to_string(),
        network_id: node.network_id.clone(),
        prev,
        curr,
        threshold_crossed,
        reason,
        updated_at: node.updated_at.unwrap_or(now),
    }
}

/// Key-index a snapshot's nodes. Keyless nodes are skipped. Insertion
/// order of first occurrence is preserved; under `LastWins` a duplicate
/// replaces the earlier node in place, under `Reject` it aborts.
fn index_nodes(
    snapshot: &Snapshot,
    policy: DuplicateKeyPolicy,
) -> Result<IndexMap<String, &Node>, DiffError> {
    let mut index = IndexMap::new();
    for node in &snapshot.nodes {
        let Some(key) = node.key() else { continue };
        if index.insert(key.clone(), node).is_some() && policy == DuplicateKeyPolicy::Reject {
            return Err(DiffError::DuplicateKey(key));
        }
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn snapshot_from(value: serde_json::Value) -> Snapshot {
        serde_json::from_value(value).expect("snapshot json")
    }

    fn diff(
        prev: Option<&Snapshot>,
        curr: &Snapshot,
        config: &DiffConfig,
    ) -> Vec<ChangeRecord> {
        compute_changes(prev, curr, config, fixed_now()).expect("diff")
    }

    #[test]
    fn test_identical_snapshots_no_changes() {
        let snapshot = snapshot_from(json!({
            "nodes": [
                {"id": "h1", "threat_score": 0.4, "status": "benign", "version": 2},
                {"id": "h2", "threat_score": 0.9, "status": "malicious", "version": 7}
            ]
        }));
        let changes = diff(Some(&snapshot), &snapshot, &DiffConfig::default());
        assert!(changes.is_empty());
    }

    #[test]
    fn test_first_run_all_new_nodes() {
        let curr = snapshot_from(json!({
            "nodes": [
                {"id": "h1", "threat_score": 0.2, "status": "benign", "version": 1},
                {"id": "h2", "threat_score": 0.9, "status": "malicious", "version": 1},
                {"os": "linux"}
            ]
        }));
        let changes = diff(None, &curr, &DiffConfig::default());

        // The keyless third node is excluded entirely.
        assert_eq!(changes.len(), 2);
        for change in &changes {
            assert_eq!(change.entity, "node");
            assert_eq!(change.reason, ChangeReason::NewNode);
            assert!(change.threshold_crossed);
            assert!(change.prev.is_none());
        }
    }

    #[test]
    fn test_new_node_record_shape() {
        let prev = snapshot_from(json!({"nodes": []}));
        let curr = snapshot_from(json!({
            "nodes": [{"id": "h1", "threat_score": 0.9, "status": "malicious", "version": 1,
                       "network_id": "net_dmz"}]
        }));
        let changes = diff(Some(&prev), &curr, &DiffConfig::default());

        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert_eq!(change.id, "h1");
        assert_eq!(change.network_id.as_deref(), Some("net_dmz"));
        assert!(change.prev.is_none());
        assert_eq!(change.curr.threat_score, 0.9);
        assert_eq!(change.curr.status, Some(Status::Malicious));
        assert_eq!(change.reason, ChangeReason::NewNode);
        assert!(change.threshold_crossed);
    }

    #[test]
    fn test_status_change_takes_precedence() {
        // Score unchanged; the tier moved because thresholds changed
        // externally. Version bumped by the merge.
        let prev = snapshot_from(json!({
            "nodes": [{"id": "h1", "threat_score": 0.3, "status": "benign", "version": 1}]
        }));
        let curr = snapshot_from(json!({
            "nodes": [{"id": "h1", "threat_score": 0.3, "status": "suspicious", "version": 2}]
        }));
        let changes = diff(Some(&prev), &curr, &DiffConfig::default());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].reason, ChangeReason::StatusChange);
        assert!(changes[0].threshold_crossed);
    }

    #[test]
    fn test_significant_score_delta() {
        let prev = snapshot_from(json!({
            "nodes": [{"id": "h1", "threat_score": 0.10, "status": "benign", "version": 1}]
        }));
        let curr = snapshot_from(json!({
            "nodes": [{"id": "h1", "threat_score": 0.35, "status": "benign", "version": 2}]
        }));
        let changes = diff(Some(&prev), &curr, &DiffConfig::default());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].reason, ChangeReason::SignificantScoreDelta);
        assert!(changes[0].threshold_crossed);
    }

    #[test]
    fn test_small_score_delta() {
        let prev = snapshot_from(json!({
            "nodes": [{"id": "h1", "threat_score": 0.10, "status": "benign", "version": 1}]
        }));
        let curr = snapshot_from(json!({
            "nodes": [{"id": "h1", "threat_score": 0.15, "status": "benign", "version": 2}]
        }));
        let changes = diff(Some(&prev), &curr, &DiffConfig::default());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].reason, ChangeReason::ScoreDelta);
        assert!(!changes[0].threshold_crossed);
    }

    #[test]
    fn test_version_only_change() {
        let prev = snapshot_from(json!({
            "nodes": [{"id": "h1", "threat_score": 0.4, "status": "benign", "version": 1}]
        }));
        let curr = snapshot_from(json!({
            "nodes": [{"id": "h1", "threat_score": 0.4, "status": "benign", "version": 2}]
        }));
        let changes = diff(Some(&prev), &curr, &DiffConfig::default());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].reason, ChangeReason::VersionUpdate);
        assert!(!changes[0].threshold_crossed);
    }

    #[test]
    fn test_delta_equal_to_floor_is_not_a_change() {
        let prev = snapshot_from(json!({
            "nodes": [{"id": "h1", "threat_score": 0.40, "status": "benign", "version": 1}]
        }));
        let curr = snapshot_from(json!({
            "nodes": [{"id": "h1", "threat_score": 0.45, "status": "benign", "version": 1}]
        }));
        let config = DiffConfig {
            delta_min: 0.05,
            ..Default::default()
        };
        // |0.45 - 0.40| == delta_min: strictly-greater is required.
        let changes = diff(Some(&prev), &curr, &config);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_sorted_by_priority_then_score() {
        let prev = snapshot_from(json!({
            "nodes": [
                {"id": "low", "threat_score": 0.10, "status": "benign", "version": 1},
                {"id": "mid", "threat_score": 0.55, "status": "suspicious", "version": 1},
                {"id": "high", "threat_score": 0.70, "status": "suspicious", "version": 1}
            ]
        }));
        let curr = snapshot_from(json!({
            "nodes": [
                {"id": "low", "threat_score": 0.15, "status": "benign", "version": 2},
                {"id": "mid", "threat_score": 0.60, "status": "suspicious", "version": 2},
                {"id": "high", "threat_score": 0.85, "status": "malicious", "version": 2},
                {"id": "fresh", "threat_score": 0.30, "status": "benign", "version": 1}
            ]
        }));
        let changes = diff(Some(&prev), &curr, &DiffConfig::default());

        assert_eq!(changes.len(), 4);
        for pair in changes.windows(2) {
            assert!(pair[0].threshold_crossed >= pair[1].threshold_crossed);
            if pair[0].threshold_crossed == pair[1].threshold_crossed {
                assert!(pair[0].curr.threat_score >= pair[1].curr.threat_score);
            }
        }
        // Crossings first: the malicious flip (0.85) ahead of the new node (0.30).
        assert_eq!(changes[0].id, "high");
        assert_eq!(changes[1].id, "fresh");
    }

    #[test]
    fn test_removed_nodes_invisible_by_default() {
        let prev = snapshot_from(json!({
            "nodes": [
                {"id": "kept", "threat_score": 0.4, "status": "benign", "version": 1},
                {"id": "gone", "threat_score": 0.9, "status": "malicious", "version": 3}
            ]
        }));
        let curr = snapshot_from(json!({
            "nodes": [{"id": "kept", "threat_score": 0.4, "status": "benign", "version": 1}]
        }));
        let changes = diff(Some(&prev), &curr, &DiffConfig::default());
        assert!(changes.is_empty());
    }

    #[test]
    fn test_removed_nodes_reported_when_enabled() {
        let prev = snapshot_from(json!({
            "nodes": [
                {"id": "kept", "threat_score": 0.4, "status": "benign", "version": 1},
                {"id": "gone", "threat_score": 0.9, "status": "malicious", "version": 3}
            ]
        }));
        let curr = snapshot_from(json!({
            "nodes": [{"id": "kept", "threat_score": 0.4, "status": "benign", "version": 1}]
        }));
        let config = DiffConfig {
            emit_removals: true,
            ..Default::default()
        };
        let changes = diff(Some(&prev), &curr, &config);

        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert_eq!(change.id, "gone");
        assert_eq!(change.reason, ChangeReason::RemovedNode);
        assert!(change.threshold_crossed);
        assert_eq!(change.curr.threat_score, 0.9);
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let curr = snapshot_from(json!({
            "nodes": [
                {"id": "h1", "threat_score": 0.1, "status": "benign", "version": 1},
                {"id": "h1", "threat_score": 0.9, "status": "malicious", "version": 1}
            ]
        }));
        let changes = diff(None, &curr, &DiffConfig::default());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].curr.threat_score, 0.9);
    }

    #[test]
    fn test_duplicate_keys_rejected_when_configured() {
        let curr = snapshot_from(json!({
            "nodes": [{"id": "h1"}, {"id": "h1"}]
        }));
        let config = DiffConfig {
            duplicate_keys: DuplicateKeyPolicy::Reject,
            ..Default::default()
        };
        let err = compute_changes(None, &curr, &config, fixed_now()).expect_err("must reject");
        assert!(matches!(err, DiffError::DuplicateKey(key) if key == "h1"));
    }

    #[test]
    fn test_inputs_not_mutated() {
        let prev = snapshot_from(json!({
            "nodes": [{"id": "h1", "threat_score": 0.1, "status": "benign", "version": 1}]
        }));
        let curr = snapshot_from(json!({
            "nodes": [{"id": "h1", "threat_score": 0.9, "status": "malicious", "version": 2}]
        }));
        let prev_before = serde_json::to_value(&prev).unwrap();
        let curr_before = serde_json::to_value(&curr).unwrap();

        let _ = diff(Some(&prev), &curr, &DiffConfig::default());

        assert_eq!(serde_json::to_value(&prev).unwrap(), prev_before);
        assert_eq!(serde_json::to_value(&curr).unwrap(), curr_before);
    }

    #[test]
    fn test_record_uses_node_timestamp_when_present() {
        let curr = snapshot_from(json!({
            "nodes": [{"id": "h1", "threat_score": 0.5, "status": "suspicious", "version": 1,
                       "updated_at": "2025-05-30T08:00:00Z"}]
        }));
        let changes = diff(None, &curr, &DiffConfig::default());
        assert_eq!(
            changes[0].updated_at,
            Utc.with_ymd_and_hms(2025, 5, 30, 8, 0, 0).unwrap()
        );
    }
}
