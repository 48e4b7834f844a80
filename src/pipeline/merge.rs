//! Snapshot merger
//!
//! Applies a scoring run onto a snapshot: overwrites score and status,
//! bumps the per-node version when either materially changed, and stamps
//! timestamps. Version numbers are what lets the downstream consumer spot
//! meaningful movement without diffing full node payloads.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::config::Thresholds;
use crate::models::Snapshot;
use crate::scoring::classify;

/// Fallback network grouping for keys shorter than three characters.
const DEFAULT_NETWORK: &str = "net_default";

/// Merge scores into the snapshot in place.
///
/// For every keyable node with a score: the score and status are always
/// overwritten, the version is bumped by exactly one and `updated_at`
/// stamped iff the score or status actually changed. Nodes without a score
/// are left untouched. The snapshot's top-level `updated_at` is always
/// stamped to `now`. Deterministic given a fixed `now`; never drops or
/// fabricates nodes.
pub fn merge_scores(
    snapshot: &mut Snapshot,
    scores: &HashMap<String, f64>,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) {
    let mut bumped = 0usize;
    for node in &mut snapshot.nodes {
        let Some(key) = node.key() else { continue };
        let Some(&new_score) = scores.get(&key) else {
            continue;
        };

        let prev_score = node.threat_score.unwrap_or(0.0);
        let prev_status = node.status;
        let prev_version = node.version.unwrap_or(0);

        let new_status = classify(new_score, thresholds);
        if new_score != prev_score || Some(new_status) != prev_status {
            node.version = Some(prev_version + 1);
            node.updated_at = Some(now);
            bumped += 1;
        }

        if node.network_id.is_none() {
            node.network_id = Some(network_for(&key));
        }

        node.threat_score = Some(new_score);
        node.status = Some(new_status);
    }
    snapshot.updated_at = Some(now);
    debug!(nodes = snapshot.nodes.len(), bumped, "merged scores into snapshot");
}

/// Deterministic network grouping derived from the key prefix.
fn network_for(key: &str) -> String {
    let prefix: String = key.chars().take(3).collect();
    if prefix.chars().count() == 3 {
        format!("net_{prefix}")
    } else {
        DEFAULT_NETWORK.to_string()
    }
}
