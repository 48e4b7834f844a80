//! Core data models for netpulse
//!
//! Snapshots, nodes, change records, and the derived artifacts published
//! each run. Node payloads arrive with heterogeneous shapes, so every field
//! the pipeline does not own rides along untouched in `attrs` and snapshots
//! round-trip through a run without losing source data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields consulted for node identity, in priority order.
const KEY_FIELDS: [&str; 5] = ["id", "hostname", "name", "ip_address", "IP"];

/// Threat tier assigned to a node by the status classifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Benign,
    Suspicious,
    Malicious,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Benign => write!(f, "benign"),
            Status::Suspicious => write!(f, "suspicious"),
            Status::Malicious => write!(f, "malicious"),
        }
    }
}

/// A host in the network graph.
///
/// Only the fields the pipeline owns are typed; everything else the source
/// provides is preserved in `attrs` and written back verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Node {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

impl Node {
    /// Derive the node's unique key: the first non-empty value among `id`,
    /// `hostname`, `name`, `ip_address`, `IP`, in that order. Integer ids
    /// are rendered in decimal. Nodes with none of these fields are
    /// unkeyable and excluded from scoring and diffing.
    pub fn key(&self) -> Option<String> {
        for field in KEY_FIELDS {
            match self.attrs.get(field) {
                Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                Some(Value::Number(n)) => return Some(n.to_string()),
                _ => {}
            }
        }
        None
    }
}

/// The scored state of a node at one point in time, as carried in change
/// records (`prev`/`curr`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub threat_score: f64,
    pub status: Option<Status>,
    pub version: u64,
}

impl NodeState {
    /// Project a node onto its scored state, defaulting missing fields the
    /// same way the merger and differ read them.
    pub fn of(node: &Node) -> Self {
        Self {
            threat_score: node.threat_score.unwrap_or(0.0),
            status: node.status,
            version: node.version.unwrap_or(0),
        }
    }
}

/// A full point-in-time capture of the node/edge graph.
///
/// Edges are opaque to the pipeline and pass through unmodified, as do any
/// unknown top-level fields.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Snapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

/// Why a change record was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    NewNode,
    StatusChange,
    SignificantScoreDelta,
    ScoreDelta,
    VersionUpdate,
    RemovedNode,
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeReason::NewNode => write!(f, "new_node"),
            ChangeReason::StatusChange => write!(f, "status_change"),
            ChangeReason::SignificantScoreDelta => write!(f, "significant_score_delta"),
            ChangeReason::ScoreDelta => write!(f, "score_delta"),
            ChangeReason::VersionUpdate => write!(f, "version_update"),
            ChangeReason::RemovedNode => write!(f, "removed_node"),
        }
    }
}

/// One node-level difference between two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub entity: String,
    pub id: String,
    pub network_id: Option<String>,
    pub prev: Option<NodeState>,
    pub curr: NodeState,
    pub threshold_crossed: bool,
    pub reason: ChangeReason,
    pub updated_at: DateTime<Utc>,
}

/// The change feed produced by one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaDoc {
    pub run_id: String,
    pub snapshot_id: String,
    pub generated_at: DateTime<Utc>,
    pub changes: Vec<ChangeRecord>,
    pub event_seq: usize,
}

impl DeltaDoc {
    /// A fresh delta for `run_id`. `snapshot_id` stays empty until the
    /// publication step knows the snapshot's content revision.
    pub fn new(run_id: String, generated_at: DateTime<Utc>, changes: Vec<ChangeRecord>) -> Self {
        let event_seq = changes.len();
        Self {
            run_id,
            snapshot_id: String::new(),
            generated_at,
            changes,
            event_seq,
        }
    }
}

/// Pointer document identifying the latest published run, overwritten each
/// run so consumers can poll cheaply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateIndex {
    pub latest_run_id: String,
    pub latest_snapshot_id: String,
    pub latest_event_id: usize,
}

/// Render an artifact in its canonical on-store form: pretty-printed JSON,
/// two-space indent, trailing newline.
pub fn to_artifact_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut rendered = serde_json::to_string_pretty(value)?;
    rendered.push('\n');
    Ok(rendered)
}
