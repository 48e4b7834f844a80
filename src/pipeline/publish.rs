//! Publication coordinator
//!
//! Writes the four run artifacts to the output store in a fixed order:
//! full snapshot, latest delta, history delta, state index. Every write is
//! an optimistic create-or-update that re-fetches the path's revision just
//! before writing. There is no cross-artifact transaction: a failure
//! mid-sequence leaves the earlier artifacts live and is reported, not
//! rolled back. The state index lands last and is the consumer-visible
//! commit point.

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::OutputConfig;
use crate::models::{to_artifact_json, DeltaDoc, Snapshot, StateIndex};
use crate::store::{SnapshotStore, StoreError};

/// The four artifacts of a publication, in write order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Snapshot,
    LatestDelta,
    HistoryDelta,
    StateIndex,
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Artifact::Snapshot => write!(f, "full snapshot"),
            Artifact::LatestDelta => write!(f, "latest delta"),
            Artifact::HistoryDelta => write!(f, "history delta"),
            Artifact::StateIndex => write!(f, "state index"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to publish {artifact} to {path}: {source}")]
    Write {
        artifact: Artifact,
        path: String,
        /// Last artifact that did land, for manual reconciliation.
        last_published: Option<Artifact>,
        #[source]
        source: StoreError,
    },

    #[error("failed to encode {artifact}: {source}")]
    Encode {
        artifact: Artifact,
        #[source]
        source: serde_json::Error,
    },
}

/// Receipt of a completed publication.
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    pub run_id: String,
    /// Content revision of the published snapshot.
    pub snapshot_id: String,
    /// History file for this run, `None` for sandbox publications.
    pub history_path: Option<String>,
}

/// Coordinates the artifact writes of one run against the output store.
pub struct Publisher<'a, S: SnapshotStore> {
    store: &'a S,
    output: &'a OutputConfig,
}

impl<'a, S: SnapshotStore> Publisher<'a, S> {
    pub fn new(store: &'a S, output: &'a OutputConfig) -> Self {
        Self { store, output }
    }

    /// Publish a full run: snapshot, latest delta, history delta, state
    /// index. Stamps `delta.snapshot_id` with the snapshot's new content
    /// revision before the delta is written.
    pub fn publish(
        &self,
        snapshot: &Snapshot,
        delta: &mut DeltaDoc,
        run_id: &str,
    ) -> Result<PublishReceipt, PublishError> {
        let message = format!("pipeline: update threat scores ({run_id})");
        let mut last_published = None;

        let snapshot_id = self.write_artifact(
            Artifact::Snapshot,
            &self.output.snapshot_path,
            snapshot,
            &message,
            last_published,
        )?;
        last_published = Some(Artifact::Snapshot);
        delta.snapshot_id = snapshot_id.clone();

        self.write_artifact(
            Artifact::LatestDelta,
            &self.output.changes_latest,
            delta,
            &message,
            last_published,
        )?;
        last_published = Some(Artifact::LatestDelta);

        // Append-only history; a same-second run_id collision is
        // last-write-wins.
        let history_path = format!(
            "{}/{run_id}.json",
            self.output.changes_history_dir.trim_end_matches('/')
        );
        self.write_artifact(
            Artifact::HistoryDelta,
            &history_path,
            delta,
            &message,
            last_published,
        )?;
        last_published = Some(Artifact::HistoryDelta);

        let index = StateIndex {
            latest_run_id: run_id.to_string(),
            latest_snapshot_id: snapshot_id.clone(),
            latest_event_id: delta.event_seq,
        };
        self.write_artifact(
            Artifact::StateIndex,
            &self.output.state_index,
            &index,
            &message,
            last_published,
        )?;

        info!(
            run_id,
            snapshot_id = %snapshot_id,
            events = delta.event_seq,
            "published run artifacts"
        );
        Ok(PublishReceipt {
            run_id: run_id.to_string(),
            snapshot_id,
            history_path: Some(history_path),
        })
    }

    /// Write only the merged snapshot, to the sandbox path. The canonical
    /// snapshot, change feed, and state index stay untouched.
    pub fn publish_sandbox(
        &self,
        snapshot: &Snapshot,
        run_id: &str,
    ) -> Result<PublishReceipt, PublishError> {
        let message = format!("pipeline: sandbox run ({run_id})");
        let snapshot_id = self.write_artifact(
            Artifact::Snapshot,
            &self.output.sandbox_path,
            snapshot,
            &message,
            None,
        )?;
        info!(run_id, snapshot_id = %snapshot_id, path = %self.output.sandbox_path, "published sandbox snapshot");
        Ok(PublishReceipt {
            run_id: run_id.to_string(),
            snapshot_id,
            history_path: None,
        })
    }

    /// Create-or-update one artifact, re-fetching the path's current
    /// revision immediately before the write.
    fn write_artifact<T: Serialize>(
        &self,
        artifact: Artifact,
        path: &str,
        value: &T,
        message: &str,
        last_published: Option<Artifact>,
    ) -> Result<String, PublishError> {
        let content =
            to_artifact_json(value).map_err(|source| PublishError::Encode { artifact, source })?;
        let wrap = |source: StoreError| PublishError::Write {
            artifact,
            path: path.to_string(),
            last_published,
            source,
        };
        let revision = self
            .store
            .read_optional(path)
            .map_err(wrap)?
            .map(|blob| blob.revision);
        self.store
            .write(path, &content, revision.as_deref(), message)
            .map_err(wrap)
    }
}
