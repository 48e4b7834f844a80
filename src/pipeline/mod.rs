//! The scoring pipeline
//!
//! One run: fetch the source graph, score it, merge the scores into the
//! snapshot, diff against the previously published snapshot, and publish
//! the artifact set. A run is strictly sequential; concurrent runs against
//! the same output store race on the publication writes and are expected
//! to be serialized externally.

mod diff;
mod merge;
mod publish;

pub use diff::{compute_changes, DiffError};
pub use merge::merge_scores;
pub use publish::{Artifact, PublishError, PublishReceipt, Publisher};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Settings;
use crate::models::{DeltaDoc, Snapshot};
use crate::scoring::{validate_scores, Scorer, ScoringError};
use crate::store::{SnapshotStore, StoreError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to fetch source snapshot: {0}")]
    Fetch(#[source] StoreError),

    #[error("source snapshot is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// What the run does after computing the delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// Compute only; no writes.
    DryRun,
    /// Full four-artifact publication.
    Commit,
    /// Write only the merged snapshot, to the sandbox path.
    Sandbox,
}

/// Everything one run computed, published or not.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub snapshot: Snapshot,
    pub scores: HashMap<String, f64>,
    pub delta: DeltaDoc,
    pub receipt: Option<PublishReceipt>,
}

/// One fetch → score → merge → diff → publish sequence.
pub struct Pipeline<'a, S: SnapshotStore> {
    source: &'a S,
    output: &'a S,
    scorer: &'a dyn Scorer,
    settings: &'a Settings,
}

impl<'a, S: SnapshotStore> Pipeline<'a, S> {
    pub fn new(
        source: &'a S,
        output: &'a S,
        scorer: &'a dyn Scorer,
        settings: &'a Settings,
    ) -> Self {
        Self {
            source,
            output,
            scorer,
            settings,
        }
    }

    /// Execute one run at the current wall clock.
    pub fn run(&self, mode: PublishMode) -> Result<RunOutcome, PipelineError> {
        self.run_at(Utc::now(), mode)
    }

    /// `run` with an injected clock; the run is deterministic given `now`,
    /// the store contents, and the scorer.
    pub fn run_at(&self, now: DateTime<Utc>, mode: PublishMode) -> Result<RunOutcome, PipelineError> {
        let run_id = run_id_for(now);

        let blob = self
            .source
            .read(&self.settings.source.path)
            .map_err(PipelineError::Fetch)?;
        let mut snapshot: Snapshot =
            serde_json::from_str(&blob.content).map_err(PipelineError::Decode)?;
        info!(
            nodes = snapshot.nodes.len(),
            edges = snapshot.edges.len(),
            revision = %blob.revision,
            "fetched source snapshot"
        );

        let scores = self.scorer.score(&snapshot.nodes)?;
        validate_scores(&scores)?;

        merge_scores(&mut snapshot, &scores, &self.settings.thresholds, now);

        let prev = self.previous_snapshot();
        let changes = compute_changes(prev.as_ref(), &snapshot, &self.settings.diff, now)?;
        info!(run_id = %run_id, changes = changes.len(), "computed change records");

        let mut delta = DeltaDoc::new(run_id.clone(), now, changes);

        let receipt = match mode {
            PublishMode::DryRun => None,
            PublishMode::Commit => {
                let publisher = Publisher::new(self.output, &self.settings.output);
                Some(publisher.publish(&snapshot, &mut delta, &run_id)?)
            }
            PublishMode::Sandbox => {
                let publisher = Publisher::new(self.output, &self.settings.output);
                Some(publisher.publish_sandbox(&snapshot, &run_id)?)
            }
        };

        Ok(RunOutcome {
            run_id,
            generated_at: now,
            snapshot,
            scores,
            delta,
            receipt,
        })
    }

    /// The previously published snapshot, if readable. Any failure here
    /// downgrades to first-run semantics instead of aborting.
    fn previous_snapshot(&self) -> Option<Snapshot> {
        let path = &self.settings.output.snapshot_path;
        match self.output.read(path) {
            Ok(blob) => match serde_json::from_str(&blob.content) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(path = %path, error = %e, "previous snapshot unreadable, treating as first run");
                    None
                }
            },
            Err(StoreError::NotFound { .. }) => None,
            Err(e) => {
                warn!(path = %path, error = %e, "previous snapshot fetch failed, treating as first run");
                None
            }
        }
    }
}

/// Run ids are sortable UTC timestamps, `:` replaced with `-` so they are
/// safe as file names: `YYYY-MM-DDTHH-MM-SSZ`.
pub fn run_id_for(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H-%M-%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_id_format() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 9, 5, 30).unwrap();
        assert_eq!(run_id_for(now), "2025-06-01T09-05-30Z");
    }

    #[test]
    fn test_run_ids_sort_chronologically() {
        let earlier = run_id_for(Utc.with_ymd_and_hms(2025, 6, 1, 23, 59, 59).unwrap());
        let later = run_id_for(Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap());
        assert!(earlier < later);
    }
}
