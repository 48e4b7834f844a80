//! Threat scoring
//!
//! The scoring model is an external capability behind the [`Scorer`] trait.
//! The pipeline relies only on the contract: given the snapshot's nodes,
//! produce a map from node key to a score in [0, 1]. Nodes without a
//! derivable key are skipped. `classify` maps scores onto threat tiers.

mod stub;

pub use stub::StubScorer;

use std::collections::HashMap;
use thiserror::Error;

use crate::config::Thresholds;
use crate::models::{Node, Status};

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("scoring model failed: {0}")]
    Model(String),

    #[error("score {score} for node '{key}' is outside [0, 1]")]
    OutOfRange { key: String, score: f64 },
}

/// External scoring capability: nodes in, `{key -> score}` out.
pub trait Scorer {
    fn score(&self, nodes: &[Node]) -> Result<HashMap<String, f64>, ScoringError>;
}

/// Map a score onto a threat tier using the configured thresholds.
pub fn classify(score: f64, thresholds: &Thresholds) -> Status {
    if score >= thresholds.malicious {
        Status::Malicious
    } else if score >= thresholds.suspicious {
        Status::Suspicious
    } else {
        Status::Benign
    }
}

/// Reject model output outside the unit interval before it reaches the
/// merger. NaN compares false against both bounds and is caught here too.
pub fn validate_scores(scores: &HashMap<String, f64>) -> Result<(), ScoringError> {
    for (key, &score) in scores {
        if !(0.0..=1.0).contains(&score) {
            return Err(ScoringError::OutOfRange {
                key: key.clone(),
                score,
            });
        }
    }
    Ok(())
}
