//! Placeholder scoring model
//!
//! Derives a stable pseudo-score from each node key so the pipeline can run
//! end-to-end before a real model is wired in: same key, same score, across
//! runs and hosts. Strictly a stand-in behind the [`Scorer`] trait.

use std::collections::HashMap;

use super::{Scorer, ScoringError};
use crate::models::Node;

#[derive(Debug, Clone, Copy, Default)]
pub struct StubScorer;

impl Scorer for StubScorer {
    fn score(&self, nodes: &[Node]) -> Result<HashMap<String, f64>, ScoringError> {
        let mut scores = HashMap::new();
        for node in nodes {
            let Some(key) = node.key() else { continue };
            let score = stable_score(&key);
            scores.insert(key, score);
        }
        Ok(scores)
    }
}

/// Hash-derived score in [0, 0.99].
///
/// md5 keeps the value identical across Rust versions; DefaultHasher is
/// intentionally not stable across compiler releases.
fn stable_score(key: &str) -> f64 {
    let digest = md5::compute(key.as_bytes());
    f64::from(u16::from_be_bytes([digest[0], digest[1]]) % 100) / 100.0
}
