//! Retrieval confidence gate
//!
//! Decides whether retrieved context is good enough to answer from.
//! The verdict depends on nothing but the chunk scores and the policy.

use crate::models::{clamp_score, ConfidenceVerdict, Decision, RetrievedChunk};

pub const NO_CONTEXT_RATIONALE: &str = "no context retrieved";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceEvaluator {
    threshold: f64,
    min_chunks: usize,
}

impl ConfidenceEvaluator {
    /// `threshold` is clamped into [0, 1]; `min_chunks` of 0 is treated as 1.
    pub fn new(threshold: f64, min_chunks: usize) -> Self {
        Self {
            threshold: clamp_score(threshold),
            min_chunks: min_chunks.max(1),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn min_chunks(&self) -> usize {
        self.min_chunks
    }

    /// Score a set of chunks. Arrival order does not matter; chunks are
    /// re-ranked by score before weighting.
    pub fn evaluate(&self, chunks: &[RetrievedChunk]) -> ConfidenceVerdict {
        let scores: Vec<f64> = chunks.iter().map(|c| c.score).collect();
        self.evaluate_scores(&scores)
    }

    pub fn evaluate_scores(&self, scores: &[f64]) -> ConfidenceVerdict {
        if scores.is_empty() {
            return ConfidenceVerdict {
                aggregate: 0.0,
                decision: Decision::Clarify,
                rationale: NO_CONTEXT_RATIONALE.to_string(),
                considered: 0,
            };
        }

        let mut ranked: Vec<f64> = scores.iter().map(|s| clamp_score(*s)).collect();
        ranked.sort_by(|a, b| b.total_cmp(a));
        ranked.truncate(self.min_chunks);

        let aggregate = rank_weighted_mean(&ranked);
        let best = ranked[0];
        let considered = ranked.len();

        let (decision, rationale) = if best <= 0.0 {
            (
                Decision::Clarify,
                "retrieved context has no similarity to the query".to_string(),
            )
        } else if best < self.threshold {
            (
                Decision::Clarify,
                format!(
                    "best match {:.2} is below threshold {:.2}",
                    best, self.threshold
                ),
            )
        } else if aggregate < self.threshold {
            (
                Decision::Clarify,
                format!(
                    "aggregate {:.2} over top {} chunk(s) is below threshold {:.2}",
                    aggregate, considered, self.threshold
                ),
            )
        } else {
            (
                Decision::Proceed,
                format!(
                    "aggregate {:.2} over top {} chunk(s) meets threshold {:.2}",
                    aggregate, considered, self.threshold
                ),
            )
        };

        ConfidenceVerdict {
            aggregate,
            decision,
            rationale,
            considered,
        }
    }
}

/// Weighted mean with weight 1/rank (rank starting at 1).
fn rank_weighted_mean(ranked: &[f64]) -> f64 {
    let (weighted, total_weight) = ranked
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sum, weights), (i, score)| {
            let w = 1.0 / (i as f64 + 1.0);
            (sum + w * score, weights + w)
        });

    if total_weight > 0.0 {
        weighted / total_weight
    } else {
        0.0
    }
}
