use std::cmp::Ordering;

use crate::config::{MaterialityConfig, ReconConfig, ThresholdConfig};
use crate::evidence::matched_fields;
use crate::model::{Bid, ConfidenceTier, MatchCandidate, PaymentInflow};
use crate::scoring::ScoringModel;

/// Ranks candidate bids for a payment.
#[derive(Debug, Clone)]
pub struct MatchFinder {
    model: ScoringModel,
    thresholds: ThresholdConfig,
    materiality: MaterialityConfig,
}

impl MatchFinder {
    pub fn new(config: &ReconConfig) -> Self {
        Self {
            model: ScoringModel::new(config.weights, config.scoring),
            thresholds: config.thresholds,
            materiality: config.materiality,
        }
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    /// Score every awaiting-payment bid, keep those above the surface
    /// threshold, best first. Ties order by bid id.
    pub fn find_matches(&self, payment: &PaymentInflow, bids: &[Bid]) -> Vec<MatchCandidate> {
        let mut candidates: Vec<MatchCandidate> = bids
            .iter()
            .filter(|bid| bid.is_eligible())
            .filter_map(|bid| {
                let (score, signals) = self.model.score_detailed(payment, bid);
                if score <= self.thresholds.surface_above {
                    return None;
                }
                Some(MatchCandidate {
                    payment_id: payment.id.clone(),
                    bid_id: bid.id.clone(),
                    score,
                    confidence: confidence_tier(score, &self.thresholds),
                    matched_fields: matched_fields(payment, bid, &signals, &self.materiality),
                    signals,
                })
            })
            .collect();

        candidates.sort_by(rank_order);
        candidates
    }
}

impl Default for MatchFinder {
    fn default() -> Self {
        Self::new(&ReconConfig::default())
    }
}

/// `high` at or above `thresholds.high`, `medium` at or above
/// `thresholds.medium`, otherwise `low`.
pub fn confidence_tier(score: f64, thresholds: &ThresholdConfig) -> ConfidenceTier {
    if score >= thresholds.high {
        ConfidenceTier::High
    } else if score >= thresholds.medium {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

fn rank_order(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.bid_id.cmp(&b.bid_id))
}
