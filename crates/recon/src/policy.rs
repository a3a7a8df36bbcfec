use crate::config::ThresholdConfig;
use crate::model::{ConfidenceTier, MatchCandidate};

/// Gate for committing a match without human review.
#[derive(Debug, Clone, Copy)]
pub struct AutoMatchPolicy {
    auto_commit_above: f64,
}

impl AutoMatchPolicy {
    pub fn new(thresholds: &ThresholdConfig) -> Self {
        Self { auto_commit_above: thresholds.auto_commit_above }
    }

    /// The top candidate, if its score is strictly above the auto-commit
    /// threshold and its tier is `high`. A score exactly on the threshold is
    /// left for review even though it is already `high`.
    pub fn should_auto_commit<'a>(&self, ranked: &'a [MatchCandidate]) -> Option<&'a MatchCandidate> {
        let top = ranked.first()?;
        if top.score > self.auto_commit_above && top.confidence == ConfidenceTier::High {
            Some(top)
        } else {
            None
        }
    }
}

impl Default for AutoMatchPolicy {
    fn default() -> Self {
        Self::new(&ThresholdConfig::default())
    }
}
