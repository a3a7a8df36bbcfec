use serde::Deserialize;

use crate::error::ReconError;

const WEIGHT_SUM_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Engine configuration. Every section has defaults, so an empty TOML
/// document yields the reference weights and thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub weights: WeightsConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub materiality: MaterialityConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

fn default_name() -> String {
    "default".into()
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            weights: WeightsConfig::default(),
            thresholds: ThresholdConfig::default(),
            scoring: ScoringConfig::default(),
            materiality: MaterialityConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl ReconConfig {
    /// Parse and validate a TOML config string.
    pub fn from_toml(s: &str) -> Result<Self, ReconError> {
        let config: Self = toml::from_str(s).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        self.weights.validate()?;

        let t = &self.thresholds;
        for (label, value) in [
            ("thresholds.surface_above", t.surface_above),
            ("thresholds.high", t.high),
            ("thresholds.medium", t.medium),
            ("thresholds.auto_commit_above", t.auto_commit_above),
            ("materiality.amount_ratio", self.materiality.amount_ratio),
            ("materiality.name_similarity", self.materiality.name_similarity),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ReconError::ConfigValidation(format!(
                    "{label} must be within [0, 1], got {value}"
                )));
            }
        }
        if t.medium > t.high {
            return Err(ReconError::ConfigValidation(format!(
                "thresholds.medium ({}) must not exceed thresholds.high ({})",
                t.medium, t.high
            )));
        }

        if !self.scoring.date_window_days.is_finite() || self.scoring.date_window_days <= 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "scoring.date_window_days must be positive, got {}",
                self.scoring.date_window_days
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

/// Per-signal weights. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightsConfig {
    #[serde(default = "default_amount_weight")]
    pub amount: f64,
    #[serde(default = "default_name_weight")]
    pub payer_name: f64,
    #[serde(default = "default_reference_weight")]
    pub reference: f64,
    #[serde(default = "default_date_weight")]
    pub date: f64,
}

fn default_amount_weight() -> f64 {
    0.40
}
fn default_name_weight() -> f64 {
    0.30
}
fn default_reference_weight() -> f64 {
    0.20
}
fn default_date_weight() -> f64 {
    0.10
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            amount: default_amount_weight(),
            payer_name: default_name_weight(),
            reference: default_reference_weight(),
            date: default_date_weight(),
        }
    }
}

impl WeightsConfig {
    pub fn total(&self) -> f64 {
        self.amount + self.payer_name + self.reference + self.date
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        for (label, w) in [
            ("amount", self.amount),
            ("payer_name", self.payer_name),
            ("reference", self.reference),
            ("date", self.date),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(ReconError::ConfigValidation(format!(
                    "weights.{label} must be a non-negative number, got {w}"
                )));
            }
        }
        let total = self.total();
        if (total - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ReconError::ConfigValidation(format!(
                "weights must sum to 1.0, got {total}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdConfig {
    /// Candidates at or below this score are never surfaced.
    #[serde(default = "default_surface_above")]
    pub surface_above: f64,
    /// Lower bound (inclusive) of the `high` confidence tier.
    #[serde(default = "default_high")]
    pub high: f64,
    /// Lower bound (inclusive) of the `medium` confidence tier.
    #[serde(default = "default_medium")]
    pub medium: f64,
    /// Auto-commit requires a score strictly above this value.
    #[serde(default = "default_auto_commit_above")]
    pub auto_commit_above: f64,
}

fn default_surface_above() -> f64 {
    0.3
}
fn default_high() -> f64 {
    0.8
}
fn default_medium() -> f64 {
    0.6
}
fn default_auto_commit_above() -> f64 {
    0.8
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            surface_above: default_surface_above(),
            high: default_high(),
            medium: default_medium(),
            auto_commit_above: default_auto_commit_above(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring + Materiality + Batch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    /// Date proximity decays linearly to 0 over this many days.
    #[serde(default = "default_date_window_days")]
    pub date_window_days: f64,
}

fn default_date_window_days() -> f64 {
    30.0
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { date_window_days: default_date_window_days() }
    }
}

/// Explanation-only thresholds for `MatchCandidate::matched_fields`.
/// Never used in scoring.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterialityConfig {
    #[serde(default = "default_amount_ratio")]
    pub amount_ratio: f64,
    #[serde(default = "default_name_similarity")]
    pub name_similarity: f64,
    #[serde(default = "default_date_days")]
    pub date_days: i64,
}

fn default_amount_ratio() -> f64 {
    0.05
}
fn default_name_similarity() -> f64 {
    0.8
}
fn default_date_days() -> i64 {
    7
}

impl Default for MaterialityConfig {
    fn default() -> Self {
        Self {
            amount_ratio: default_amount_ratio(),
            name_similarity: default_name_similarity(),
            date_days: default_date_days(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Scoring worker threads for a batch run. 0 = one per available CPU.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    1
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { workers: default_workers() }
    }
}

impl BatchConfig {
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            n => n,
        }
    }
}
