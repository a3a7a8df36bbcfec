//! Weighted composite score between one payment and one candidate bid.
//!
//! Four signals: amount proximity, payer-name similarity, reference-code
//! similarity, date proximity. Missing data scores 0 and its weight stays in
//! the denominator, so absent evidence counts against a candidate.

use chrono::{DateTime, Utc};

use crate::config::{ScoringConfig, WeightsConfig};
use crate::model::{Bid, PaymentInflow, SignalScores};
use crate::similarity::{is_blank, similarity};

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy)]
pub struct ScoringModel {
    weights: WeightsConfig,
    date_window_days: f64,
}

impl Default for ScoringModel {
    fn default() -> Self {
        Self::new(WeightsConfig::default(), ScoringConfig::default())
    }
}

impl ScoringModel {
    /// Weights are expected to be validated (`ReconConfig::validate`).
    pub fn new(weights: WeightsConfig, scoring: ScoringConfig) -> Self {
        Self { weights, date_window_days: scoring.date_window_days }
    }

    pub fn score(&self, payment: &PaymentInflow, bid: &Bid) -> f64 {
        self.score_detailed(payment, bid).0
    }

    /// Composite score plus the unweighted sub-scores that produced it.
    pub fn score_detailed(&self, payment: &PaymentInflow, bid: &Bid) -> (f64, SignalScores) {
        let signals = self.signals(payment, bid);

        // Numerator and denominator accumulate in one pass.
        let mut weighted = 0.0;
        let mut applied = 0.0;
        for (sub, weight) in [
            (signals.amount, self.weights.amount),
            (signals.payer_name, self.weights.payer_name),
            (signals.reference, self.weights.reference),
            (signals.date, self.weights.date),
        ] {
            weighted += sub * weight;
            applied += weight;
        }

        let composite = if applied > 0.0 { weighted / applied } else { 0.0 };
        (sanitize(composite), signals)
    }

    pub fn signals(&self, payment: &PaymentInflow, bid: &Bid) -> SignalScores {
        SignalScores {
            amount: amount_proximity(payment, bid),
            payer_name: name_similarity(payment.payer_name.as_deref(), bid.buyer_name.as_deref()),
            reference: reference_similarity(&payment.reference_text, &bid.id),
            date: date_proximity(payment.received_at, bid.created_at, self.date_window_days),
        }
    }
}

/// `max(0, 1 - |paid - expected| / expected)`. Zero or negative expected
/// amounts and cross-currency pairs degrade to 0.
pub fn amount_proximity(payment: &PaymentInflow, bid: &Bid) -> f64 {
    if bid.expected_amount_cents <= 0 || !same_currency(&payment.currency, &bid.currency) {
        return 0.0;
    }
    let expected = bid.expected_amount_cents as f64;
    let delta = (payment.amount_cents as f64 - expected).abs();
    sanitize(1.0 - delta / expected)
}

pub fn name_similarity(payer: Option<&str>, buyer: Option<&str>) -> f64 {
    match (payer, buyer) {
        (Some(p), Some(b)) if !is_blank(p) && !is_blank(b) => similarity(p, b),
        _ => 0.0,
    }
}

pub fn reference_similarity(reference_text: &str, bid_id: &str) -> f64 {
    if is_blank(reference_text) {
        return 0.0;
    }
    similarity(reference_text, bid_id)
}

/// Linear decay from 1 at the same instant to 0 at `window_days` apart.
pub fn date_proximity(received_at: DateTime<Utc>, created_at: DateTime<Utc>, window_days: f64) -> f64 {
    if window_days <= 0.0 {
        return 0.0;
    }
    let days = (received_at - created_at).num_seconds().abs() as f64 / SECONDS_PER_DAY;
    sanitize(1.0 - days / window_days)
}

pub(crate) fn same_currency(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn sanitize(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
