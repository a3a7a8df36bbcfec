//! Human-readable explanation of why a candidate surfaced.
//!
//! Materiality rules here never feed back into the score.

use crate::config::MaterialityConfig;
use crate::model::{Bid, MatchField, PaymentInflow, SignalScores};
use crate::scoring::same_currency;
use crate::similarity::contains_either;

/// Signals that clear their materiality threshold, in fixed field order.
pub fn matched_fields(
    payment: &PaymentInflow,
    bid: &Bid,
    signals: &SignalScores,
    materiality: &MaterialityConfig,
) -> Vec<MatchField> {
    let mut fields = Vec::new();

    if amount_within_ratio(payment, bid, materiality.amount_ratio) {
        fields.push(MatchField::Amount);
    }
    if signals.payer_name > 0.0 && signals.payer_name >= materiality.name_similarity {
        fields.push(MatchField::PayerName);
    }
    if contains_either(&payment.reference_text, &bid.id) {
        fields.push(MatchField::Reference);
    }
    if (payment.received_at - bid.created_at).num_days().abs() <= materiality.date_days {
        fields.push(MatchField::Date);
    }

    fields
}

fn amount_within_ratio(payment: &PaymentInflow, bid: &Bid, ratio: f64) -> bool {
    if bid.expected_amount_cents <= 0 || !same_currency(&payment.currency, &bid.currency) {
        return false;
    }
    // Widened: unvalidated amounts can sit anywhere in i64.
    let delta = (i128::from(payment.amount_cents) - i128::from(bid.expected_amount_cents)).unsigned_abs();
    delta as f64 <= ratio * bid.expected_amount_cents as f64
}
