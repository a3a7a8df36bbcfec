//! Collaborator seams for payment and bid persistence, plus in-memory
//! implementations.
//!
//! Writes are conditional: a payment update names the status it expects to
//! replace, and a bid advances only from `awaiting_payment`. A writer that
//! lost a race gets `MatchConflict` / `StaleState` instead of overwriting.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::ReconError;
use crate::model::{Bid, BidStatus, MatchStatus, MatchUpdate, PaymentInflow};

pub trait PaymentStore: Send + Sync {
    /// Open payments (`unmatched` or `disputed`).
    fn list_unmatched(&self) -> Result<Vec<PaymentInflow>, ReconError>;

    fn get(&self, payment_id: &str) -> Result<Option<PaymentInflow>, ReconError>;

    /// The payment currently holding an active (non-disputed) match to `bid_id`.
    fn matched_payment_for_bid(&self, bid_id: &str) -> Result<Option<PaymentInflow>, ReconError>;

    /// Replace the match state if and only if the stored status is still
    /// `expected`. Fails with `MatchConflict` otherwise.
    fn update_match_fields(
        &self,
        payment_id: &str,
        expected: MatchStatus,
        update: MatchUpdate,
    ) -> Result<(), ReconError>;
}

pub trait BidWorkflow: Send + Sync {
    /// Bids in `awaiting_payment`.
    fn list_eligible_for_payment(&self) -> Result<Vec<Bid>, ReconError>;

    fn get(&self, bid_id: &str) -> Result<Option<Bid>, ReconError>;

    /// Move the bid one stage forward. Fails with `StaleState` when the bid
    /// has no successor from its current status.
    fn advance_stage(&self, bid_id: &str) -> Result<(), ReconError>;

    /// Undo `advance_stage`. Fails with `StaleState` when the bid is not in
    /// the stage `advance_stage` produces.
    fn revert_stage(&self, bid_id: &str) -> Result<(), ReconError>;
}

// ---------------------------------------------------------------------------
// In-memory payments
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryPaymentStore {
    payments: RwLock<BTreeMap<String, PaymentInflow>>,
}

impl MemoryPaymentStore {
    pub fn new(payments: impl IntoIterator<Item = PaymentInflow>) -> Self {
        Self {
            payments: RwLock::new(payments.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }

    pub fn insert(&self, payment: PaymentInflow) {
        self.payments.write().insert(payment.id.clone(), payment);
    }

    /// Snapshot of every payment, ordered by id.
    pub fn payments(&self) -> Vec<PaymentInflow> {
        self.payments.read().values().cloned().collect()
    }
}

impl PaymentStore for MemoryPaymentStore {
    fn list_unmatched(&self) -> Result<Vec<PaymentInflow>, ReconError> {
        Ok(self.payments.read().values().filter(|p| p.is_open()).cloned().collect())
    }

    fn get(&self, payment_id: &str) -> Result<Option<PaymentInflow>, ReconError> {
        Ok(self.payments.read().get(payment_id).cloned())
    }

    fn matched_payment_for_bid(&self, bid_id: &str) -> Result<Option<PaymentInflow>, ReconError> {
        Ok(self
            .payments
            .read()
            .values()
            .find(|p| {
                p.status.is_matched() && p.matched.as_ref().is_some_and(|m| m.bid_id == bid_id)
            })
            .cloned())
    }

    fn update_match_fields(
        &self,
        payment_id: &str,
        expected: MatchStatus,
        update: MatchUpdate,
    ) -> Result<(), ReconError> {
        let mut payments = self.payments.write();
        let payment = payments
            .get_mut(payment_id)
            .ok_or_else(|| ReconError::UnknownPayment(payment_id.into()))?;

        if payment.status != expected {
            return Err(ReconError::payment_conflict(
                payment_id,
                format!("expected {expected}, found {}", payment.status),
            ));
        }

        payment.status = update.status;
        payment.matched = update.matched;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory bids
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryBidWorkflow {
    bids: RwLock<BTreeMap<String, Bid>>,
}

impl MemoryBidWorkflow {
    pub fn new(bids: impl IntoIterator<Item = Bid>) -> Self {
        Self {
            bids: RwLock::new(bids.into_iter().map(|b| (b.id.clone(), b)).collect()),
        }
    }

    pub fn insert(&self, bid: Bid) {
        self.bids.write().insert(bid.id.clone(), bid);
    }

    pub fn bids(&self) -> Vec<Bid> {
        self.bids.read().values().cloned().collect()
    }

    fn transition(
        &self,
        bid_id: &str,
        step: fn(&BidStatus) -> Option<BidStatus>,
    ) -> Result<(), ReconError> {
        let mut bids = self.bids.write();
        let bid = bids.get_mut(bid_id).ok_or_else(|| ReconError::UnknownBid(bid_id.into()))?;
        match step(&bid.status) {
            Some(next) => {
                bid.status = next;
                Ok(())
            }
            None => Err(ReconError::StaleState {
                bid_id: bid_id.into(),
                status: bid.status.to_string(),
            }),
        }
    }
}

impl BidWorkflow for MemoryBidWorkflow {
    fn list_eligible_for_payment(&self) -> Result<Vec<Bid>, ReconError> {
        Ok(self.bids.read().values().filter(|b| b.is_eligible()).cloned().collect())
    }

    fn get(&self, bid_id: &str) -> Result<Option<Bid>, ReconError> {
        Ok(self.bids.read().get(bid_id).cloned())
    }

    fn advance_stage(&self, bid_id: &str) -> Result<(), ReconError> {
        self.transition(bid_id, BidStatus::next_stage)
    }

    fn revert_stage(&self, bid_id: &str) -> Result<(), ReconError> {
        self.transition(bid_id, BidStatus::previous_stage)
    }
}
