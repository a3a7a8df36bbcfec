//! Domain events for downstream notification collaborators.

use parking_lot::Mutex;
use serde::Serialize;

use crate::model::Actor;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconEvent {
    /// Keys match the audit payloads: `{type, paymentId, bidId, amount, currency, actor}`.
    #[serde(rename_all = "camelCase")]
    PaymentMatched {
        payment_id: String,
        bid_id: String,
        /// Minor units.
        #[serde(rename = "amount")]
        amount_cents: i64,
        currency: String,
        actor: Actor,
    },
}

/// Subscriber side. Publishing happens after a commit succeeds and cannot
/// fail it.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &ReconEvent);
}

/// Collects published events in memory.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<ReconEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReconEvent> {
        self.events.lock().clone()
    }

    pub fn drain(&self) -> Vec<ReconEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventSink for MemoryEventLog {
    fn publish(&self, event: &ReconEvent) {
        self.events.lock().push(event.clone());
    }
}
