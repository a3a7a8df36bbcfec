//! `bidpay-recon` — Payment-to-bid reconciliation engine.
//!
//! Pure engine crate: scores incoming payments against bids awaiting
//! payment, auto-commits confident matches, and records every state change
//! in an append-only audit trail. Persistence is reached only through the
//! collaborator traits in [`store`] and [`audit`]. No CLI or IO dependencies.

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod evidence;
pub mod matcher;
pub mod model;
pub mod policy;
pub mod scoring;
pub mod similarity;
pub mod store;

pub use audit::{AuditAction, AuditRecord, AuditSink, EntityKind, MemoryAuditLog};
pub use config::ReconConfig;
pub use engine::{Clock, FixedClock, ReconciliationEngine, SystemClock};
pub use error::ReconError;
pub use events::{EventSink, MemoryEventLog, ReconEvent};
pub use matcher::MatchFinder;
pub use model::{
    Actor, AutoMatchRun, Bid, BidStatus, CommittedMatch, ConfidenceTier, MatchCandidate, MatchField,
    MatchStatus, PaymentInflow,
};
pub use policy::AutoMatchPolicy;
pub use scoring::ScoringModel;
pub use similarity::similarity;
pub use store::{BidWorkflow, MemoryBidWorkflow, MemoryPaymentStore, PaymentStore};
