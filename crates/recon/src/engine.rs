use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde_json::json;

use crate::audit::{AuditAction, AuditRecord, AuditSink, EntityKind};
use crate::config::ReconConfig;
use crate::error::ReconError;
use crate::events::{EventSink, ReconEvent};
use crate::matcher::MatchFinder;
use crate::model::{
    Actor, AutoMatchRun, Bid, BidStatus, CommittedMatch, FailureKind, MatchCandidate, MatchFields,
    MatchStatus, MatchUpdate, PaymentFailure, PaymentInflow, RunMeta, RunSummary,
};
use crate::policy::AutoMatchPolicy;
use crate::store::{BidWorkflow, PaymentStore};

/// Score used for operator-directed matches.
pub const MANUAL_MATCH_SCORE: f64 = 1.0;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Matches open payments to awaiting-payment bids and performs the
/// payment/bid/audit write unit.
///
/// Collaborators are injected; the engine holds no global state. Commit
/// units are serialized through a short engine-local lock that is never held
/// while scoring. The collaborators' conditional writes cover committers
/// outside this process.
pub struct ReconciliationEngine {
    config: ReconConfig,
    finder: MatchFinder,
    policy: AutoMatchPolicy,
    payments: Arc<dyn PaymentStore>,
    bids: Arc<dyn BidWorkflow>,
    audit: Arc<dyn AuditSink>,
    sinks: Vec<Arc<dyn EventSink>>,
    clock: Arc<dyn Clock>,
    commit_lock: Mutex<()>,
}

impl ReconciliationEngine {
    pub fn new(
        config: ReconConfig,
        payments: Arc<dyn PaymentStore>,
        bids: Arc<dyn BidWorkflow>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ReconError> {
        config.validate()?;
        Ok(Self {
            finder: MatchFinder::new(&config),
            policy: AutoMatchPolicy::new(&config.thresholds),
            config,
            payments,
            bids,
            audit,
            sinks: Vec::new(),
            clock: Arc::new(SystemClock),
            commit_lock: Mutex::new(()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a listener for `ReconEvent`s.
    pub fn subscribe(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn config(&self) -> &ReconConfig {
        &self.config
    }

    pub fn finder(&self) -> &MatchFinder {
        &self.finder
    }

    // -----------------------------------------------------------------------
    // Batch
    // -----------------------------------------------------------------------

    /// Auto-commit every open payment whose top candidate passes the policy.
    /// Per-payment failures are collected, never fatal to the batch.
    pub fn run_automatic_matching(&self) -> Result<AutoMatchRun, ReconError> {
        self.run_automatic_matching_until(&AtomicBool::new(false))
    }

    /// Same as `run_automatic_matching`, stopping between payments once
    /// `cancel` is set. Each payment's commit is independent, so stopping
    /// early leaves nothing half-written.
    pub fn run_automatic_matching_until(&self, cancel: &AtomicBool) -> Result<AutoMatchRun, ReconError> {
        let run_at = self.clock.now();

        let mut open = self.payments.list_unmatched()?;
        open.sort_by(|a, b| b.received_at.cmp(&a.received_at).then_with(|| a.id.cmp(&b.id)));
        let bids = self.bids.list_eligible_for_payment()?;

        info!(
            "auto-match '{}': {} open payment(s), {} eligible bid(s)",
            self.config.name,
            open.len(),
            bids.len()
        );

        let mut summary = RunSummary { payments_considered: open.len(), ..RunSummary::default() };
        let mut committed = Vec::new();
        let mut failures = Vec::new();

        let mut valid = Vec::with_capacity(open.len());
        for payment in open {
            match payment.validate() {
                Ok(()) => valid.push(payment),
                Err(e) => {
                    warn!("skipping payment '{}': {e}", payment.id);
                    failures.push(failure(&payment.id, None, &e));
                }
            }
        }

        let ranked = self.rank_all(&valid, &bids);

        // Bids committed earlier in this run are gone from every later list,
        // as if eligibility had been re-fetched per payment.
        let mut claimed: HashSet<String> = HashSet::new();

        for (payment, mut candidates) in valid.iter().zip(ranked) {
            if cancel.load(Ordering::Relaxed) {
                info!("auto-match '{}': cancelled before payment '{}'", self.config.name, payment.id);
                summary.cancelled = true;
                break;
            }

            candidates.retain(|c| !claimed.contains(&c.bid_id));
            if candidates.is_empty() {
                debug!("payment '{}': no candidate above surface threshold", payment.id);
                summary.no_candidates += 1;
                continue;
            }

            let Some(top) = self.policy.should_auto_commit(&candidates) else {
                debug!(
                    "payment '{}': top candidate '{}' scored {:.4} ({}), left for review",
                    payment.id, candidates[0].bid_id, candidates[0].score, candidates[0].confidence
                );
                summary.needs_review += 1;
                continue;
            };

            match self.commit_unit(payment, &top.bid_id, top.score, Actor::System, None) {
                Ok(done) => {
                    claimed.insert(done.bid_id.clone());
                    committed.push(done);
                }
                Err(e) => {
                    warn!("auto-match of payment '{}' to bid '{}' failed: {e}", payment.id, top.bid_id);
                    failures.push(failure(&payment.id, Some(&top.bid_id), &e));
                }
            }
        }

        summary.committed = committed.len();
        summary.failed = failures.len();

        info!(
            "auto-match '{}': {} committed, {} for review, {} without candidates, {} failed",
            self.config.name, summary.committed, summary.needs_review, summary.no_candidates, summary.failed
        );

        Ok(AutoMatchRun {
            meta: RunMeta {
                config_name: self.config.name.clone(),
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                run_at: run_at.to_rfc3339(),
                eligible_bids: bids.len(),
            },
            summary,
            committed,
            failures,
        })
    }

    /// Rank candidates for each payment. Pure work, spread over scoped
    /// worker threads when `batch.workers` allows.
    fn rank_all(&self, payments: &[PaymentInflow], bids: &[Bid]) -> Vec<Vec<MatchCandidate>> {
        let finder = &self.finder;
        let workers = self.config.batch.effective_workers().min(payments.len());
        if workers <= 1 {
            return payments.iter().map(|p| finder.find_matches(p, bids)).collect();
        }

        let chunk_size = payments.len().div_ceil(workers);
        std::thread::scope(|scope| {
            let handles: Vec<_> = payments
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk.iter().map(|p| finder.find_matches(p, bids)).collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        })
    }

    // -----------------------------------------------------------------------
    // Read-only
    // -----------------------------------------------------------------------

    /// Ranked candidates for a stored payment. No state change.
    pub fn find_matches(&self, payment_id: &str) -> Result<Vec<MatchCandidate>, ReconError> {
        let payment = self.load_payment(payment_id)?;
        self.suggest(&payment)
    }

    /// Ranked candidates for a payment value against currently eligible bids.
    pub fn suggest(&self, payment: &PaymentInflow) -> Result<Vec<MatchCandidate>, ReconError> {
        payment.validate()?;
        let bids = self.bids.list_eligible_for_payment()?;
        Ok(self.finder.find_matches(payment, &bids))
    }

    // -----------------------------------------------------------------------
    // Operator actions
    // -----------------------------------------------------------------------

    /// Operator-chosen match. Always scored 1.0 and `manual_matched`,
    /// whatever the fields say. Notes are audited as a separate record in
    /// the same write.
    pub fn manual_match(
        &self,
        payment_id: &str,
        bid_id: &str,
        operator_id: &str,
        notes: Option<&str>,
    ) -> Result<CommittedMatch, ReconError> {
        let operator = operator(operator_id)?;
        let payment = self.load_payment(payment_id)?;
        payment.validate()?;
        if !payment.is_open() {
            return Err(ReconError::payment_conflict(
                payment_id,
                format!("payment is already {}", payment.status),
            ));
        }

        let bid = self.bids.get(bid_id)?.ok_or_else(|| ReconError::UnknownBid(bid_id.into()))?;
        if !bid.is_eligible() {
            return Err(ReconError::bid_conflict(bid_id, format!("bid is {}", bid.status)));
        }

        let notes = notes.map(str::trim).filter(|n| !n.is_empty());
        self.commit_unit(&payment, bid_id, MANUAL_MATCH_SCORE, operator, notes)
    }

    /// Commit a match for a stored payment. Shared by the automatic and
    /// manual paths.
    pub fn commit_match(
        &self,
        payment_id: &str,
        bid_id: &str,
        score: f64,
        actor: Actor,
    ) -> Result<CommittedMatch, ReconError> {
        let payment = self.load_payment(payment_id)?;
        self.commit_unit(&payment, bid_id, score, actor, None)
    }

    /// Reverse a committed match. The payment becomes open again; the bid's
    /// stage is left alone (see `reopen_bid`).
    pub fn dispute_match(&self, payment_id: &str, operator_id: &str, reason: &str) -> Result<(), ReconError> {
        let operator = operator(operator_id)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ReconError::InvalidInput("dispute reason is empty".into()));
        }

        let _guard = self.commit_lock.lock();
        let payment = self.load_payment(payment_id)?;
        if !payment.status.is_matched() {
            return Err(ReconError::payment_conflict(
                payment_id,
                format!("cannot dispute a payment that is {}", payment.status),
            ));
        }
        let previous_bid = payment.matched.as_ref().map(|m| m.bid_id.clone());

        self.payments.update_match_fields(
            payment_id,
            payment.status,
            MatchUpdate { status: MatchStatus::Disputed, matched: None },
        )?;

        let record = AuditRecord::new(
            EntityKind::Payment,
            payment_id,
            AuditAction::Disputed,
            json!({ "reason": reason, "previousBidId": previous_bid }),
            operator,
            self.clock.now(),
        );
        if let Err(e) = self.audit.append(record) {
            self.restore_payment(&payment, MatchStatus::Disputed);
            return Err(audit_failure(e));
        }

        info!(
            "payment '{payment_id}' disputed (was matched to {})",
            previous_bid.as_deref().unwrap_or("<none>")
        );
        Ok(())
    }

    /// Move a bid from `payment_received` back to `awaiting_payment`.
    /// Refused while a payment still holds an active match to the bid.
    pub fn reopen_bid(&self, bid_id: &str, operator_id: &str, reason: &str) -> Result<(), ReconError> {
        let operator = operator(operator_id)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ReconError::InvalidInput("reopen reason is empty".into()));
        }

        let _guard = self.commit_lock.lock();
        let bid = self.bids.get(bid_id)?.ok_or_else(|| ReconError::UnknownBid(bid_id.into()))?;
        if bid.status != BidStatus::PaymentReceived {
            return Err(ReconError::bid_conflict(bid_id, format!("cannot reopen a bid that is {}", bid.status)));
        }
        if let Some(holder) = self.payments.matched_payment_for_bid(bid_id)? {
            return Err(ReconError::bid_conflict(
                bid_id,
                format!("payment '{}' is still {} to this bid", holder.id, holder.status),
            ));
        }

        self.bids.revert_stage(bid_id).map_err(|e| stale_to_conflict(bid_id, e))?;

        let record = AuditRecord::new(
            EntityKind::Bid,
            bid_id,
            AuditAction::BidReopened,
            json!({ "reason": reason, "previousStatus": bid.status }),
            operator,
            self.clock.now(),
        );
        if let Err(e) = self.audit.append(record) {
            if let Err(undo) = self.bids.advance_stage(bid_id) {
                error!("bid '{bid_id}': failed to re-advance after audit failure: {undo}");
            }
            return Err(audit_failure(e));
        }

        info!("bid '{bid_id}' reopened for payment");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Commit unit
    // -----------------------------------------------------------------------

    /// Payment update, bid advance, audit append: all three or none.
    ///
    /// `payment` is the caller's snapshot; its status is the expected value
    /// for the conditional payment write, so a concurrent change since the
    /// read surfaces as `MatchConflict`.
    fn commit_unit(
        &self,
        payment: &PaymentInflow,
        bid_id: &str,
        score: f64,
        actor: Actor,
        notes: Option<&str>,
    ) -> Result<CommittedMatch, ReconError> {
        if !score.is_finite() {
            return Err(ReconError::InvalidInput(format!("match score must be finite, got {score}")));
        }
        let score = score.clamp(0.0, 1.0);

        let guard = self.commit_lock.lock();

        if !payment.is_open() {
            return Err(ReconError::payment_conflict(
                &payment.id,
                format!("payment is already {}", payment.status),
            ));
        }

        let now = self.clock.now();
        let status = actor.match_status();
        let fields = MatchFields {
            bid_id: bid_id.to_string(),
            score,
            matched_by: actor.clone(),
            matched_at: now,
        };

        // (a) payment, guarded on its status being unchanged since read
        self.payments.update_match_fields(
            &payment.id,
            payment.status,
            MatchUpdate { status, matched: Some(fields) },
        )?;

        // (b) bid
        if let Err(e) = self.bids.advance_stage(bid_id) {
            self.restore_payment(payment, status);
            return Err(stale_to_conflict(bid_id, e));
        }

        // (c) audit
        let match_type = match actor {
            Actor::System => "auto",
            Actor::Operator(_) => "manual",
        };
        let mut records = vec![AuditRecord::new(
            EntityKind::Payment,
            &payment.id,
            AuditAction::Matched,
            json!({ "bidId": bid_id, "score": score, "matchType": match_type }),
            actor.clone(),
            now,
        )];
        if let Some(notes) = notes {
            records.push(AuditRecord::new(
                EntityKind::Payment,
                &payment.id,
                AuditAction::ManualMatchNote,
                json!({ "bidId": bid_id, "notes": notes }),
                actor.clone(),
                now,
            ));
        }
        if let Err(e) = self.audit.append_batch(records) {
            if let Err(undo) = self.bids.revert_stage(bid_id) {
                error!("bid '{bid_id}': failed to revert stage after audit failure: {undo}");
            }
            self.restore_payment(payment, status);
            return Err(audit_failure(e));
        }

        drop(guard);

        info!("payment '{}' {status} to bid '{bid_id}' (score {score:.4}, by {actor})", payment.id);

        let event = ReconEvent::PaymentMatched {
            payment_id: payment.id.clone(),
            bid_id: bid_id.to_string(),
            amount_cents: payment.amount_cents,
            currency: payment.currency.clone(),
            actor: actor.clone(),
        };
        for sink in &self.sinks {
            sink.publish(&event);
        }

        Ok(CommittedMatch {
            payment_id: payment.id.clone(),
            bid_id: bid_id.to_string(),
            score,
            status,
            actor,
            committed_at: now,
        })
    }

    /// Put a payment back to its snapshot state after a failed unit.
    fn restore_payment(&self, snapshot: &PaymentInflow, written: MatchStatus) {
        let undo = MatchUpdate { status: snapshot.status, matched: snapshot.matched.clone() };
        if let Err(e) = self.payments.update_match_fields(&snapshot.id, written, undo) {
            error!("payment '{}': failed to restore after aborted commit: {e}", snapshot.id);
        }
    }

    fn load_payment(&self, payment_id: &str) -> Result<PaymentInflow, ReconError> {
        self.payments
            .get(payment_id)?
            .ok_or_else(|| ReconError::UnknownPayment(payment_id.into()))
    }
}

fn operator(operator_id: &str) -> Result<Actor, ReconError> {
    let id = operator_id.trim();
    if id.is_empty() {
        return Err(ReconError::InvalidInput("operator id is empty".into()));
    }
    Ok(Actor::operator(id))
}

/// A bid that vanished or moved on between read and write lost the race.
fn stale_to_conflict(bid_id: &str, err: ReconError) -> ReconError {
    match err {
        ReconError::StaleState { status, .. } => ReconError::bid_conflict(bid_id, format!("bid is {status}")),
        ReconError::UnknownBid(_) => ReconError::bid_conflict(bid_id, "bid no longer exists"),
        other => other,
    }
}

fn audit_failure(err: ReconError) -> ReconError {
    match err {
        ReconError::AuditWriteFailure(_) => err,
        other => ReconError::AuditWriteFailure(other.to_string()),
    }
}

fn failure(payment_id: &str, bid_id: Option<&str>, err: &ReconError) -> PaymentFailure {
    PaymentFailure {
        payment_id: payment_id.to_string(),
        bid_id: bid_id.map(str::to_string),
        kind: FailureKind::of(err),
        message: err.to_string(),
    }
}
