use std::path::PathBuf;
use std::sync::{Arc, Barrier};

use chrono::{DateTime, Duration, TimeZone, Utc};

use bidpay_recon::audit::{AuditAction, AuditRecord, AuditSink, MemoryAuditLog};
use bidpay_recon::config::ReconConfig;
use bidpay_recon::engine::{FixedClock, ReconciliationEngine};
use bidpay_recon::error::ReconError;
use bidpay_recon::events::{MemoryEventLog, ReconEvent};
use bidpay_recon::model::{
    Actor, Bid, BidStatus, ConfidenceTier, FailureKind, MatchField, MatchStatus, PaymentInflow,
};
use bidpay_recon::store::{BidWorkflow, MemoryBidWorkflow, MemoryPaymentStore, PaymentStore};
use bidpay_recon::ScoringModel;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_config(name: &str) -> ReconConfig {
    let toml = std::fs::read_to_string(fixtures_dir().join(name)).unwrap();
    ReconConfig::from_toml(&toml).unwrap()
}

fn t() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 17, 14, 0, 0).unwrap()
}

struct Harness {
    payments: Arc<MemoryPaymentStore>,
    bids: Arc<MemoryBidWorkflow>,
    audit: Arc<MemoryAuditLog>,
    events: Arc<MemoryEventLog>,
    engine: ReconciliationEngine,
}

impl Harness {
    fn new(payments: Vec<PaymentInflow>, bids: Vec<Bid>) -> Self {
        Self::with_config(ReconConfig::default(), payments, bids)
    }

    fn with_config(config: ReconConfig, payments: Vec<PaymentInflow>, bids: Vec<Bid>) -> Self {
        let payments = Arc::new(MemoryPaymentStore::new(payments));
        let bids = Arc::new(MemoryBidWorkflow::new(bids));
        let audit = Arc::new(MemoryAuditLog::new());
        let events = Arc::new(MemoryEventLog::new());
        let engine = ReconciliationEngine::new(config, payments.clone(), bids.clone(), audit.clone())
            .unwrap()
            .with_clock(Arc::new(FixedClock(t() + Duration::days(1))))
            .subscribe(events.clone());
        Self { payments, bids, audit, events, engine }
    }

    /// A second engine over the same stores, as a second process would have.
    fn second_engine(&self) -> ReconciliationEngine {
        ReconciliationEngine::new(
            ReconConfig::default(),
            self.payments.clone(),
            self.bids.clone(),
            self.audit.clone(),
        )
        .unwrap()
    }

    fn payment(&self, id: &str) -> PaymentInflow {
        self.payments.get(id).unwrap().unwrap()
    }

    fn bid_status(&self, id: &str) -> BidStatus {
        BidWorkflow::get(self.bids.as_ref(), id).unwrap().unwrap().status
    }
}

fn scenario_a_payment() -> PaymentInflow {
    PaymentInflow::new("PAY-A", 100_000, "USD", t())
        .with_payer("Global Tea Co")
        .with_reference("BID001")
}

fn scenario_a_bid() -> Bid {
    Bid::new("BID001", 100_000, "USD", t()).with_buyer("Global Tea Co.")
}

struct FailingAudit;

impl AuditSink for FailingAudit {
    fn append(&self, _record: AuditRecord) -> Result<(), ReconError> {
        Err(ReconError::AuditWriteFailure("audit store offline".into()))
    }
}

// -------------------------------------------------------------------------
// End-to-end scenarios
// -------------------------------------------------------------------------

#[test]
fn scenario_a_near_duplicate_auto_commits() {
    let h = Harness::new(vec![scenario_a_payment()], vec![scenario_a_bid()]);

    let candidates = h.engine.find_matches("PAY-A").unwrap();
    assert_eq!(candidates.len(), 1);
    let top = &candidates[0];
    assert!(top.score >= 0.95, "score {}", top.score);
    assert!(top.score <= 1.0);
    assert_eq!(top.confidence, ConfidenceTier::High);
    assert_eq!(
        top.matched_fields,
        vec![MatchField::Amount, MatchField::PayerName, MatchField::Reference, MatchField::Date]
    );

    let run = h.engine.run_automatic_matching().unwrap();
    assert_eq!(run.summary.committed, 1);
    assert_eq!(run.committed[0].bid_id, "BID001");
    assert!((run.committed[0].score - top.score).abs() < 1e-12);

    let p = h.payment("PAY-A");
    assert_eq!(p.status, MatchStatus::AutoMatched);
    let m = p.matched.unwrap();
    assert_eq!(m.bid_id, "BID001");
    assert_eq!(m.matched_by, Actor::System);
    assert_eq!(h.bid_status("BID001"), BidStatus::PaymentReceived);
}

#[test]
fn scenario_b_half_amount_left_for_review() {
    let mut payment = scenario_a_payment();
    payment.id = "PAY-B".into();
    payment.amount_cents = 50_000;
    let h = Harness::new(vec![payment], vec![scenario_a_bid()]);

    let candidates = h.engine.find_matches("PAY-B").unwrap();
    assert_eq!(candidates.len(), 1, "still surfaced for manual review");
    let c = &candidates[0];
    assert!((c.signals.amount - 0.5).abs() < 1e-12);
    // 0.40*0.5 + 0.30*(13/14) + 0.20*1 + 0.10*1, above the 0.5-0.65 band a
    // zero amount signal would give.
    let expected = 0.40 * 0.5 + 0.30 * (13.0 / 14.0) + 0.20 + 0.10;
    assert!((c.score - expected).abs() < 1e-12, "score {}", c.score);
    assert!((c.score - 0.7786).abs() < 1e-4);
    assert_eq!(c.confidence, ConfidenceTier::Medium);
    assert!(!c.matched_fields.contains(&MatchField::Amount));

    let run = h.engine.run_automatic_matching().unwrap();
    assert!(run.committed.is_empty());
    assert_eq!(run.summary.needs_review, 1);
    assert_eq!(h.payment("PAY-B").status, MatchStatus::Unmatched);
    assert_eq!(h.bid_status("BID001"), BidStatus::AwaitingPayment);
    assert!(h.audit.is_empty());
}

#[test]
fn scenario_c_amount_and_date_only_is_one_half() {
    let payment = PaymentInflow::new("PAY-C", 100_000, "USD", t()).with_payer("XXXX");
    let bid = scenario_a_bid();

    let model = ScoringModel::default();
    let (score, signals) = model.score_detailed(&payment, &bid);
    assert_eq!(signals.amount, 1.0);
    assert_eq!(signals.payer_name, 0.0);
    assert_eq!(signals.reference, 0.0);
    assert_eq!(signals.date, 1.0);
    // 0.40*1 + 0.30*0 + 0.20*0 + 0.10*1
    assert!((score - 0.50).abs() < 1e-12, "score {score}");

    let h = Harness::new(vec![payment], vec![bid]);
    let candidates = h.engine.find_matches("PAY-C").unwrap();
    assert_eq!(candidates[0].confidence, ConfidenceTier::Low);
    assert!(h.engine.run_automatic_matching().unwrap().committed.is_empty());
}

#[test]
fn score_exactly_on_threshold_is_not_auto_committed() {
    let config = load_config("boundary.recon.toml");
    let payment = PaymentInflow::new("PAY-E", 100_000, "USD", t() + Duration::days(45));
    let h = Harness::with_config(config, vec![payment], vec![scenario_a_bid()]);

    let candidates = h.engine.find_matches("PAY-E").unwrap();
    assert_eq!(candidates[0].score, 0.8);
    assert_eq!(candidates[0].confidence, ConfidenceTier::High);

    let run = h.engine.run_automatic_matching().unwrap();
    assert!(run.committed.is_empty());
    assert_eq!(run.summary.needs_review, 1);
}

#[test]
fn reference_config_file_matches_defaults() {
    let config = load_config("reference.recon.toml");
    let h = Harness::with_config(config, vec![scenario_a_payment()], vec![scenario_a_bid()]);
    let run = h.engine.run_automatic_matching().unwrap();
    assert_eq!(run.meta.config_name, "reference");
    assert_eq!(run.summary.committed, 1);
}

// -------------------------------------------------------------------------
// Commit unit
// -------------------------------------------------------------------------

#[test]
fn second_commit_on_same_payment_conflicts() {
    let h = Harness::new(
        vec![scenario_a_payment()],
        vec![scenario_a_bid(), Bid::new("BID002", 100_000, "USD", t())],
    );

    let first = h.engine.commit_match("PAY-A", "BID001", 0.97, Actor::System).unwrap();
    let before = h.payment("PAY-A");

    let err = h.second_engine().commit_match("PAY-A", "BID002", 0.99, Actor::System).unwrap_err();
    assert!(matches!(err, ReconError::MatchConflict { entity: "payment", .. }), "{err:?}");

    let after = h.payment("PAY-A");
    assert_eq!(before, after);
    assert_eq!(after.matched.unwrap().bid_id, first.bid_id);
    assert_eq!(h.bid_status("BID002"), BidStatus::AwaitingPayment);
    assert_eq!(h.audit.len(), 1);
}

#[test]
fn concurrent_committers_on_one_payment_produce_one_match() {
    let h = Harness::new(
        vec![scenario_a_payment()],
        vec![scenario_a_bid(), Bid::new("BID002", 100_000, "USD", t())],
    );
    let other = h.second_engine();
    let barrier = Barrier::new(2);

    let (a, b) = std::thread::scope(|s| {
        let a = s.spawn(|| {
            barrier.wait();
            h.engine.commit_match("PAY-A", "BID001", 0.9, Actor::System)
        });
        let b = s.spawn(|| {
            barrier.wait();
            other.commit_match("PAY-A", "BID002", 0.9, Actor::System)
        });
        (a.join().unwrap(), b.join().unwrap())
    });

    assert!(a.is_ok() ^ b.is_ok(), "exactly one committer wins: {a:?} / {b:?}");
    let loser = if a.is_ok() { b.unwrap_err() } else { a.unwrap_err() };
    assert!(loser.is_conflict());

    let winner_bid = h.payment("PAY-A").matched.unwrap().bid_id;
    let loser_bid = if winner_bid == "BID001" { "BID002" } else { "BID001" };
    assert_eq!(h.bid_status(&winner_bid), BidStatus::PaymentReceived);
    assert_eq!(h.bid_status(loser_bid), BidStatus::AwaitingPayment);
    assert_eq!(h.audit.len(), 1);
}

#[test]
fn concurrent_committers_on_one_bid_leave_loser_untouched() {
    let mut second = scenario_a_payment();
    second.id = "PAY-A2".into();
    let h = Harness::new(vec![scenario_a_payment(), second], vec![scenario_a_bid()]);
    let other = h.second_engine();
    let barrier = Barrier::new(2);

    let (a, b) = std::thread::scope(|s| {
        let a = s.spawn(|| {
            barrier.wait();
            h.engine.manual_match("PAY-A", "BID001", "ops-1", None)
        });
        let b = s.spawn(|| {
            barrier.wait();
            other.manual_match("PAY-A2", "BID001", "ops-2", None)
        });
        (a.join().unwrap(), b.join().unwrap())
    });

    assert!(a.is_ok() ^ b.is_ok());
    let loser_id = if a.is_ok() { "PAY-A2" } else { "PAY-A" };
    let loser = h.payment(loser_id);
    assert_eq!(loser.status, MatchStatus::Unmatched);
    assert!(loser.matched.is_none());
    assert_eq!(h.bid_status("BID001"), BidStatus::PaymentReceived);
}

#[test]
fn stale_bid_fails_with_conflict_and_restores_payment() {
    let h = Harness::new(vec![scenario_a_payment()], vec![scenario_a_bid()]);
    h.bids.advance_stage("BID001").unwrap();

    let err = h.engine.commit_match("PAY-A", "BID001", 0.95, Actor::System).unwrap_err();
    assert!(matches!(err, ReconError::MatchConflict { entity: "bid", .. }), "{err:?}");
    assert_eq!(h.payment("PAY-A").status, MatchStatus::Unmatched);
    assert!(h.audit.is_empty());
    assert!(h.events.events().is_empty());
}

#[test]
fn vanished_bid_is_a_conflict() {
    let h = Harness::new(vec![scenario_a_payment()], vec![]);
    let err = h.engine.commit_match("PAY-A", "BID-GONE", 0.95, Actor::System).unwrap_err();
    assert!(err.is_conflict());
    assert!(h.payment("PAY-A").matched.is_none());
}

#[test]
fn audit_failure_rolls_back_whole_unit() {
    let payments = Arc::new(MemoryPaymentStore::new([scenario_a_payment()]));
    let bids = Arc::new(MemoryBidWorkflow::new([scenario_a_bid()]));
    let events = Arc::new(MemoryEventLog::new());
    let engine = ReconciliationEngine::new(
        ReconConfig::default(),
        payments.clone(),
        bids.clone(),
        Arc::new(FailingAudit),
    )
    .unwrap()
    .subscribe(events.clone());

    let err = engine.manual_match("PAY-A", "BID001", "ops-1", Some("note")).unwrap_err();
    assert!(matches!(err, ReconError::AuditWriteFailure(_)));

    let p = payments.get("PAY-A").unwrap().unwrap();
    assert_eq!(p.status, MatchStatus::Unmatched);
    assert!(p.matched.is_none());
    assert_eq!(BidWorkflow::get(bids.as_ref(), "BID001").unwrap().unwrap().status, BidStatus::AwaitingPayment);
    assert!(events.events().is_empty());

    // The batch path records the failure and keeps going.
    let run = engine.run_automatic_matching().unwrap();
    assert!(run.committed.is_empty());
    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].kind, FailureKind::Audit);
}

#[test]
fn commit_publishes_payment_matched_event() {
    let h = Harness::new(vec![scenario_a_payment()], vec![scenario_a_bid()]);
    h.engine.run_automatic_matching().unwrap();
    assert_eq!(
        h.events.events(),
        vec![ReconEvent::PaymentMatched {
            payment_id: "PAY-A".into(),
            bid_id: "BID001".into(),
            amount_cents: 100_000,
            currency: "USD".into(),
            actor: Actor::System,
        }]
    );
}

// -------------------------------------------------------------------------
// Manual + dispute
// -------------------------------------------------------------------------

#[test]
fn manual_match_overrides_scoring() {
    let payment = PaymentInflow::new("PAY-M", 1, "EUR", t() - Duration::days(200)).with_payer("Nobody");
    let bid = Bid::new("BID900", 9_999_999, "USD", t()).with_buyer("Somebody Else Entirely");
    let h = Harness::new(vec![payment], vec![bid]);

    assert!(h.engine.find_matches("PAY-M").unwrap().is_empty());

    let done = h.engine.manual_match("PAY-M", "BID900", "ops-7", None).unwrap();
    assert_eq!(done.score, 1.0);
    assert_eq!(done.status, MatchStatus::ManualMatched);
    assert_eq!(done.actor, Actor::operator("ops-7"));

    let p = h.payment("PAY-M");
    assert_eq!(p.status, MatchStatus::ManualMatched);
    let m = p.matched.unwrap();
    assert_eq!(m.score, 1.0);
    assert_eq!(m.matched_by, Actor::operator("ops-7"));

    let record = &h.audit.records()[0];
    assert_eq!(record.payload["matchType"], "manual");
    assert_eq!(record.payload["score"], 1.0);
}

#[test]
fn manual_match_on_matched_payment_conflicts() {
    let h = Harness::new(
        vec![scenario_a_payment()],
        vec![scenario_a_bid(), Bid::new("BID002", 100_000, "USD", t())],
    );
    h.engine.run_automatic_matching().unwrap();
    let err = h.engine.manual_match("PAY-A", "BID002", "ops-1", None).unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(h.payment("PAY-A").matched.unwrap().bid_id, "BID001");
}

#[test]
fn dispute_clears_match_and_keeps_bid_stage() {
    let h = Harness::new(vec![scenario_a_payment()], vec![scenario_a_bid()]);
    h.engine.run_automatic_matching().unwrap();

    h.engine.dispute_match("PAY-A", "ops-2", "payer says duplicate").unwrap();

    let p = h.payment("PAY-A");
    assert_eq!(p.status, MatchStatus::Disputed);
    assert!(p.matched.is_none());
    assert_eq!(h.bid_status("BID001"), BidStatus::PaymentReceived);

    let records = h.audit.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].action, AuditAction::Disputed);
    assert_eq!(records[1].payload["reason"], "payer says duplicate");
    assert_eq!(records[1].payload["previousBidId"], "BID001");
    assert_eq!(records[1].actor, Actor::operator("ops-2"));
}

#[test]
fn disputed_payment_rematches_on_next_run() {
    let h = Harness::new(vec![scenario_a_payment()], vec![scenario_a_bid()]);
    h.engine.run_automatic_matching().unwrap();
    h.engine.dispute_match("PAY-A", "ops-2", "wrong bid").unwrap();

    // Original bid is no longer awaiting payment: nothing to match.
    let run = h.engine.run_automatic_matching().unwrap();
    assert_eq!(run.summary.payments_considered, 1);
    assert!(run.committed.is_empty());

    h.engine.reopen_bid("BID001", "ops-2", "dispute resolved").unwrap();
    let run = h.engine.run_automatic_matching().unwrap();
    assert_eq!(run.committed.len(), 1);
    assert_eq!(run.committed[0].payment_id, "PAY-A");
    assert_eq!(h.payment("PAY-A").status, MatchStatus::AutoMatched);
}

#[test]
fn disputed_payment_can_match_a_different_bid() {
    let h = Harness::new(vec![scenario_a_payment()], vec![scenario_a_bid()]);
    h.engine.manual_match("PAY-A", "BID001", "ops-1", None).unwrap();
    h.engine.dispute_match("PAY-A", "ops-1", "belongs to the February bid").unwrap();

    h.bids.insert(Bid::new("BID001-FEB", 100_000, "USD", t()).with_buyer("Global Tea Co"));
    let run = h.engine.run_automatic_matching().unwrap();
    assert_eq!(run.committed.len(), 1);
    assert_eq!(run.committed[0].bid_id, "BID001-FEB");
}
