use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

/// An incoming bank payment awaiting (or holding) a bid match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInflow {
    pub id: String,
    /// Positive amount in minor units.
    pub amount_cents: i64,
    pub currency: String,
    #[serde(default)]
    pub payer_name: Option<String>,
    #[serde(default)]
    pub reference_text: String,
    /// Opaque bank-assigned code. Not used for scoring.
    #[serde(default)]
    pub bank_reference: String,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub status: MatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<MatchFields>,
}

impl PaymentInflow {
    /// Unmatched, open payment.
    pub fn new(
        id: impl Into<String>,
        amount_cents: i64,
        currency: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            amount_cents,
            currency: currency.into(),
            payer_name: None,
            reference_text: String::new(),
            bank_reference: String::new(),
            received_at,
            status: MatchStatus::Unmatched,
            matched: None,
        }
    }

    pub fn with_payer(mut self, payer_name: impl Into<String>) -> Self {
        self.payer_name = Some(payer_name.into());
        self
    }

    pub fn with_reference(mut self, reference_text: impl Into<String>) -> Self {
        self.reference_text = reference_text.into();
        self
    }

    /// Boundary check applied before a payment reaches scoring.
    pub fn validate(&self) -> Result<(), ReconError> {
        if self.id.trim().is_empty() {
            return Err(ReconError::InvalidInput("payment id is empty".into()));
        }
        if self.amount_cents <= 0 {
            return Err(ReconError::InvalidInput(format!(
                "payment '{}': amount must be positive, got {}",
                self.id, self.amount_cents
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(ReconError::InvalidInput(format!("payment '{}': currency is empty", self.id)));
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    #[default]
    Unmatched,
    AutoMatched,
    ManualMatched,
    Disputed,
}

impl MatchStatus {
    /// Open payments are eligible for matching. A dispute re-opens a payment.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Unmatched | Self::Disputed)
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Self::AutoMatched | Self::ManualMatched)
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unmatched => write!(f, "unmatched"),
            Self::AutoMatched => write!(f, "auto_matched"),
            Self::ManualMatched => write!(f, "manual_matched"),
            Self::Disputed => write!(f, "disputed"),
        }
    }
}

/// Fields set on a payment when a match commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchFields {
    pub bid_id: String,
    pub score: f64,
    pub matched_by: Actor,
    pub matched_at: DateTime<Utc>,
}

/// New match state for a conditional payment update.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchUpdate {
    pub status: MatchStatus,
    pub matched: Option<MatchFields>,
}

/// Who performed a state change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Actor {
    System,
    Operator(String),
}

impl Actor {
    pub fn operator(id: impl Into<String>) -> Self {
        Self::Operator(id.into())
    }

    /// Payment status a commit by this actor produces.
    pub fn match_status(&self) -> MatchStatus {
        match self {
            Self::System => MatchStatus::AutoMatched,
            Self::Operator(_) => MatchStatus::ManualMatched,
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Operator(id) => write!(f, "operator:{id}"),
        }
    }
}

impl std::str::FromStr for Actor {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            other => match other.strip_prefix("operator:") {
                Some(id) if !id.is_empty() => Ok(Self::Operator(id.to_string())),
                _ => Err(ReconError::InvalidInput(format!("unrecognized actor: {other}"))),
            },
        }
    }
}

impl Serialize for Actor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Actor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Bids
// ---------------------------------------------------------------------------

/// A bid/invoice as seen by the matching engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: String,
    pub expected_amount_cents: i64,
    pub currency: String,
    #[serde(default)]
    pub buyer_name: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: BidStatus,
}

impl Bid {
    pub fn new(
        id: impl Into<String>,
        expected_amount_cents: i64,
        currency: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            expected_amount_cents,
            currency: currency.into(),
            buyer_name: None,
            created_at,
            status: BidStatus::AwaitingPayment,
        }
    }

    pub fn with_buyer(mut self, buyer_name: impl Into<String>) -> Self {
        self.buyer_name = Some(buyer_name.into());
        self
    }

    pub fn is_eligible(&self) -> bool {
        self.status == BidStatus::AwaitingPayment
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Draft,
    #[default]
    AwaitingPayment,
    PaymentReceived,
    Fulfilled,
    Cancelled,
}

impl BidStatus {
    /// The single successor the engine triggers on a committed match.
    pub fn next_stage(&self) -> Option<Self> {
        match self {
            Self::AwaitingPayment => Some(Self::PaymentReceived),
            _ => None,
        }
    }

    /// Inverse of `next_stage`.
    pub fn previous_stage(&self) -> Option<Self> {
        match self {
            Self::PaymentReceived => Some(Self::AwaitingPayment),
            _ => None,
        }
    }
}

impl std::fmt::Display for BidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::AwaitingPayment => write!(f, "awaiting_payment"),
            Self::PaymentReceived => write!(f, "payment_received"),
            Self::Fulfilled => write!(f, "fulfilled"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Scoring signal names, used to explain a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    Amount,
    PayerName,
    Reference,
    Date,
}

impl std::fmt::Display for MatchField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Amount => write!(f, "amount"),
            Self::PayerName => write!(f, "payer_name"),
            Self::Reference => write!(f, "reference"),
            Self::Date => write!(f, "date"),
        }
    }
}

/// Unweighted per-signal sub-scores, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalScores {
    pub amount: f64,
    pub payer_name: f64,
    pub reference: f64,
    pub date: f64,
}

/// One scored payment/bid pairing. Computed, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub payment_id: String,
    pub bid_id: String,
    pub score: f64,
    pub confidence: ConfidenceTier,
    pub matched_fields: Vec<MatchField>,
    pub signals: SignalScores,
}

// ---------------------------------------------------------------------------
// Commit + batch output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedMatch {
    pub payment_id: String,
    pub bid_id: String,
    pub score: f64,
    pub status: MatchStatus,
    pub actor: Actor,
    pub committed_at: DateTime<Utc>,
}

/// A payment the batch could not commit, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentFailure {
    pub payment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid_id: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Conflict,
    Validation,
    Audit,
    Store,
}

impl FailureKind {
    pub fn of(err: &ReconError) -> Self {
        if err.is_conflict() {
            Self::Conflict
        } else if err.is_validation() {
            Self::Validation
        } else if matches!(err, ReconError::AuditWriteFailure(_)) {
            Self::Audit
        } else {
            Self::Store
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub payments_considered: usize,
    pub committed: usize,
    /// Payments with at least one surfaced candidate but no auto-commit.
    pub needs_review: usize,
    /// Payments with no candidate above the surface threshold.
    pub no_candidates: usize,
    pub failed: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub eligible_bids: usize,
}

/// Output of one automatic matching batch.
#[derive(Debug, Clone, Serialize)]
pub struct AutoMatchRun {
    pub meta: RunMeta,
    pub summary: RunSummary,
    pub committed: Vec<CommittedMatch>,
    pub failures: Vec<PaymentFailure>,
}
