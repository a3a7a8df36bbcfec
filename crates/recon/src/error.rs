use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (weights, thresholds, windows).
    ConfigValidation(String),
    /// The payment or bid changed state between read and write.
    MatchConflict {
        entity: &'static str,
        id: String,
        reason: String,
    },
    /// Bid collaborator refused a stage transition.
    StaleState { bid_id: String, status: String },
    /// The audit sink could not persist. Always aborts the enclosing commit.
    AuditWriteFailure(String),
    /// Payment id not known to the payment store.
    UnknownPayment(String),
    /// Bid id not known to the bid workflow.
    UnknownBid(String),
    /// Record rejected at the engine boundary.
    InvalidInput(String),
    /// Any other collaborator failure.
    Store(String),
}

impl ReconError {
    pub fn payment_conflict(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MatchConflict { entity: "payment", id: id.into(), reason: reason.into() }
    }

    pub fn bid_conflict(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MatchConflict { entity: "bid", id: id.into(), reason: reason.into() }
    }

    /// Lost a race or the entity is no longer eligible. Recoverable by re-fetching.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::MatchConflict { .. } | Self::StaleState { .. })
    }

    /// Operator-correctable input problems (unknown ids, malformed records).
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::UnknownPayment(_) | Self::UnknownBid(_) | Self::InvalidInput(_))
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MatchConflict { entity, id, reason } => {
                write!(f, "match conflict on {entity} '{id}': {reason}")
            }
            Self::StaleState { bid_id, status } => {
                write!(f, "bid '{bid_id}' is {status}, cannot advance stage")
            }
            Self::AuditWriteFailure(msg) => write!(f, "audit write failed: {msg}"),
            Self::UnknownPayment(id) => write!(f, "unknown payment: {id}"),
            Self::UnknownBid(id) => write!(f, "unknown bid: {id}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::Store(msg) => write!(f, "store error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
