//! JSON ledger snapshot: the CLI's persistence for payments, bids and the
//! audit trail.
//!
//! ```json
//! { "payments": [...], "bids": [...], "audit": [...] }
//! ```
//!
//! Loaded into the engine's in-memory collaborators, written back after a
//! mutating command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use bidpay_recon::audit::{AuditRecord, MemoryAuditLog};
use bidpay_recon::model::{Bid, PaymentInflow};
use bidpay_recon::store::{MemoryBidWorkflow, MemoryPaymentStore};
use bidpay_recon::{ReconConfig, ReconciliationEngine};

use crate::CliError;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Ledger {
    #[serde(default)]
    pub payments: Vec<PaymentInflow>,
    #[serde(default)]
    pub bids: Vec<Bid>,
    #[serde(default)]
    pub audit: Vec<AuditRecord>,
}

impl Ledger {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CliError::io(format!("cannot read ledger {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| {
                CliError::parse(format!("invalid ledger {}: {e}", path.display()))
                    .with_hint(r#"expected {"payments": [...], "bids": [...], "audit": [...]}"#)
            })
    }

    /// Write via a sibling temp file and rename, so a crash never leaves a
    /// half-written ledger.
    pub fn save(&self, path: &Path) -> Result<(), CliError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CliError::eval(format!("JSON serialization error: {e}")))?;
        let tmp = tmp_path(path);
        std::fs::write(&tmp, json + "\n")
            .map_err(|e| CliError::io(format!("cannot write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| CliError::io(format!("cannot replace ledger {}: {e}", path.display())))
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// A ledger opened as engine collaborators.
pub struct OpenLedger {
    payments: Arc<MemoryPaymentStore>,
    bids: Arc<MemoryBidWorkflow>,
    audit: Arc<MemoryAuditLog>,
}

impl OpenLedger {
    pub fn open(path: &Path) -> Result<Self, CliError> {
        let ledger = Ledger::load(path)?;
        log::debug!(
            "ledger {}: {} payment(s), {} bid(s), {} audit record(s)",
            path.display(),
            ledger.payments.len(),
            ledger.bids.len(),
            ledger.audit.len()
        );
        Ok(Self {
            payments: Arc::new(MemoryPaymentStore::new(ledger.payments)),
            bids: Arc::new(MemoryBidWorkflow::new(ledger.bids)),
            audit: Arc::new(MemoryAuditLog::with_records(ledger.audit)),
        })
    }

    pub fn engine(&self, config: ReconConfig) -> Result<ReconciliationEngine, CliError> {
        ReconciliationEngine::new(config, self.payments.clone(), self.bids.clone(), self.audit.clone())
            .map_err(CliError::recon)
    }

    pub fn snapshot(&self) -> Ledger {
        Ledger {
            payments: self.payments.payments(),
            bids: self.bids.bids(),
            audit: self.audit.records(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CliError> {
        self.snapshot().save(path)
    }
}
