//! Append-only audit trail.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReconError;
use crate::model::Actor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Payment,
    Bid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Matched,
    ManualMatchNote,
    Disputed,
    BidReopened,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Matched => write!(f, "matched"),
            Self::ManualMatchNote => write!(f, "manual_match_note"),
            Self::Disputed => write!(f, "disputed"),
            Self::BidReopened => write!(f, "bid_reopened"),
        }
    }
}

/// Immutable audit entry. Never updated or deleted once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub entity_type: EntityKind,
    pub entity_id: String,
    pub action: AuditAction,
    pub payload: serde_json::Value,
    pub actor: Actor,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        entity_type: EntityKind,
        entity_id: impl Into<String>,
        action: AuditAction,
        payload: serde_json::Value,
        actor: Actor,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type,
            entity_id: entity_id.into(),
            action,
            payload,
            actor,
            recorded_at,
        }
    }
}

/// Audit persistence. Part of the commit write set: an error here aborts
/// the enclosing commit.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord) -> Result<(), ReconError>;

    /// Append several records as one write. The default appends one by one;
    /// sinks that can write atomically should override it.
    fn append_batch(&self, records: Vec<AuditRecord>) -> Result<(), ReconError> {
        for record in records {
            self.append(record)?;
        }
        Ok(())
    }
}

/// In-memory audit log.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with previously persisted records.
    pub fn with_records(records: Vec<AuditRecord>) -> Self {
        Self { records: RwLock::new(records) }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    pub fn for_entity(&self, entity_type: EntityKind, entity_id: &str) -> Vec<AuditRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.entity_type == entity_type && r.entity_id == entity_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&self, record: AuditRecord) -> Result<(), ReconError> {
        self.records.write().push(record);
        Ok(())
    }

    fn append_batch(&self, records: Vec<AuditRecord>) -> Result<(), ReconError> {
        self.records.write().extend(records);
        Ok(())
    }
}
