//! Command audit trail
//!
//! Every command center invocation appends exactly one [`CommandAudit`]
//! entry. Entries are chained: each carries the hash of its predecessor, so
//! editing or dropping an entry breaks [`AuditLog::verify_integrity`].

use crate::command::CommandStatus;
use crate::error::AuditError;
use crate::types::{CorrelationId, IncidentId, TenantId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hash carried by the first entry as its predecessor
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One audited command invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAudit {
    pub sequence: u64,
    /// Command name as received
    pub command: String,
    pub incident_id: IncidentId,
    pub tenant_id: TenantId,
    pub correlation_id: CorrelationId,
    pub status: CommandStatus,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
    pub prev_hash: String,
    pub hash: String,
}

impl CommandAudit {
    /// Unsealed entry; sequence and hashes are assigned on append
    #[must_use]
    pub fn new(
        command: impl Into<String>,
        incident_id: IncidentId,
        tenant_id: TenantId,
        correlation_id: CorrelationId,
        status: CommandStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sequence: 0,
            command: command.into(),
            incident_id,
            tenant_id,
            correlation_id,
            status,
            message: message.into(),
            recorded_at: Utc::now(),
            prev_hash: String::new(),
            hash: String::new(),
        }
    }
}

/// Append-only, hash-chained audit log shared by all commands
#[derive(Debug, Default)]
pub struct AuditLog {
    inner: Mutex<Vec<CommandAudit>>,
}

impl AuditLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seal and append an entry, returning the sealed copy
    pub fn append(&self, mut entry: CommandAudit) -> CommandAudit {
        let mut guard = self.inner.lock();
        entry.sequence = guard.len() as u64;
        entry.prev_hash = guard
            .last()
            .map_or_else(|| GENESIS_HASH.to_string(), |e| e.hash.clone());
        entry.hash = compute_hash(&entry);
        guard.push(entry.clone());

        tracing::debug!(
            sequence = entry.sequence,
            command = %entry.command,
            status = %entry.status,
            "audit entry appended"
        );
        entry
    }

    /// Snapshot of every entry in append order
    pub fn entries(&self) -> Vec<CommandAudit> {
        self.inner.lock().clone()
    }

    /// Entries recorded for one incident
    pub fn entries_for(&self, incident_id: &IncidentId) -> Vec<CommandAudit> {
        self.inner
            .lock()
            .iter()
            .filter(|e| &e.incident_id == incident_id)
            .cloned()
            .collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Walk the chain and recompute every hash
    pub fn verify_integrity(&self) -> Result<(), AuditError> {
        verify_chain(&self.inner.lock())
    }
}

/// Verify an exported chain of entries
pub fn verify_chain(entries: &[CommandAudit]) -> Result<(), AuditError> {
    let mut prev = GENESIS_HASH;
    for (index, e) in entries.iter().enumerate() {
        if e.prev_hash != prev || e.sequence != index as u64 || e.hash != compute_hash(e) {
            return Err(AuditError::IntegrityViolation { index });
        }
        prev = &e.hash;
    }
    Ok(())
}

fn compute_hash(entry: &CommandAudit) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.sequence.to_le_bytes());
    hasher.update(entry.command.as_bytes());
    hasher.update([0]);
    hasher.update(entry.incident_id.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(entry.tenant_id.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(entry.correlation_id.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(entry.status.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(entry.message.as_bytes());
    hasher.update([0]);
    hasher.update(entry.recorded_at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(entry.prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}
