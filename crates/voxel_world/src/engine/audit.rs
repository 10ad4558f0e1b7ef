//! Structured audit records for every state-changing engine decision.

use serde::{Deserialize, Serialize};

use crate::geometry::Vec3i;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub tick: u64,
    pub actor: String,
    pub action: String,
    pub pos: [i32; 3],
    pub reason: String,
    pub details: serde_json::Value,
}

impl AuditEntry {
    pub fn new(
        tick: u64,
        actor: &str,
        action: &str,
        pos: Vec3i,
        reason: &str,
        details: serde_json::Value,
    ) -> Self {
        Self {
            tick,
            actor: actor.to_string(),
            action: action.to_string(),
            pos: pos.to_array(),
            reason: reason.to_string(),
            details,
        }
    }
}

/// Injected sink for audit entries. Persistence lives outside the engine.
pub trait AuditSink {
    fn write_audit(&mut self, entry: AuditEntry);
}

/// Collects entries in memory; the default sink for tests and tools.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    pub entries: std::sync::Arc<std::sync::Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditSink {
    pub fn new() -> (Self, std::sync::Arc<std::sync::Mutex<Vec<AuditEntry>>>) {
        let entries = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        (
            Self {
                entries: entries.clone(),
            },
            entries,
        )
    }
}

impl AuditSink for MemoryAuditSink {
    fn write_audit(&mut self, entry: AuditEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}
