//! `AuditSink` implementations
//!
//! - `TracingAuditSink` writes each entry as a structured `tracing` event under
//!   the `audit` target; the CLI uses it.
//! - `MemoryAuditSink` keeps entries in memory so tests can inspect them.

use crate::core::traits::AuditSink;
use crate::types::{AuditEntry, StoreError};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError> {
        let record = serde_json::to_string(&entry)
            .map_err(|e| StoreError::unavailable(format!("cannot encode audit entry: {}", e)))?;
        info!(target: "audit", run_id = %entry.run_id, actor = %entry.actor, "{}", record);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}
