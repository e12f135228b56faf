//! Destinations for finished audit records.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, info};

use crate::models::AuditRecord;

/// Tracing target of access lines. Route it separately with
/// `RUST_LOG=gateway_guard::access=info`.
pub const ACCESS_TARGET: &str = "gateway_guard::access";

/// Receives each audit record exactly once.
///
/// Called from the response body's poll path, so implementations must not block.
pub trait AuditSink: Send + Sync + 'static {
    fn emit(&self, record: &AuditRecord);
}

/// Writes one `==access==` event per record through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn emit(&self, record: &AuditRecord) {
        match serde_json::to_string(record) {
            Ok(json) => info!(
                target: ACCESS_TARGET,
                request_id = %record.request_id,
                record = %json,
                "==access=="
            ),
            Err(e) => error!(
                target: ACCESS_TARGET,
                request_id = %record.request_id,
                error = %e,
                "Failed to serialize audit record"
            ),
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all records emitted so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemorySink {
    fn emit(&self, record: &AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}
