//! External collaborator seams.
//!
//! The pipeline never writes files, calls error trackers, or reads flag
//! backends directly — it talks to the narrow traits here. Hosts wire in
//! their real implementations; tests and the CLI use the in-memory/file
//! implementations shipped alongside.
//!
//! `ErrorReporter` and `MetricsSink` are fire-and-forget: all methods have
//! no-op defaults, must not block, and must not fail — delivery runs through
//! the buffered dispatcher in [`crate::report`] so a slow backend can never
//! stall conversion.

use crate::error::{EngineError, StoreError};
use crate::outcome::{DocumentRecord, EmailConversionSummary, NewDocument};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Persistence collaborator. The pipeline hands finished bytes plus metadata
/// to this trait and owns nothing about where they land.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(&self, doc: NewDocument) -> Result<DocumentRecord, StoreError>;
}

/// Context attached to every reported engine failure.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Engine job id, when the failure happened after a job was created.
    pub job_id: Option<String>,
    pub tenant_id: Uuid,
    pub attachment_count: usize,
}

/// Error-reporting collaborator (Sentry-shaped). Fire-and-forget.
pub trait ErrorReporter: Send + Sync {
    fn report_error(&self, error: &EngineError, context: &ErrorContext) {
        let _ = (error, context);
    }
}

/// Metrics collaborator receiving one summary per inbound email.
/// Fire-and-forget.
pub trait MetricsSink: Send + Sync {
    fn record_email_summary(&self, summary: &EmailConversionSummary) {
        let _ = summary;
    }
}

/// No-op reporter/sink for hosts that don't care.
pub struct NoopCollaborator;

impl ErrorReporter for NoopCollaborator {}
impl MetricsSink for NoopCollaborator {}

// ── Feature flags ────────────────────────────────────────────────────────

/// An immutable snapshot of rollout flags for one tenant.
///
/// [`crate::decision::decide_engines`] is pure given this snapshot; taking a
/// snapshot up front (rather than querying a live store mid-decision) keeps
/// the engine decision reproducible and testable.
#[derive(Debug, Clone, Default)]
pub struct FlagSnapshot {
    rollouts: HashMap<String, u8>,
}

impl FlagSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a rollout percentage (0–100) for a feature.
    pub fn with_rollout(mut self, feature: impl Into<String>, percent: u8) -> Self {
        self.rollouts.insert(feature.into(), percent.min(100));
        self
    }

    /// Rollout percentage for a feature, `None` when the flag is unset.
    pub fn rollout(&self, feature: &str) -> Option<u8> {
        self.rollouts.get(feature).copied()
    }
}

/// Flag-store collaborator: produces per-tenant snapshots.
pub trait FlagStore: Send + Sync {
    fn snapshot(&self, tenant_id: Uuid) -> FlagSnapshot;
}

/// A flag store that serves the same snapshot to every tenant.
pub struct StaticFlags(pub FlagSnapshot);

impl FlagStore for StaticFlags {
    fn snapshot(&self, _tenant_id: Uuid) -> FlagSnapshot {
        self.0.clone()
    }
}

// ── In-memory store ──────────────────────────────────────────────────────

/// In-memory [`DocumentStore`] for tests and embedded use.
///
/// Writes are idempotent by content identity: re-submitting a record with
/// the same tenant, filename, lineage, and input hash returns the existing
/// document rather than creating a duplicate.
#[derive(Default)]
pub struct MemoryDocumentStore {
    records: Mutex<Vec<DocumentRecord>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every persisted record, in creation order.
    pub fn documents(&self) -> Vec<DocumentRecord> {
        self.records.lock().expect("store poisoned").clone()
    }

    pub fn find(&self, id: Uuid) -> Option<DocumentRecord> {
        self.records
            .lock()
            .expect("store poisoned")
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create_document(&self, doc: NewDocument) -> Result<DocumentRecord, StoreError> {
        let mut records = self.records.lock().expect("store poisoned");

        if let Some(existing) = records.iter().find(|r| {
            r.tenant_id == doc.tenant_id
                && r.filename == doc.filename
                && r.derived_from_document_id == doc.derived_from_document_id
                && r.conversion_input_sha256 == doc.conversion_input_sha256
                && r.size_bytes == doc.bytes.len()
        }) {
            return Ok(existing.clone());
        }

        let record = DocumentRecord {
            id: Uuid::new_v4(),
            tenant_id: doc.tenant_id,
            filename: doc.filename,
            mime: doc.mime,
            size_bytes: doc.bytes.len(),
            conversion_engine: doc.conversion_engine,
            conversion_reason: doc.conversion_reason,
            conversion_input_sha256: doc.conversion_input_sha256,
            derived_from_document_id: doc.derived_from_document_id,
            source_message_id: doc.source_message_id,
            conversion_metadata: doc.conversion_metadata,
            created_at: Utc::now(),
        };
        records.push(record.clone());
        Ok(record)
    }
}
