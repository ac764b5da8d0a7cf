//! Durable output model: per-item outcomes, document records, and the
//! per-email summary.
//!
//! Everything here outlives a single orchestration run. [`ConversionOutcome`]
//! is returned to the caller, [`NewDocument`]/[`DocumentRecord`] cross the
//! [`crate::collab::DocumentStore`] seam, and [`EmailConversionSummary`] is
//! handed to the metrics collaborator exactly once per inbound email.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Which conversion engine produced (or was asked to produce) an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Remote, API-based conversion service.
    Cloud,
    /// In-process headless rendering engine.
    Local,
}

impl EngineKind {
    /// Stable wire/engine name (`"cloud"` / `"local"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Cloud => "cloud",
            EngineKind::Local => "local",
        }
    }

    /// Parse an engine name as used in configuration and overrides.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloud" => Some(EngineKind::Cloud),
            "local" => Some(EngineKind::Local),
            _ => None,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an item ended up converted, stored as-is, or not converted.
///
/// This vocabulary is stable — it is consumed by UI layers — and closed: new
/// reasons require a coordinated rollout, not an ad-hoc string.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConversionReason {
    /// Converted, or intentionally stored as-is (PDFs bypass conversion
    /// entirely; that is an `Ok`, not a skip).
    Ok,
    /// Format has no conversion path.
    SkippedUnsupported,
    /// Non-PDF attachment above the conversion size ceiling.
    SkippedTooLarge,
    /// Heuristic detection says the file is password-protected.
    SkippedPasswordProtected,
    /// Conversion was attempted and failed; the original was stored.
    Error,
}

impl ConversionReason {
    /// Stable reason code (`"ok"`, `"skipped_too_large"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionReason::Ok => "ok",
            ConversionReason::SkippedUnsupported => "skipped_unsupported",
            ConversionReason::SkippedTooLarge => "skipped_too_large",
            ConversionReason::SkippedPasswordProtected => "skipped_password_protected",
            ConversionReason::Error => "error",
        }
    }
}

impl fmt::Display for ConversionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable status line derived from a reason, shown next to the
/// stored document.
pub fn user_visible_status(reason: ConversionReason, converted: bool) -> String {
    match (reason, converted) {
        (ConversionReason::Ok, true) => "Converted to PDF".to_string(),
        (ConversionReason::Ok, false) => "Stored original".to_string(),
        (ConversionReason::SkippedUnsupported, _) => {
            "Stored original (format not supported for conversion)".to_string()
        }
        (ConversionReason::SkippedTooLarge, _) => {
            "Stored original (too large to convert)".to_string()
        }
        (ConversionReason::SkippedPasswordProtected, _) => {
            "Stored original (password protected)".to_string()
        }
        (ConversionReason::Error, _) => "Stored original (conversion failed)".to_string(),
    }
}

/// Which logical slot of the email an outcome belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeSlot {
    /// The email body itself.
    Body,
    /// A named attachment.
    Attachment { filename: String },
}

impl fmt::Display for OutcomeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeSlot::Body => f.write_str("body"),
            OutcomeSlot::Attachment { filename } => write!(f, "attachment '{filename}'"),
        }
    }
}

/// Per-item result after orchestration resolves.
///
/// `success` means "the item was preserved and handled per policy" — a
/// skipped attachment whose original was stored is a success. `converted`
/// is true only when a PDF derivative exists.
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub slot: OutcomeSlot,
    pub success: bool,
    pub converted: bool,
    pub reason: ConversionReason,
    /// The untouched original, when one was persisted. `None` only for an
    /// email with no body content at all.
    pub original_document_id: Option<Uuid>,
    /// The converted derivative, when conversion succeeded.
    pub converted_document_id: Option<Uuid>,
    pub user_visible_status: String,
}

/// Fields handed to the document store for one record.
///
/// Invariants (enforced by the provenance builder):
/// * a derivative (`derived_from_document_id` set) always has
///   `conversion_engine` set and `conversion_reason = Ok`;
/// * an unconverted original always has `conversion_engine = None` and a
///   null input hash.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub tenant_id: Uuid,
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
    pub conversion_engine: Option<EngineKind>,
    pub conversion_reason: Option<ConversionReason>,
    /// Hex SHA-256 of the exact bytes/markup submitted for conversion.
    /// `None` for untouched originals.
    pub conversion_input_sha256: Option<String>,
    pub derived_from_document_id: Option<Uuid>,
    /// Message-ID of the inbound email, for audit queries.
    pub source_message_id: Option<String>,
    /// Opaque engine metadata (job id, timings) attached to derivatives.
    pub conversion_metadata: serde_json::Map<String, serde_json::Value>,
}

/// A persisted document as echoed back by the store collaborator.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub filename: String,
    pub mime: String,
    pub size_bytes: usize,
    pub conversion_engine: Option<EngineKind>,
    pub conversion_reason: Option<ConversionReason>,
    pub conversion_input_sha256: Option<String>,
    pub derived_from_document_id: Option<Uuid>,
    pub source_message_id: Option<String>,
    pub conversion_metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// One immutable summary per inbound email, recorded in success and failure
/// paths alike.
///
/// Accounting invariant: every logical slot (each attachment plus the body)
/// lands in exactly one bucket, so
/// `originals_stored + pdfs_produced + Σ skipped_counts == total_attachments + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConversionSummary {
    pub tenant_id: Uuid,
    pub message_id: Option<String>,
    pub total_attachments: usize,
    /// Slots whose final artifact is the original itself with `reason = ok`
    /// (PDF passthrough, attachment conversion disabled).
    pub originals_stored: usize,
    /// Slots for which a PDF derivative was produced.
    pub pdfs_produced: usize,
    /// Slots that were skipped or failed, keyed by reason.
    pub skipped_counts: BTreeMap<ConversionReason, usize>,
    /// Engine that handled the body, when a body conversion was attempted.
    pub conversion_engine: Option<EngineKind>,
    pub total_duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

impl EmailConversionSummary {
    /// Total slots accounted for across all buckets.
    pub fn accounted_slots(&self) -> usize {
        self.originals_stored + self.pdfs_produced + self.skipped_counts.values().sum::<usize>()
    }
}
