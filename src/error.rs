//! Error types for the mailpdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`MailPdfError`] — **Fatal**: the email cannot be ingested at all
//!   (unparseable message, invalid configuration, the document store
//!   refused a write). Returned as `Err(MailPdfError)` from
//!   [`crate::convert::convert_email`]. A store failure is the only class
//!   that aborts ingestion: if nothing can be persisted, nothing was
//!   preserved.
//!
//! * [`EngineError`] — **Recoverable batch failure**: a conversion engine
//!   rejected or failed a whole batch. Carried inside
//!   [`crate::pipeline::fallback::BatchDisposition`] and resolved by the
//!   fallback controller, never propagated to the caller. Per-item
//!   rejections (unsupported format, too large, password-protected) are not
//!   errors at all — they are expected outcomes recorded as a
//!   [`crate::outcome::ConversionReason`].
//!
//! The separation keeps the recovery policy in one place: everywhere except
//! persistence, the pipeline stores the original and marks conversion as
//! failed rather than raising, because losing a user's document is a worse
//! outcome than a missing PDF rendition.

use crate::outcome::EngineKind;
use std::fmt;
use thiserror::Error;

/// All fatal errors returned by the mailpdf library.
///
/// Engine failures use [`EngineError`] and are resolved by the fallback
/// controller rather than propagated here.
#[derive(Debug, Error)]
pub enum MailPdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The raw message could not be parsed as RFC 5322 mail.
    #[error("could not parse inbound message: {detail}")]
    MalformedEmail { detail: String },

    /// An attachment body carried invalid base64 content.
    #[error("attachment '{filename}' carries invalid base64 content")]
    InvalidAttachmentEncoding { filename: String },

    // ── Persistence errors ────────────────────────────────────────────────
    /// The document store failed. The only error class allowed to fail the
    /// whole ingestion.
    #[error("document store failed while persisting '{filename}': {source}")]
    Persistence {
        filename: String,
        #[source]
        source: StoreError,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure reported by the [`crate::collab::DocumentStore`] collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected the record (validation, quota, duplicate key).
    #[error("store rejected the record: {detail}")]
    Rejected { detail: String },

    /// The backend is unreachable or timed out.
    #[error("store unavailable: {detail}")]
    Unavailable { detail: String },

    /// Local filesystem failure (used by file-backed stores).
    #[error("I/O failure: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// A whole-batch failure raised by a conversion engine adapter.
///
/// Adapters classify every failure into a closed [`EngineErrorKind`] at the
/// boundary so downstream code never inspects HTTP status codes or message
/// strings to decide policy. The fallback controller switches engines only
/// on [`EngineErrorKind::Configuration`]; every other kind degrades the
/// batch to originals-only.
#[derive(Debug, Clone, Error)]
#[error("{engine} engine {kind}: {message}")]
pub struct EngineError {
    /// Which adapter raised the failure.
    pub engine: EngineKind,
    /// Closed failure taxonomy; drives the fallback decision.
    pub kind: EngineErrorKind,
    /// HTTP status, when the failure came off the wire.
    pub http_status: Option<u16>,
    /// Human-readable detail for logs and the error reporter.
    pub message: String,
}

impl EngineError {
    /// Build a configuration failure (engine unusable before any job ran).
    pub fn configuration(engine: EngineKind, message: impl Into<String>) -> Self {
        Self {
            engine,
            kind: EngineErrorKind::Configuration,
            http_status: None,
            message: message.into(),
        }
    }

    /// Build a fatal processing failure (job ran, results unusable).
    pub fn fatal(engine: EngineKind, message: impl Into<String>) -> Self {
        Self {
            engine,
            kind: EngineErrorKind::Fatal,
            http_status: None,
            message: message.into(),
        }
    }

    /// Build a transient failure (timeout, 5xx); a caller-level retry may
    /// succeed, though this pipeline never retries the same engine.
    pub fn transient(engine: EngineKind, message: impl Into<String>) -> Self {
        Self {
            engine,
            kind: EngineErrorKind::Transient,
            http_status: None,
            message: message.into(),
        }
    }

    /// Attach the HTTP status the failure was derived from.
    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Whether a retry against the *same* engine could plausibly succeed.
    ///
    /// Exposed for callers embedding the pipeline in a queue with its own
    /// redelivery policy; the pipeline itself only ever falls back across
    /// engines, never retries in place.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            EngineErrorKind::Transient | EngineErrorKind::RateLimited { .. }
        )
    }
}

/// Closed taxonomy of engine failures.
///
/// Modelled as a tagged enum rather than ad-hoc status-code checks so every
/// call site branches on the same four cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Engine unusable due to missing setup (no credentials, no endpoint).
    /// Raised before any network call; the only kind that triggers an
    /// engine-to-engine fallback.
    Configuration,
    /// HTTP 429. `retry_after_secs` carries a server-specified delay when
    /// the response included one.
    RateLimited { retry_after_secs: Option<u64> },
    /// Timeout or 5xx; the job may succeed on redelivery.
    Transient,
    /// Auth failures, malformed responses, other 4xx; redelivery will not
    /// help.
    Fatal,
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineErrorKind::Configuration => write!(f, "configuration error"),
            EngineErrorKind::RateLimited {
                retry_after_secs: Some(secs),
            } => write!(f, "rate limited (retry after {secs}s)"),
            EngineErrorKind::RateLimited {
                retry_after_secs: None,
            } => write!(f, "rate limited"),
            EngineErrorKind::Transient => write!(f, "transient failure"),
            EngineErrorKind::Fatal => write!(f, "fatal failure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_display_includes_engine_and_kind() {
        let e = EngineError::configuration(EngineKind::Cloud, "no API key configured");
        let msg = e.to_string();
        assert!(msg.contains("cloud"), "got: {msg}");
        assert!(msg.contains("configuration"), "got: {msg}");
        assert!(msg.contains("no API key"), "got: {msg}");
    }

    #[test]
    fn rate_limited_display_with_delay() {
        let e = EngineError {
            engine: EngineKind::Cloud,
            kind: EngineErrorKind::RateLimited {
                retry_after_secs: Some(30),
            },
            http_status: Some(429),
            message: "slow down".into(),
        };
        assert!(e.to_string().contains("retry after 30s"));
        assert!(e.is_retryable());
    }

    #[test]
    fn configuration_errors_are_not_retryable() {
        let e = EngineError::configuration(EngineKind::Cloud, "unconfigured");
        assert!(!e.is_retryable());
    }

    #[test]
    fn transient_errors_are_retryable() {
        let e = EngineError::transient(EngineKind::Local, "renderer crashed").with_status(503);
        assert!(e.is_retryable());
        assert_eq!(e.http_status, Some(503));
    }

    #[test]
    fn persistence_error_chains_source() {
        let e = MailPdfError::Persistence {
            filename: "report.docx".into(),
            source: StoreError::Unavailable {
                detail: "connection refused".into(),
            },
        };
        assert!(e.to_string().contains("report.docx"));
        assert!(e.to_string().contains("connection refused"));
    }
}
