//! # mailpdf
//!
//! Convert inbound email — body and attachments — into durable, auditable
//! PDF artifacts while preserving every original.
//!
//! ## Why this crate?
//!
//! Email is the messiest ingestion channel there is: bodies arrive as
//! hostile HTML or bare text, attachments in a dozen office formats, some
//! encrypted, some enormous, some empty. This crate orchestrates the
//! conversion of all of it through heterogeneous backends — a remote
//! conversion API and an in-process headless renderer — with one hard
//! guarantee: **a user's original content is never lost or silently
//! dropped**, whatever the engines do. Every conversion leaves a verifiable
//! chain of custody (input hash → output artifact) behind it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! InboundEmail
//!  │
//!  ├─ 1. Decide    engine override → rollout flags → safe default
//!  ├─ 2. Sanitize  allow-list HTML cleanup + provenance header
//!  ├─ 3. Classify  per attachment: store / convert / reject
//!  ├─ 4. Submit    one batch to cloud or local engine (correlation ids)
//!  ├─ 5. Fallback  config error → alternate engine once; else originals-only
//!  ├─ 6. Persist   original first, then derivative with SHA-256 lineage
//!  └─ 7. Summary   one immutable record per email, on every path
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mailpdf::{
//!     convert_email, CloudEngine, ConversionConfig, FlagSnapshot, InboundEmail,
//!     LocalEngine, MemoryDocumentStore, PipelineDeps,
//! };
//! use mailpdf::report::noop_dispatcher;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let email = InboundEmail::from_mime(&std::fs::read("message.eml")?)?;
//!     let config = ConversionConfig::default();
//!     let (reports, _dispatcher) = noop_dispatcher();
//!     let deps = PipelineDeps {
//!         store: Arc::new(MemoryDocumentStore::new()),
//!         cloud: Arc::new(CloudEngine::from_config(&config)),
//!         local: Arc::new(LocalEngine::new(config.render_timeout_secs)),
//!         reports,
//!         flags: FlagSnapshot::new(),
//!     };
//!     let report = convert_email(&email, &config, &deps).await?;
//!     println!("{} PDFs produced", report.summary.pdfs_produced);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mailpdf` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! mailpdf = { version = "0.3", default-features = false }
//! ```
//!
//! ## Guarantees
//!
//! * **Never-lose-original** — every attachment and body has an original
//!   document persisted, whatever the conversion outcome.
//! * **Single fallback** — a cloud configuration error retries on the local
//!   engine exactly once; nothing retries indefinitely.
//! * **Provenance** — derivatives carry the SHA-256 of the exact submitted
//!   input and a single-level lineage link to their original.
//! * **Accounted summaries** — one summary per email, on success and
//!   failure, with every slot in exactly one bucket.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod collab;
pub mod config;
pub mod convert;
pub mod decision;
pub mod email;
pub mod error;
pub mod outcome;
pub mod pipeline;
pub mod report;
pub mod template;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use collab::{
    DocumentStore, ErrorContext, ErrorReporter, FlagSnapshot, FlagStore, MemoryDocumentStore,
    MetricsSink, NoopCollaborator, StaticFlags,
};
pub use config::{
    ConversionConfig, ConversionConfigBuilder, EngineOverrides, SubscriptionTier,
    DEFAULT_MAX_ATTACHMENT_BYTES,
};
pub use convert::{convert_email, EmailConversionReport, PipelineDeps};
pub use decision::{
    decide_engines, DecisionContext, EngineDecision, FLAG_CLOUD_BODY, FLAG_CONVERT_ATTACHMENTS,
};
pub use email::{tenant_from_recipient, Attachment, InboundEmail};
pub use error::{EngineError, EngineErrorKind, MailPdfError, StoreError};
pub use outcome::{
    ConversionOutcome, ConversionReason, DocumentRecord, EmailConversionSummary, EngineKind,
    NewDocument, OutcomeSlot,
};
pub use pipeline::cloud::CloudEngine;
pub use pipeline::engine::{
    ConversionArtifact, ConversionEngine, ConversionInput, EngineBatch, EngineOutput,
    InputContent, OutputDisposition,
};
pub use pipeline::fallback::BatchDisposition;
pub use pipeline::local::LocalEngine;
pub use report::{spawn_dispatcher, ReportHandle};
