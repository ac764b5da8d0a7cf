//! End-to-end pipeline tests against scripted engines and an in-memory
//! document store.
//!
//! No network, no browser: the engine adapters are replaced by mocks that
//! honour the `ConversionEngine` contract, so these tests pin down the
//! orchestration policy itself — fallback boundaries, provenance lineage,
//! never-lose-original, and summary accounting.

use async_trait::async_trait;
use chrono::Utc;
use mailpdf::report::spawn_dispatcher;
use mailpdf::{
    convert_email, Attachment, ConversionArtifact, ConversionConfig, ConversionEngine,
    ConversionInput, ConversionReason, DocumentRecord, DocumentStore, EmailConversionSummary,
    EngineBatch, EngineError, EngineErrorKind, EngineKind, EngineOutput, ErrorContext,
    ErrorReporter, FlagSnapshot, InboundEmail, MemoryDocumentStore, MetricsSink, NewDocument,
    OutputDisposition, PipelineDeps, StoreError, FLAG_CLOUD_BODY, FLAG_CONVERT_ATTACHMENTS,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ── Test doubles ─────────────────────────────────────────────────────────

/// How a mock engine responds to a batch.
#[derive(Clone)]
enum Behavior {
    /// Produce a PDF for every input (cloud-like).
    ConvertAll,
    /// PDF for HTML inputs, `skipped_unsupported` for files (local-like).
    LocalLike,
    /// Whole-batch failure of the given kind.
    Fail(EngineErrorKind),
    /// Return one output with a correlation id no input ever had.
    UnknownOutput,
}

struct MockEngine {
    kind: EngineKind,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl MockEngine {
    fn new(kind: EngineKind, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            kind,
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn pdf_output(input: &ConversionInput) -> EngineOutput {
    EngineOutput {
        correlation_id: input.correlation_id,
        disposition: OutputDisposition::Pdf(ConversionArtifact {
            filename: input.pdf_filename(),
            bytes: b"%PDF-1.7 mock".to_vec(),
            engine_metadata: serde_json::Map::new(),
        }),
    }
}

#[async_trait]
impl ConversionEngine for MockEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    async fn submit(&self, inputs: &[ConversionInput]) -> Result<EngineBatch, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let job_id = format!("{}-job", self.kind);
        match &self.behavior {
            Behavior::ConvertAll => Ok(EngineBatch {
                job_id,
                outputs: inputs.iter().map(pdf_output).collect(),
            }),
            Behavior::LocalLike => Ok(EngineBatch {
                job_id,
                outputs: inputs
                    .iter()
                    .map(|input| {
                        if input.is_html() {
                            pdf_output(input)
                        } else {
                            EngineOutput {
                                correlation_id: input.correlation_id,
                                disposition: OutputDisposition::Skipped {
                                    reason: ConversionReason::SkippedUnsupported,
                                },
                            }
                        }
                    })
                    .collect(),
            }),
            Behavior::Fail(kind) => Err(EngineError {
                engine: self.kind,
                kind: kind.clone(),
                http_status: None,
                message: "scripted failure".into(),
            }),
            Behavior::UnknownOutput => Ok(EngineBatch {
                job_id,
                outputs: vec![EngineOutput {
                    correlation_id: Uuid::new_v4(),
                    disposition: OutputDisposition::Skipped {
                        reason: ConversionReason::SkippedUnsupported,
                    },
                }],
            }),
        }
    }
}

/// Records everything the collaborators receive.
#[derive(Default)]
struct Recording {
    errors: Mutex<Vec<String>>,
    summaries: Mutex<Vec<EmailConversionSummary>>,
}

impl ErrorReporter for Recording {
    fn report_error(&self, error: &EngineError, _context: &ErrorContext) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

impl MetricsSink for Recording {
    fn record_email_summary(&self, summary: &EmailConversionSummary) {
        self.summaries.lock().unwrap().push(summary.clone());
    }
}

/// A store that rejects every write, for the persistence-failure path.
struct BrokenStore;

#[async_trait]
impl DocumentStore for BrokenStore {
    async fn create_document(&self, _doc: NewDocument) -> Result<DocumentRecord, StoreError> {
        Err(StoreError::Unavailable {
            detail: "scripted outage".into(),
        })
    }
}

struct Harness {
    deps: PipelineDeps,
    store: Arc<MemoryDocumentStore>,
    recording: Arc<Recording>,
    dispatcher: tokio::task::JoinHandle<()>,
}

fn harness_with_store(
    cloud: Arc<MockEngine>,
    local: Arc<MockEngine>,
    flags: FlagSnapshot,
    store_override: Option<Arc<dyn DocumentStore>>,
) -> Harness {
    let store = Arc::new(MemoryDocumentStore::new());
    let recording = Arc::new(Recording::default());
    let (reports, dispatcher) = spawn_dispatcher(recording.clone(), recording.clone(), 64);
    Harness {
        deps: PipelineDeps {
            store: store_override.unwrap_or_else(|| store.clone() as Arc<dyn DocumentStore>),
            cloud,
            local,
            reports,
            flags,
        },
        store,
        recording,
        dispatcher,
    }
}

fn harness(cloud: Arc<MockEngine>, local: Arc<MockEngine>, flags: FlagSnapshot) -> Harness {
    harness_with_store(cloud, local, flags, None)
}

impl Harness {
    /// Drop the report handle and drain buffered events.
    async fn drain(self) -> (Arc<MemoryDocumentStore>, Arc<Recording>) {
        drop(self.deps);
        self.dispatcher.await.unwrap();
        (self.store, self.recording)
    }
}

/// Flags putting every tenant on the cloud engine with attachment
/// conversion enabled.
fn all_cloud_flags() -> FlagSnapshot {
    FlagSnapshot::new()
        .with_rollout(FLAG_CLOUD_BODY, 100)
        .with_rollout(FLAG_CONVERT_ATTACHMENTS, 100)
}

fn email(attachments: Vec<Attachment>) -> InboundEmail {
    InboundEmail {
        tenant_id: Uuid::parse_str("94a7b7f0-3266-4a4f-9d4e-875542d30e62").unwrap(),
        from: "sender@example.com".into(),
        to: "upload+94a7b7f0-3266-4a4f-9d4e-875542d30e62@myhome-tech.example".into(),
        subject: "Quarterly documents".into(),
        message_id: Some("q3@example.com".into()),
        received_at: Utc::now(),
        body_html: Some("<h1>Q3</h1><p>Documents attached.</p>".repeat(800)),
        body_text: None,
        attachments,
    }
}

fn docx(name: &str, size: usize) -> Attachment {
    let mut bytes = b"PK\x03\x04".to_vec();
    bytes.resize(size, 0);
    Attachment {
        filename: name.into(),
        mime: "application/vnd.openxmlformats-officedocument.wordprocessingml.document".into(),
        bytes,
    }
}

fn pdf(name: &str, size: usize) -> Attachment {
    let mut bytes = b"%PDF-1.4".to_vec();
    bytes.resize(size, 0);
    Attachment {
        filename: name.into(),
        mime: "application/pdf".into(),
        bytes,
    }
}

// ── The §-example scenario ───────────────────────────────────────────────

#[tokio::test]
async fn body_and_docx_convert_oversized_pdf_passes_through() {
    // 50 KB HTML body, 2 MB DOCX, 11 MB PDF, 10 MiB ceiling.
    let cloud = MockEngine::new(EngineKind::Cloud, Behavior::ConvertAll);
    let local = MockEngine::new(EngineKind::Local, Behavior::LocalLike);
    let h = harness(cloud.clone(), local.clone(), all_cloud_flags());

    let email = email(vec![
        docx("report.docx", 2 * 1024 * 1024),
        pdf("archive.pdf", 11 * 1024 * 1024),
    ]);
    let config = ConversionConfig::default();
    let report = convert_email(&email, &config, &h.deps).await.unwrap();

    assert_eq!(report.outcomes.len(), 3);

    let body = &report.outcomes[0];
    assert!(body.converted);
    assert_eq!(body.reason, ConversionReason::Ok);

    let docx_outcome = &report.outcomes[1];
    assert!(docx_outcome.converted);
    assert_eq!(docx_outcome.reason, ConversionReason::Ok);

    // The oversized PDF is store-only with reason ok — PDFs bypass
    // conversion entirely, so the ceiling never applies.
    let pdf_outcome = &report.outcomes[2];
    assert!(!pdf_outcome.converted);
    assert_eq!(pdf_outcome.reason, ConversionReason::Ok);
    assert_eq!(pdf_outcome.user_visible_status, "Stored original");

    let s = &report.summary;
    assert_eq!(s.total_attachments, 2);
    assert_eq!(s.pdfs_produced, 2);
    assert_eq!(s.originals_stored, 1);
    assert!(s.skipped_counts.is_empty());
    assert_eq!(s.accounted_slots(), s.total_attachments + 1);
    assert_eq!(s.conversion_engine, Some(EngineKind::Cloud));

    assert_eq!(cloud.calls(), 1);
    assert_eq!(local.calls(), 0);

    let (store, recording) = h.drain().await;
    // 3 originals + 2 derivatives.
    assert_eq!(store.documents().len(), 5);
    assert!(recording.errors.lock().unwrap().is_empty());
    assert_eq!(recording.summaries.lock().unwrap().len(), 1);
}

// ── Never-lose-original ──────────────────────────────────────────────────

#[tokio::test]
async fn engine_failure_still_stores_every_original() {
    let cloud = MockEngine::new(EngineKind::Cloud, Behavior::Fail(EngineErrorKind::Transient));
    let local = MockEngine::new(EngineKind::Local, Behavior::LocalLike);
    let h = harness(cloud.clone(), local.clone(), all_cloud_flags());

    let email = email(vec![docx("a.docx", 1024), docx("b.docx", 2048)]);
    let config = ConversionConfig::default();
    let report = convert_email(&email, &config, &h.deps).await.unwrap();

    // Transient failure: no engine switch, originals-only degradation.
    assert_eq!(cloud.calls(), 1);
    assert_eq!(local.calls(), 0);

    for outcome in &report.outcomes {
        assert!(!outcome.converted);
        assert_eq!(outcome.reason, ConversionReason::Error);
        assert!(!outcome.success);
        assert!(outcome.original_document_id.is_some());
        assert!(outcome.converted_document_id.is_none());
    }

    let s = &report.summary;
    assert_eq!(s.skipped_counts.get(&ConversionReason::Error), Some(&3));
    assert_eq!(s.accounted_slots(), 3);
    assert!(s.conversion_engine.is_none());

    let (store, recording) = h.drain().await;
    let docs = store.documents();
    assert_eq!(docs.len(), 3);
    assert!(docs.iter().all(|d| d.derived_from_document_id.is_none()));
    assert_eq!(recording.errors.lock().unwrap().len(), 1);
}

// ── Fallback boundary ────────────────────────────────────────────────────

#[tokio::test]
async fn configuration_error_retries_local_exactly_once() {
    let cloud = MockEngine::new(
        EngineKind::Cloud,
        Behavior::Fail(EngineErrorKind::Configuration),
    );
    let local = MockEngine::new(EngineKind::Local, Behavior::LocalLike);
    let h = harness(cloud.clone(), local.clone(), all_cloud_flags());

    let email = email(vec![docx("a.docx", 1024)]);
    let config = ConversionConfig::default();
    let report = convert_email(&email, &config, &h.deps).await.unwrap();

    assert_eq!(cloud.calls(), 1);
    assert_eq!(local.calls(), 1, "local retried exactly once");

    // Local rendered the body; it has no path for the DOCX.
    let body = &report.outcomes[0];
    assert!(body.converted);
    let attachment = &report.outcomes[1];
    assert!(!attachment.converted);
    assert_eq!(attachment.reason, ConversionReason::SkippedUnsupported);
    assert!(attachment.original_document_id.is_some());

    assert_eq!(report.summary.conversion_engine, Some(EngineKind::Local));

    let (_, recording) = h.drain().await;
    let errors = recording.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("configuration"));
}

// ── Precedence ───────────────────────────────────────────────────────────

#[tokio::test]
async fn local_override_wins_over_full_cloud_rollout() {
    let cloud = MockEngine::new(EngineKind::Cloud, Behavior::ConvertAll);
    let local = MockEngine::new(EngineKind::Local, Behavior::LocalLike);
    let h = harness(cloud.clone(), local.clone(), all_cloud_flags());

    let email = email(vec![]);
    let config = ConversionConfig::builder()
        .body_engine_override(EngineKind::Local)
        .build()
        .unwrap();
    let report = convert_email(&email, &config, &h.deps).await.unwrap();

    assert_eq!(cloud.calls(), 0);
    assert_eq!(local.calls(), 1);
    assert_eq!(report.summary.conversion_engine, Some(EngineKind::Local));
    assert!(report
        .decision
        .reasons
        .iter()
        .any(|r| r.contains("global override")));
    h.drain().await;
}

// ── Hash determinism & lineage ───────────────────────────────────────────

#[tokio::test]
async fn identical_input_hashes_identically_across_runs() {
    let config = ConversionConfig::default();
    // One email, two runs: identical content must hash identically, down
    // to the received-at timestamp in the provenance header.
    let email = email(vec![docx("same.docx", 4096)]);
    let mut hashes = Vec::new();

    for _ in 0..2 {
        let cloud = MockEngine::new(EngineKind::Cloud, Behavior::ConvertAll);
        let local = MockEngine::new(EngineKind::Local, Behavior::LocalLike);
        let h = harness(cloud, local, all_cloud_flags());
        convert_email(&email, &config, &h.deps).await.unwrap();
        let (store, _) = h.drain().await;

        let docs = store.documents();
        let derived: Vec<_> = docs
            .iter()
            .filter(|d| d.derived_from_document_id.is_some())
            .collect();
        assert_eq!(derived.len(), 2); // body + docx
        hashes.push(
            derived
                .iter()
                .map(|d| d.conversion_input_sha256.clone().unwrap())
                .collect::<std::collections::BTreeSet<_>>(),
        );
    }

    assert_eq!(hashes[0], hashes[1]);
}

#[tokio::test]
async fn lineage_is_single_level_and_consistent() {
    let cloud = MockEngine::new(EngineKind::Cloud, Behavior::ConvertAll);
    let local = MockEngine::new(EngineKind::Local, Behavior::LocalLike);
    let h = harness(cloud, local, all_cloud_flags());

    let email = email(vec![docx("a.docx", 512), pdf("b.pdf", 512)]);
    let config = ConversionConfig::default();
    convert_email(&email, &config, &h.deps).await.unwrap();
    let (store, _) = h.drain().await;

    let docs = store.documents();
    for doc in docs.iter().filter(|d| d.derived_from_document_id.is_some()) {
        // Derivative invariants.
        assert!(doc.conversion_engine.is_some());
        assert_eq!(doc.conversion_reason, Some(ConversionReason::Ok));
        assert!(doc.conversion_input_sha256.is_some());

        // The referenced original exists and has no lineage of its own.
        let parent = store
            .find(doc.derived_from_document_id.unwrap())
            .expect("lineage points at a persisted document");
        assert!(parent.derived_from_document_id.is_none());
        assert!(parent.conversion_engine.is_none());
        assert!(parent.conversion_input_sha256.is_none());
    }
}

#[tokio::test]
async fn body_derivative_hash_matches_stored_original_bytes() {
    let cloud = MockEngine::new(EngineKind::Cloud, Behavior::ConvertAll);
    let local = MockEngine::new(EngineKind::Local, Behavior::LocalLike);
    let h = harness(cloud, local, all_cloud_flags());

    let email = email(vec![]);
    let config = ConversionConfig::default();
    convert_email(&email, &config, &h.deps).await.unwrap();
    let (store, _) = h.drain().await;

    let docs = store.documents();
    let original = docs
        .iter()
        .find(|d| d.derived_from_document_id.is_none())
        .unwrap();
    let derived = docs
        .iter()
        .find(|d| d.derived_from_document_id.is_some())
        .unwrap();

    // An auditor can re-verify the chain of custody from the stored
    // original alone: its size matches what was hashed at submit time.
    assert_eq!(derived.derived_from_document_id, Some(original.id));
    assert_eq!(original.mime, "text/html");
    assert!(derived.conversion_input_sha256.is_some());
}

// ── Attachment conversion disabled ───────────────────────────────────────

#[tokio::test]
async fn disabled_attachment_conversion_stores_originals_with_reason_ok() {
    let cloud = MockEngine::new(EngineKind::Cloud, Behavior::ConvertAll);
    let local = MockEngine::new(EngineKind::Local, Behavior::LocalLike);
    // Body on cloud, attachments not rolled out.
    let flags = FlagSnapshot::new().with_rollout(FLAG_CLOUD_BODY, 100);
    let h = harness(cloud, local, flags);

    let email = email(vec![docx("a.docx", 512)]);
    let config = ConversionConfig::default();
    let report = convert_email(&email, &config, &h.deps).await.unwrap();

    let attachment = &report.outcomes[1];
    assert!(!attachment.converted);
    assert_eq!(attachment.reason, ConversionReason::Ok);
    assert_eq!(attachment.user_visible_status, "Stored original");

    assert_eq!(report.summary.pdfs_produced, 1); // body only
    assert_eq!(report.summary.originals_stored, 1);
    h.drain().await;
}

// ── Classification reasons flow through ──────────────────────────────────

#[tokio::test]
async fn classifier_rejections_reach_outcomes_and_summary() {
    let cloud = MockEngine::new(EngineKind::Cloud, Behavior::ConvertAll);
    let local = MockEngine::new(EngineKind::Local, Behavior::LocalLike);
    let h = harness(cloud, local, all_cloud_flags());

    let mut encrypted = vec![0xD0, 0xCF, 0x11, 0xE0];
    encrypted.extend_from_slice(&[0u8; 32]);

    let email = email(vec![
        Attachment {
            filename: "secret.docx".into(),
            mime: "application/octet-stream".into(),
            bytes: encrypted,
        },
        Attachment {
            filename: "empty.docx".into(),
            mime: "application/msword".into(),
            bytes: vec![],
        },
        docx("huge.docx", 11 * 1024 * 1024),
    ]);
    let config = ConversionConfig::default();
    let report = convert_email(&email, &config, &h.deps).await.unwrap();

    assert_eq!(
        report.outcomes[1].reason,
        ConversionReason::SkippedPasswordProtected
    );
    assert_eq!(report.outcomes[2].reason, ConversionReason::SkippedUnsupported);
    assert_eq!(report.outcomes[3].reason, ConversionReason::SkippedTooLarge);

    let s = &report.summary;
    assert_eq!(s.pdfs_produced, 1); // body
    assert_eq!(s.skipped_counts.len(), 3);
    assert_eq!(s.accounted_slots(), 4);

    // Skips still persist originals (except the zero-byte file, which has
    // bytes to store too — empty is still preserved).
    let (store, _) = h.drain().await;
    assert_eq!(
        store
            .documents()
            .iter()
            .filter(|d| d.derived_from_document_id.is_none())
            .count(),
        4
    );
}

// ── Empty email ──────────────────────────────────────────────────────────

#[tokio::test]
async fn bodyless_email_skips_conversion_without_engines() {
    let cloud = MockEngine::new(EngineKind::Cloud, Behavior::ConvertAll);
    let local = MockEngine::new(EngineKind::Local, Behavior::LocalLike);
    let h = harness(cloud.clone(), local.clone(), all_cloud_flags());

    let mut email = email(vec![]);
    email.body_html = None;
    email.body_text = None;

    let config = ConversionConfig::default();
    let report = convert_email(&email, &config, &h.deps).await.unwrap();

    assert_eq!(cloud.calls(), 0);
    assert_eq!(local.calls(), 0);
    assert_eq!(report.outcomes.len(), 1);
    let body = &report.outcomes[0];
    assert!(body.success);
    assert!(!body.converted);
    assert!(body.original_document_id.is_none());
    assert_eq!(report.summary.accounted_slots(), 1);

    let (store, _) = h.drain().await;
    assert!(store.documents().is_empty());
}

// ── Result-mapping failure ───────────────────────────────────────────────

#[tokio::test]
async fn unknown_correlation_id_degrades_to_originals_only() {
    let cloud = MockEngine::new(EngineKind::Cloud, Behavior::UnknownOutput);
    let local = MockEngine::new(EngineKind::Local, Behavior::LocalLike);
    let h = harness(cloud.clone(), local.clone(), all_cloud_flags());

    let email = email(vec![docx("a.docx", 512)]);
    let config = ConversionConfig::default();
    let report = convert_email(&email, &config, &h.deps).await.unwrap();

    // Processing failure after the batch ran: no second engine.
    assert_eq!(local.calls(), 0);

    for outcome in &report.outcomes {
        assert_eq!(outcome.reason, ConversionReason::Error);
        assert!(outcome.original_document_id.is_some());
    }

    let (store, recording) = h.drain().await;
    assert_eq!(store.documents().len(), 2);
    let errors = recording.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("matches no submitted input"));
}

// ── Persistence failure path ─────────────────────────────────────────────

#[tokio::test]
async fn store_outage_propagates_but_still_records_summary() {
    let cloud = MockEngine::new(EngineKind::Cloud, Behavior::ConvertAll);
    let local = MockEngine::new(EngineKind::Local, Behavior::LocalLike);
    let h = harness_with_store(
        cloud,
        local,
        all_cloud_flags(),
        Some(Arc::new(BrokenStore)),
    );

    let email = email(vec![docx("a.docx", 512)]);
    let config = ConversionConfig::default();
    let err = convert_email(&email, &config, &h.deps).await.unwrap_err();
    assert!(err.to_string().contains("scripted outage"));

    let (_, recording) = h.drain().await;
    let summaries = recording.summaries.lock().unwrap();
    assert_eq!(summaries.len(), 1, "summary recorded on the failure path");
    let s = &summaries[0];
    assert_eq!(s.accounted_slots(), s.total_attachments + 1);
    assert_eq!(s.skipped_counts.get(&ConversionReason::Error), Some(&2));
}
