//! Orchestration entry point: one inbound email, start to finish.
//!
//! ## Control flow
//!
//! ```text
//! decide engines ─▶ sanitize body ─▶ classify attachments
//!        │
//!        ▼
//! build batch (correlation ids) ─▶ submit via fallback controller
//!        │
//!        ▼
//! persist originals + derivatives (concurrent, original-first per slot)
//!        │
//!        ▼
//! record summary (always — success, degraded, and aborted paths)
//! ```
//!
//! ## Recovery policy
//!
//! The orchestrator never loses an original: every slot stores its original
//! before any derivative, and every engine or mapping failure degrades to
//! "original stored, conversion marked failed" rather than raising. The
//! only fatal class is a document-store failure — if nothing can be
//! persisted, nothing was preserved, and the caller must know.
//!
//! The adapter `submit` call is the single suspending operation of a run;
//! retries across engines belong to the fallback controller and happen at
//! most once. Store writes fan out with bounded concurrency; each slot is
//! independent, and writes are idempotent by content, so no locks are
//! needed across concurrently processed emails.

use crate::collab::{DocumentStore, ErrorContext, FlagSnapshot};
use crate::config::ConversionConfig;
use crate::decision::{decide_engines, DecisionContext, EngineDecision};
use crate::email::InboundEmail;
use crate::error::MailPdfError;
use crate::outcome::{
    user_visible_status, ConversionOutcome, ConversionReason, EmailConversionSummary, EngineKind,
    OutcomeSlot,
};
use crate::pipeline::classify::{classify, AttachmentAction};
use crate::pipeline::engine::{
    correlate_outputs, ConversionEngine, ConversionInput, OutputDisposition,
};
use crate::pipeline::fallback::{run_with_fallback, BatchDisposition};
use crate::pipeline::provenance::{sha256_hex, ProvenanceBuilder};
use crate::pipeline::sanitize;
use crate::pipeline::summary::SummaryBuilder;
use crate::report::ReportHandle;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Filename given to the rendered body document.
const BODY_FILENAME: &str = "email-body.html";

/// Collaborators and engines wired in by the host.
pub struct PipelineDeps {
    pub store: Arc<dyn DocumentStore>,
    /// Cloud adapter. Always present; an unconfigured adapter raises a
    /// configuration error on submit, which is what drives the fallback.
    pub cloud: Arc<dyn ConversionEngine>,
    /// Local adapter, the engine of last resort.
    pub local: Arc<dyn ConversionEngine>,
    pub reports: ReportHandle,
    /// Flag snapshot taken by the host for this tenant.
    pub flags: FlagSnapshot,
}

/// Everything the caller learns about one conversion run.
#[derive(Debug)]
pub struct EmailConversionReport {
    /// Per-slot outcomes: body first, then attachments in input order.
    pub outcomes: Vec<ConversionOutcome>,
    pub summary: EmailConversionSummary,
    /// The engine decision, including its evaluation trace.
    pub decision: EngineDecision,
}

/// Convert one inbound email into persisted documents and PDF artifacts.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(EmailConversionReport)` whenever persistence succeeded, even if
/// every conversion failed (check per-slot `reason`s).
///
/// # Errors
/// Returns `Err(MailPdfError)` only when the document store failed — the
/// summary is still recorded before the error propagates.
pub async fn convert_email(
    email: &InboundEmail,
    config: &ConversionConfig,
    deps: &PipelineDeps,
) -> Result<EmailConversionReport, MailPdfError> {
    let mut summary = SummaryBuilder::new(email);
    let mut engine_used: Option<EngineKind> = None;

    let result = run_pipeline(email, config, deps, &mut summary, &mut engine_used).await;

    // The summary recorder runs unconditionally; a failure to record is the
    // dispatcher's problem and can never mask the primary outcome.
    match result {
        Ok((outcomes, decision)) => {
            let summary = summary.finish(engine_used);
            deps.reports.record_summary(summary.clone());
            info!(
                pdfs = summary.pdfs_produced,
                originals = summary.originals_stored,
                duration_ms = summary.total_duration_ms,
                "email conversion complete"
            );
            Ok(EmailConversionReport {
                outcomes,
                summary,
                decision,
            })
        }
        Err(error) => {
            let summary = summary.finish(engine_used);
            deps.reports.record_summary(summary);
            warn!(%error, "email conversion aborted");
            Err(error)
        }
    }
}

// ── Internal plan model ──────────────────────────────────────────────────

/// What will happen to one logical slot.
struct SlotPlan {
    index: usize,
    slot: OutcomeSlot,
    /// Original to persist: filename, mime, bytes. `None` only for an
    /// email with no body content.
    original: Option<(String, String, Vec<u8>)>,
    action: SlotAction,
}

enum SlotAction {
    /// Empty body: nothing to store, nothing to convert.
    Nothing,
    /// Persist the original only, with this reason.
    StoreOnly { reason: ConversionReason },
    /// Persist the original, then map the engine output for this id.
    Convert {
        correlation_id: Uuid,
        input_sha256: String,
    },
}

async fn run_pipeline(
    email: &InboundEmail,
    config: &ConversionConfig,
    deps: &PipelineDeps,
    summary: &mut SummaryBuilder,
    engine_used: &mut Option<EngineKind>,
) -> Result<(Vec<ConversionOutcome>, EngineDecision), MailPdfError> {
    // ── Step 1: Engine decision ──────────────────────────────────────────
    let ctx = DecisionContext {
        tenant_id: email.tenant_id,
        tier: config.tier,
    };
    let decision = decide_engines(&ctx, &config.overrides, &deps.flags);
    for reason in &decision.reasons {
        debug!(%reason, "engine decision");
    }
    info!(
        body_engine = %decision.body_engine,
        convert_attachments = decision.convert_attachments,
        attachments = email.attachments.len(),
        "starting email conversion"
    );

    // ── Step 2: Sanitise body, classify attachments, build the plan ─────
    let mut plans: Vec<SlotPlan> = Vec::with_capacity(email.slot_count());
    let mut inputs: Vec<ConversionInput> = Vec::new();

    match sanitize::sanitize_body(email) {
        Some(markup) => {
            let input = ConversionInput::html(BODY_FILENAME, markup.clone());
            plans.push(SlotPlan {
                index: 0,
                slot: OutcomeSlot::Body,
                original: Some((BODY_FILENAME.into(), "text/html".into(), markup.into_bytes())),
                action: SlotAction::Convert {
                    correlation_id: input.correlation_id,
                    input_sha256: sha256_hex(input.content_bytes()),
                },
            });
            inputs.push(input);
        }
        None => {
            debug!("no body content; body conversion skipped");
            plans.push(SlotPlan {
                index: 0,
                slot: OutcomeSlot::Body,
                original: None,
                action: SlotAction::Nothing,
            });
        }
    }

    for (i, attachment) in email.attachments.iter().enumerate() {
        let classification = classify(attachment, config.max_attachment_bytes);
        let slot = OutcomeSlot::Attachment {
            filename: attachment.filename.clone(),
        };
        let original = Some((
            attachment.filename.clone(),
            attachment.mime.clone(),
            attachment.bytes.clone(),
        ));

        let action = match classification.action {
            AttachmentAction::ConvertToPdf if decision.convert_attachments => {
                let input = ConversionInput::file(
                    attachment.filename.clone(),
                    attachment.mime.clone(),
                    attachment.bytes.clone(),
                );
                let action = SlotAction::Convert {
                    correlation_id: input.correlation_id,
                    input_sha256: sha256_hex(input.content_bytes()),
                };
                inputs.push(input);
                action
            }
            // Conversion disabled: the original is the expected artifact.
            AttachmentAction::ConvertToPdf => SlotAction::StoreOnly {
                reason: ConversionReason::Ok,
            },
            AttachmentAction::StoreOnly | AttachmentAction::Reject => SlotAction::StoreOnly {
                reason: classification.reason,
            },
        };
        plans.push(SlotPlan {
            index: i + 1,
            slot,
            original,
            action,
        });
    }

    // ── Step 3: Submit the batch through the fallback controller ────────
    let error_ctx = ErrorContext {
        job_id: None,
        tenant_id: email.tenant_id,
        attachment_count: email.attachments.len(),
    };

    let mut outputs: HashMap<Uuid, OutputDisposition> = HashMap::new();
    let mut batch_failed = false;

    if !inputs.is_empty() {
        let (primary, alternate): (&dyn ConversionEngine, Option<&dyn ConversionEngine>) =
            match decision.body_engine {
                EngineKind::Cloud => (deps.cloud.as_ref(), Some(deps.local.as_ref())),
                EngineKind::Local => (deps.local.as_ref(), None),
            };

        match run_with_fallback(primary, alternate, &inputs, &deps.reports, &error_ctx).await {
            BatchDisposition::Converted { engine, batch } => {
                let job_id = batch.job_id.clone();
                match correlate_outputs(&inputs, batch, engine) {
                    Ok(map) => {
                        *engine_used = Some(engine);
                        outputs = map;
                    }
                    Err(error) => {
                        // Result mapping cannot be trusted: a processing
                        // failure, not a reason to try another engine.
                        deps.reports.report_engine_failure(
                            &error,
                            ErrorContext {
                                job_id: Some(job_id),
                                ..error_ctx.clone()
                            },
                        );
                        warn!(%error, "output correlation failed; storing originals only");
                        batch_failed = true;
                    }
                }
            }
            BatchDisposition::OriginalsOnly { error } => {
                warn!(%error, "no engine accepted the batch; storing originals only");
                batch_failed = true;
            }
        }
    }

    // ── Step 4: Persist every slot, original first ───────────────────────
    let provenance = ProvenanceBuilder::new(
        deps.store.as_ref(),
        email.tenant_id,
        email.message_id.clone(),
    );
    let engine = *engine_used;
    let outputs = &outputs;
    let provenance = &provenance;

    let mut results: Vec<(usize, Result<ConversionOutcome, MailPdfError>)> =
        stream::iter(plans.into_iter().map(|plan| async move {
            let index = plan.index;
            let outcome = resolve_slot(plan, provenance, engine, outputs, batch_failed).await;
            (index, outcome)
        }))
        .buffer_unordered(config.store_concurrency)
        .collect()
        .await;
    results.sort_by_key(|(index, _)| *index);

    // Every slot was attempted above regardless of sibling failures; now
    // tally what resolved and surface the first store failure, if any.
    let mut outcomes = Vec::with_capacity(results.len());
    let mut first_error: Option<MailPdfError> = None;
    for (_, result) in results {
        match result {
            Ok(outcome) => {
                summary.tally(&outcome);
                outcomes.push(outcome);
            }
            Err(error) => {
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
    }
    if let Some(error) = first_error {
        return Err(error);
    }

    Ok((outcomes, decision))
}

/// Resolve one slot: persist its original, then its derivative when the
/// engine produced one.
async fn resolve_slot(
    plan: SlotPlan,
    provenance: &ProvenanceBuilder<'_>,
    engine: Option<EngineKind>,
    outputs: &HashMap<Uuid, OutputDisposition>,
    batch_failed: bool,
) -> Result<ConversionOutcome, MailPdfError> {
    let slot = plan.slot;

    // Empty body slot: skipped entirely, not an error.
    let (filename, mime, bytes) = match plan.original {
        Some(original) => original,
        None => {
            return Ok(ConversionOutcome {
                slot,
                success: true,
                converted: false,
                reason: ConversionReason::SkippedUnsupported,
                original_document_id: None,
                converted_document_id: None,
                user_visible_status: "No convertible body content".to_string(),
            })
        }
    };

    // The original is always stored first, whatever happens after.
    let original = provenance.store_original(&filename, &mime, bytes).await?;

    let (correlation_id, input_sha256) = match plan.action {
        SlotAction::Convert {
            correlation_id,
            input_sha256,
        } => (correlation_id, input_sha256),
        SlotAction::StoreOnly { reason } => {
            return Ok(ConversionOutcome {
                slot,
                success: true,
                converted: false,
                reason,
                original_document_id: Some(original.id),
                converted_document_id: None,
                user_visible_status: user_visible_status(reason, false),
            })
        }
        SlotAction::Nothing => {
            return Err(MailPdfError::Internal(
                "slot with original bytes planned as Nothing".into(),
            ))
        }
    };

    if batch_failed {
        return Ok(failed_outcome(slot, original.id));
    }

    match (outputs.get(&correlation_id), engine) {
        (Some(OutputDisposition::Pdf(artifact)), Some(engine)) => {
            let derived = provenance
                .store_derivative(&original, engine, artifact.clone(), input_sha256)
                .await?;
            Ok(ConversionOutcome {
                slot,
                success: true,
                converted: true,
                reason: ConversionReason::Ok,
                original_document_id: Some(original.id),
                converted_document_id: Some(derived.id),
                user_visible_status: user_visible_status(ConversionReason::Ok, true),
            })
        }
        (Some(OutputDisposition::Skipped { reason }), _) => Ok(ConversionOutcome {
            slot,
            success: true,
            converted: false,
            reason: *reason,
            original_document_id: Some(original.id),
            converted_document_id: None,
            user_visible_status: user_visible_status(*reason, false),
        }),
        (Some(OutputDisposition::Failed { detail }), _) => {
            warn!(%slot, %detail, "engine failed this item; original kept");
            Ok(failed_outcome(slot, original.id))
        }
        (None, _) => {
            warn!(%slot, "engine returned no output for this item; original kept");
            Ok(failed_outcome(slot, original.id))
        }
        (Some(OutputDisposition::Pdf(_)), None) => Err(MailPdfError::Internal(
            "engine output present without a resolved engine".into(),
        )),
    }
}

fn failed_outcome(slot: OutcomeSlot, original_id: Uuid) -> ConversionOutcome {
    ConversionOutcome {
        slot,
        success: false,
        converted: false,
        reason: ConversionReason::Error,
        original_document_id: Some(original_id),
        converted_document_id: None,
        user_visible_status: user_visible_status(ConversionReason::Error, false),
    }
}
