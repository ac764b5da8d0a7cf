//! Fallback controller: batch-level recovery policy across engines.
//!
//! Two failure tiers, two very different responses:
//!
//! * **Batch-level configuration failure** — the primary engine was
//!   unusable before any job ran (cloud credentials missing). The whole
//!   request is retried against the alternate engine exactly once. This is
//!   the only automatic engine-to-engine fallback in the system.
//!
//! * **Everything else** — rate limits, transient faults, fatal processing
//!   errors, or a failure of the alternate itself. The batch degrades to
//!   "store every item as an original"; no second engine is tried.
//!
//! The asymmetry is deliberate: a configuration failure proves no job ran
//! and no cost was incurred, so a retry elsewhere is free and safe. Any
//! other failure may mean a job half-ran — retrying risks duplicate billing
//! and duplicate API work, and correctness (never losing user content)
//! already has a cheaper recovery: keep the originals.
//!
//! Both terminal states are always reachable and nothing retries
//! indefinitely: at most two `submit` calls ever happen per email.
//!
//! Every engine error is handed to the error reporter *before* the fallback
//! decision is made, so the audit trail shows the failure even when
//! recovery succeeds.

use crate::collab::ErrorContext;
use crate::error::{EngineError, EngineErrorKind};
use crate::outcome::EngineKind;
use crate::pipeline::engine::{ConversionEngine, ConversionInput, EngineBatch};
use crate::report::ReportHandle;
use tracing::{info, warn};

/// Terminal state of one batch after recovery policy is applied.
#[derive(Debug)]
pub enum BatchDisposition {
    /// An engine accepted the batch; per-item outputs follow.
    Converted {
        engine: EngineKind,
        batch: EngineBatch,
    },
    /// No engine could run the batch; every item is stored as an original
    /// with `reason = error`.
    OriginalsOnly { error: EngineError },
}

/// Submit a batch with the engine-level fallback policy applied.
///
/// `alternate` is `None` when the primary is already the engine of last
/// resort (the local engine never falls back to the cloud).
pub async fn run_with_fallback(
    primary: &dyn ConversionEngine,
    alternate: Option<&dyn ConversionEngine>,
    inputs: &[ConversionInput],
    reports: &ReportHandle,
    context: &ErrorContext,
) -> BatchDisposition {
    match primary.submit(inputs).await {
        Ok(batch) => BatchDisposition::Converted {
            engine: primary.kind(),
            batch,
        },
        Err(error) => {
            reports.report_engine_failure(&error, context.clone());

            let alternate = match (&error.kind, alternate) {
                (EngineErrorKind::Configuration, Some(alt)) => alt,
                _ => {
                    warn!(%error, "batch failed; degrading to originals-only");
                    return BatchDisposition::OriginalsOnly { error };
                }
            };

            info!(
                from = %primary.kind(),
                to = %alternate.kind(),
                "engine unconfigured; retrying batch on alternate engine"
            );
            match alternate.submit(inputs).await {
                Ok(batch) => BatchDisposition::Converted {
                    engine: alternate.kind(),
                    batch,
                },
                Err(alt_error) => {
                    reports.report_engine_failure(&alt_error, context.clone());
                    warn!(%alt_error, "alternate engine also failed; degrading to originals-only");
                    BatchDisposition::OriginalsOnly { error: alt_error }
                }
            }
        }
    }
}
