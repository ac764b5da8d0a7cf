//! Buffered fire-and-forget dispatch for error reports and metrics.
//!
//! ## Why a channel instead of direct calls?
//!
//! The error-reporting and metrics collaborators are external services with
//! their own latency. Calling them inline would put a third party on the
//! conversion hot path; instead, events go into a bounded channel drained
//! by one background task. When the buffer is full the event is dropped
//! with a warning — losing a metric is acceptable, stalling conversion is
//! not, and an unbounded buffer would just move the stall to memory
//! exhaustion.
//!
//! A [`ReportHandle`] is cheap to clone and safe to use from concurrent
//! persist tasks. Dropping every handle closes the channel and lets the
//! dispatcher drain and exit.

use crate::collab::{ErrorContext, ErrorReporter, MetricsSink};
use crate::error::EngineError;
use crate::outcome::EmailConversionSummary;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One queued dispatch event.
#[derive(Debug, Clone)]
pub enum ReportEvent {
    EngineFailure {
        error: EngineError,
        context: ErrorContext,
    },
    Summary(EmailConversionSummary),
}

/// Sending half of the dispatcher. Never blocks, never fails the caller.
#[derive(Clone)]
pub struct ReportHandle {
    tx: mpsc::Sender<ReportEvent>,
}

impl ReportHandle {
    /// Queue an engine failure for the error-reporting collaborator.
    pub fn report_engine_failure(&self, error: &EngineError, context: ErrorContext) {
        self.push(ReportEvent::EngineFailure {
            error: error.clone(),
            context,
        });
    }

    /// Queue a per-email summary for the metrics collaborator.
    pub fn record_summary(&self, summary: EmailConversionSummary) {
        self.push(ReportEvent::Summary(summary));
    }

    fn push(&self, event: ReportEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "report buffer full; dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("report dispatcher stopped; event discarded");
            }
        }
    }
}

/// Start the dispatcher task.
///
/// Returns the sending handle and the drain task. The task finishes once
/// every handle is dropped and the buffer is empty; await the `JoinHandle`
/// on shutdown to flush in-flight events.
pub fn spawn_dispatcher(
    reporter: Arc<dyn ErrorReporter>,
    sink: Arc<dyn MetricsSink>,
    capacity: usize,
) -> (ReportHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ReportEvent::EngineFailure { error, context } => {
                    reporter.report_error(&error, &context);
                }
                ReportEvent::Summary(summary) => {
                    sink.record_email_summary(&summary);
                }
            }
        }
        debug!("report dispatcher drained");
    });
    (ReportHandle { tx }, task)
}

/// A dispatcher wired to no-op collaborators, for tests and embedded use.
pub fn noop_dispatcher() -> (ReportHandle, JoinHandle<()>) {
    spawn_dispatcher(
        Arc::new(crate::collab::NoopCollaborator),
        Arc::new(crate::collab::NoopCollaborator),
        8,
    )
}
