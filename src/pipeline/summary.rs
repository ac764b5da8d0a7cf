//! Per-email summary accounting.
//!
//! One [`EmailConversionSummary`] exists per inbound email, built here and
//! recorded on every path — success, degraded, or aborted. The builder
//! tallies outcomes as they resolve; [`SummaryBuilder::finish`] then pads
//! any slot that never produced an outcome (a run aborted mid-persist)
//! into the `error` bucket, so the accounting invariant
//! `originals_stored + pdfs_produced + Σ skipped == attachments + 1`
//! holds no matter where the run stopped.
//!
//! Bucketing is by *primary* outcome: a slot lands in `pdfs_produced` when
//! a derivative exists, in `originals_stored` when the original itself is
//! the final artifact with `reason = ok`, and in `skipped_counts` keyed by
//! reason otherwise. Originals persisted alongside a conversion are not
//! double-counted.

use crate::email::InboundEmail;
use crate::outcome::{
    ConversionOutcome, ConversionReason, EmailConversionSummary, EngineKind,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Instant;
use uuid::Uuid;

/// Accumulates one email's outcome counts.
pub struct SummaryBuilder {
    tenant_id: Uuid,
    message_id: Option<String>,
    total_attachments: usize,
    originals_stored: usize,
    pdfs_produced: usize,
    skipped: BTreeMap<ConversionReason, usize>,
    started: Instant,
}

impl SummaryBuilder {
    pub fn new(email: &InboundEmail) -> Self {
        Self {
            tenant_id: email.tenant_id,
            message_id: email.message_id.clone(),
            total_attachments: email.attachments.len(),
            originals_stored: 0,
            pdfs_produced: 0,
            skipped: BTreeMap::new(),
            started: Instant::now(),
        }
    }

    /// Record one resolved slot.
    pub fn tally(&mut self, outcome: &ConversionOutcome) {
        if outcome.converted {
            self.pdfs_produced += 1;
        } else if outcome.reason == ConversionReason::Ok {
            self.originals_stored += 1;
        } else {
            *self.skipped.entry(outcome.reason).or_insert(0) += 1;
        }
    }

    /// Slots tallied so far.
    pub fn accounted(&self) -> usize {
        self.originals_stored + self.pdfs_produced + self.skipped.values().sum::<usize>()
    }

    /// Close the summary. Unaccounted slots — a run that aborted before
    /// every outcome resolved — are charged to the `error` bucket so the
    /// accounting invariant holds on failure paths too.
    pub fn finish(mut self, engine: Option<EngineKind>) -> EmailConversionSummary {
        let total_slots = self.total_attachments + 1;
        let accounted = self.accounted();
        if accounted < total_slots {
            *self.skipped.entry(ConversionReason::Error).or_insert(0) += total_slots - accounted;
        }

        EmailConversionSummary {
            tenant_id: self.tenant_id,
            message_id: self.message_id,
            total_attachments: self.total_attachments,
            originals_stored: self.originals_stored,
            pdfs_produced: self.pdfs_produced,
            skipped_counts: self.skipped,
            conversion_engine: engine,
            total_duration_ms: self.started.elapsed().as_millis() as u64,
            recorded_at: Utc::now(),
        }
    }
}
