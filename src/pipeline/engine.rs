//! The conversion engine contract shared by both backends.
//!
//! An engine takes a batch of [`ConversionInput`]s and returns an
//! [`EngineBatch`] — one tagged [`EngineOutput`] per item — or a single
//! batch-level [`EngineError`]. The contract is deliberately narrow:
//!
//! * `submit` is the one blocking/suspending operation of a run. No retry
//!   loop lives inside an adapter; batch-level recovery belongs to the
//!   fallback controller.
//! * Every input carries an opaque correlation id, and every output echoes
//!   it back. Outputs are mapped by id, never by filename — two attachments
//!   may share a name, and engines rename outputs. An output with an
//!   unknown id fails correlation loudly instead of being silently dropped.
//! * Per-item results are a closed tagged enum ([`OutputDisposition`]),
//!   validated at the adapter boundary, so downstream code never branches
//!   on stringly-typed shapes.

use crate::error::EngineError;
use crate::outcome::{ConversionReason, EngineKind};
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

/// One item submitted to an engine.
///
/// The content is a tagged enum: exactly one of markup or file bytes,
/// consistent by construction.
#[derive(Debug, Clone)]
pub struct ConversionInput {
    /// Opaque correlation id carried through the adapter and echoed back on
    /// the matching output.
    pub correlation_id: Uuid,
    /// Logical name; used for the derivative's filename, not for mapping.
    pub filename: String,
    pub content: InputContent,
}

/// What an input carries.
#[derive(Debug, Clone)]
pub enum InputContent {
    /// Sanitised HTML markup (email bodies).
    Html(String),
    /// Raw file bytes with their declared MIME type (attachments).
    File { mime: String, bytes: Vec<u8> },
}

impl ConversionInput {
    pub fn html(filename: impl Into<String>, markup: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            filename: filename.into(),
            content: InputContent::Html(markup.into()),
        }
    }

    pub fn file(
        filename: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            filename: filename.into(),
            content: InputContent::File {
                mime: mime.into(),
                bytes,
            },
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self.content, InputContent::Html(_))
    }

    /// The exact bytes submitted for conversion — the provenance hash input.
    pub fn content_bytes(&self) -> &[u8] {
        match &self.content {
            InputContent::Html(markup) => markup.as_bytes(),
            InputContent::File { bytes, .. } => bytes,
        }
    }

    /// Derivative filename: the input's name with a `.pdf` extension.
    pub fn pdf_filename(&self) -> String {
        match self.filename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => format!("{stem}.pdf"),
            _ => format!("{}.pdf", self.filename),
        }
    }
}

/// One produced PDF artifact.
#[derive(Debug, Clone)]
pub struct ConversionArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// Opaque engine metadata (job timings, renderer version, ...), stored
    /// with the derivative for audit.
    pub engine_metadata: serde_json::Map<String, serde_json::Value>,
}

/// Per-item engine result, tagged and validated at the adapter boundary.
#[derive(Debug, Clone)]
pub enum OutputDisposition {
    /// A PDF was produced.
    Pdf(ConversionArtifact),
    /// The engine declined this item (e.g. local engine given a non-HTML
    /// input). The original is stored with the given reason.
    Skipped { reason: ConversionReason },
    /// The engine attempted this item and failed; the batch as a whole
    /// still succeeded. Degrades to originals-only for this item.
    Failed { detail: String },
}

/// One engine output, correlated back to its input.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub correlation_id: Uuid,
    pub disposition: OutputDisposition,
}

/// The result of one batch submission.
#[derive(Debug, Clone)]
pub struct EngineBatch {
    /// Engine-assigned job id, for audit and error reports.
    pub job_id: String,
    pub outputs: Vec<EngineOutput>,
}

/// Uniform interface over the cloud and local conversion backends.
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Submit a batch. Returns per-item outputs or a single batch-level
    /// error; never panics on malformed remote data.
    async fn submit(&self, inputs: &[ConversionInput]) -> Result<EngineBatch, EngineError>;
}

/// Map a batch's outputs back to inputs by correlation id.
///
/// Fails when an output carries an id that no input had, or the same id
/// twice — either means the engine's result mapping cannot be trusted, and
/// the whole batch degrades to originals-only rather than guessing.
/// Inputs *missing* from the map are not an error here; the orchestrator
/// records them as per-item failures.
pub fn correlate_outputs(
    inputs: &[ConversionInput],
    batch: EngineBatch,
    engine: EngineKind,
) -> Result<HashMap<Uuid, OutputDisposition>, EngineError> {
    let known: HashMap<Uuid, &str> = inputs
        .iter()
        .map(|i| (i.correlation_id, i.filename.as_str()))
        .collect();

    let mut map = HashMap::with_capacity(batch.outputs.len());
    for output in batch.outputs {
        if !known.contains_key(&output.correlation_id) {
            return Err(EngineError::fatal(
                engine,
                format!(
                    "job {}: output correlation id {} matches no submitted input",
                    batch.job_id, output.correlation_id
                ),
            ));
        }
        if map.insert(output.correlation_id, output.disposition).is_some() {
            return Err(EngineError::fatal(
                engine,
                format!(
                    "job {}: duplicate output for correlation id {}",
                    batch.job_id, output.correlation_id
                ),
            ));
        }
    }
    Ok(map)
}
