//! Local rendering adapter: HTML to PDF via headless Chromium, in-process.
//!
//! ## Why spawn_blocking?
//!
//! The browser driver is synchronous — it blocks on a websocket to the
//! Chromium devtools protocol while the page loads and prints.
//! `tokio::task::spawn_blocking` moves the whole batch onto a dedicated
//! blocking-pool thread so Tokio worker threads never stall during
//! rendering.
//!
//! ## Capability boundary
//!
//! This engine renders HTML only. It has no conversion path for office
//! formats, so non-HTML inputs come back as per-item
//! `skipped_unsupported` — not an error. That asymmetry is what makes the
//! local engine a safe fallback target: it can always handle the body, and
//! everything it cannot handle degrades to stored originals.
//!
//! The engine needs no credentials and no network; a missing Chromium
//! binary is the only way it can fail wholesale, and that surfaces as a
//! batch-level fatal error (never a configuration error, so it can never
//! trigger a fallback loop back to the cloud).

use crate::error::EngineError;
use crate::outcome::{ConversionReason, EngineKind};
use crate::pipeline::engine::{
    ConversionArtifact, ConversionEngine, ConversionInput, EngineBatch, EngineOutput,
    InputContent, OutputDisposition,
};
use async_trait::async_trait;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Adapter for the in-process headless rendering engine.
pub struct LocalEngine {
    render_timeout: Duration,
}

impl LocalEngine {
    pub fn new(render_timeout_secs: u64) -> Self {
        Self {
            render_timeout: Duration::from_secs(render_timeout_secs),
        }
    }
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new(30)
    }
}

#[async_trait]
impl ConversionEngine for LocalEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Local
    }

    async fn submit(&self, inputs: &[ConversionInput]) -> Result<EngineBatch, EngineError> {
        let owned: Vec<ConversionInput> = inputs.to_vec();
        let timeout = self.render_timeout;

        tokio::task::spawn_blocking(move || render_batch_blocking(&owned, timeout))
            .await
            .map_err(|e| {
                EngineError::fatal(EngineKind::Local, format!("render task panicked: {e}"))
            })?
    }
}

/// Blocking implementation of batch rendering. One browser per batch; each
/// item gets its own tab.
fn render_batch_blocking(
    inputs: &[ConversionInput],
    timeout: Duration,
) -> Result<EngineBatch, EngineError> {
    let job_id = format!("local-{}", Uuid::new_v4());

    // A batch with no HTML never needs a browser.
    if !inputs.iter().any(|i| i.is_html()) {
        return Ok(EngineBatch {
            job_id,
            outputs: inputs
                .iter()
                .map(|input| EngineOutput {
                    correlation_id: input.correlation_id,
                    disposition: OutputDisposition::Skipped {
                        reason: ConversionReason::SkippedUnsupported,
                    },
                })
                .collect(),
        });
    }

    let launch = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(false)
        .build()
        .map_err(|e| {
            EngineError::fatal(EngineKind::Local, format!("browser launch options: {e}"))
        })?;
    let browser = Browser::new(launch).map_err(|e| {
        EngineError::fatal(EngineKind::Local, format!("could not launch renderer: {e}"))
    })?;

    let mut outputs = Vec::with_capacity(inputs.len());
    for input in inputs {
        let disposition = match &input.content {
            InputContent::Html(markup) => match render_html(&browser, markup, timeout) {
                Ok(bytes) => {
                    debug!(
                        filename = %input.filename,
                        size = bytes.len(),
                        "rendered HTML to PDF"
                    );
                    let mut metadata = serde_json::Map::new();
                    metadata.insert("renderer".into(), "headless-chromium".into());
                    metadata.insert("job_id".into(), job_id.clone().into());
                    OutputDisposition::Pdf(ConversionArtifact {
                        filename: input.pdf_filename(),
                        bytes,
                        engine_metadata: metadata,
                    })
                }
                Err(detail) => {
                    warn!(filename = %input.filename, %detail, "local render failed");
                    OutputDisposition::Failed { detail }
                }
            },
            // No office-format pathway in-process.
            InputContent::File { .. } => OutputDisposition::Skipped {
                reason: ConversionReason::SkippedUnsupported,
            },
        };
        outputs.push(EngineOutput {
            correlation_id: input.correlation_id,
            disposition,
        });
    }

    Ok(EngineBatch { job_id, outputs })
}

/// Render one HTML document to PDF bytes.
///
/// The markup is written to a temp file and loaded over `file://` — the
/// devtools protocol needs a navigable URL, and a managed temp file keeps
/// cleanup automatic even on panic.
fn render_html(browser: &Browser, markup: &str, timeout: Duration) -> Result<Vec<u8>, String> {
    let mut file = tempfile::Builder::new()
        .prefix("mailpdf-body-")
        .suffix(".html")
        .tempfile()
        .map_err(|e| format!("temp file: {e}"))?;
    file.write_all(markup.as_bytes())
        .map_err(|e| format!("temp file write: {e}"))?;
    file.flush().map_err(|e| format!("temp file flush: {e}"))?;

    let url = format!("file://{}", file.path().display());

    let tab = browser.new_tab().map_err(|e| format!("new tab: {e}"))?;
    tab.set_default_timeout(timeout);
    tab.navigate_to(&url)
        .map_err(|e| format!("navigate: {e}"))?
        .wait_until_navigated()
        .map_err(|e| format!("load: {e}"))?;

    let pdf = tab
        .print_to_pdf(Some(PrintToPdfOptions {
            print_background: Some(true),
            prefer_css_page_size: Some(true),
            ..Default::default()
        }))
        .map_err(|e| format!("print to PDF: {e}"))?;

    // `file` is dropped (and the temp file deleted) here, after printing.
    Ok(pdf)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Launching a real browser belongs to the e2e suite; these tests cover
    // the adapter contract that does not need Chromium.

    #[test]
    fn kind_is_local() {
        assert_eq!(LocalEngine::default().kind(), EngineKind::Local);
    }

    #[tokio::test]
    async fn file_only_batch_is_skipped_without_a_browser() {
        let engine = LocalEngine::default();
        let inputs = vec![
            ConversionInput::file("a.docx", "application/msword", vec![1]),
            ConversionInput::file("b.xlsx", "application/vnd.ms-excel", vec![2]),
        ];
        let batch = engine.submit(&inputs).await.unwrap();
        assert!(batch.job_id.starts_with("local-"));
        assert_eq!(batch.outputs.len(), 2);
        for (output, input) in batch.outputs.iter().zip(&inputs) {
            assert_eq!(output.correlation_id, input.correlation_id);
            assert!(matches!(
                output.disposition,
                OutputDisposition::Skipped {
                    reason: ConversionReason::SkippedUnsupported
                }
            ));
        }
    }
}
