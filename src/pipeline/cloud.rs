//! Cloud conversion adapter: submit a batch to the remote conversion API.
//!
//! The remote service accepts a JSON batch (HTML markup and base64 file
//! content, each item tagged with its correlation id) and returns one
//! per-item result. Everything off the wire is deserialised into the typed
//! structs below and converted to [`OutputDisposition`] *here*, at the
//! boundary — downstream code never sees the wire shapes.
//!
//! ## Failure classification
//!
//! Every failure is folded into the closed [`EngineErrorKind`] taxonomy at
//! this boundary:
//!
//! | condition                      | kind            |
//! |--------------------------------|-----------------|
//! | endpoint or API key missing    | `Configuration` (no network call) |
//! | request timeout, connect error | `Transient`     |
//! | HTTP 429                       | `RateLimited` (honours `Retry-After`) |
//! | HTTP 5xx                       | `Transient`     |
//! | HTTP 401/403, other 4xx        | `Fatal`         |
//! | undecodable response body      | `Fatal`         |

use crate::config::ConversionConfig;
use crate::error::{EngineError, EngineErrorKind};
use crate::outcome::{ConversionReason, EngineKind};
use crate::pipeline::engine::{
    ConversionArtifact, ConversionEngine, ConversionInput, EngineBatch, EngineOutput,
    InputContent, OutputDisposition,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Adapter for the remote conversion API.
pub struct CloudEngine {
    endpoint: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
}

impl CloudEngine {
    /// Build the adapter from the pipeline configuration. An unconfigured
    /// adapter is constructible — it raises a configuration error on the
    /// first `submit`, which is what drives the engine-level fallback.
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            endpoint: config.cloud_endpoint.clone(),
            api_key: config.cloud_api_key.clone(),
            timeout: Duration::from_secs(config.cloud_timeout_secs),
        }
    }

    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            api_key: Some(api_key.into()),
            timeout,
        }
    }

    fn credentials(&self) -> Result<(&str, &str), EngineError> {
        match (self.endpoint.as_deref(), self.api_key.as_deref()) {
            (Some(endpoint), Some(key)) if !endpoint.is_empty() && !key.is_empty() => {
                Ok((endpoint, key))
            }
            _ => Err(EngineError::configuration(
                EngineKind::Cloud,
                "cloud conversion API endpoint/key not configured",
            )),
        }
    }
}

#[async_trait]
impl ConversionEngine for CloudEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Cloud
    }

    async fn submit(&self, inputs: &[ConversionInput]) -> Result<EngineBatch, EngineError> {
        // Configuration is checked before anything touches the network.
        let (endpoint, api_key) = self.credentials()?;

        let request = SubmitRequest {
            items: inputs.iter().map(WireItem::from).collect(),
        };
        info!(
            items = inputs.len(),
            endpoint, "submitting conversion batch to cloud engine"
        );

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| EngineError::fatal(EngineKind::Cloud, format!("HTTP client: {e}")))?;

        let response = client
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::transient(
                        EngineKind::Cloud,
                        format!("batch submission timed out after {:?}", self.timeout),
                    )
                } else {
                    EngineError::transient(EngineKind::Cloud, format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_http_failure(&response, status));
        }

        let body: SubmitResponse = response.json().await.map_err(|e| {
            EngineError::fatal(EngineKind::Cloud, format!("undecodable response body: {e}"))
        })?;

        debug!(job_id = %body.job_id, items = body.items.len(), "cloud batch completed");

        let outputs = body
            .items
            .into_iter()
            .map(|item| decode_item(&body.job_id, item))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EngineBatch {
            job_id: body.job_id,
            outputs,
        })
    }
}

fn classify_http_failure(
    response: &reqwest::Response,
    status: reqwest::StatusCode,
) -> EngineError {
    let code = status.as_u16();
    match code {
        429 => {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            EngineError {
                engine: EngineKind::Cloud,
                kind: EngineErrorKind::RateLimited { retry_after_secs },
                http_status: Some(code),
                message: "conversion API rate limit exceeded".into(),
            }
        }
        401 | 403 => EngineError::fatal(
            EngineKind::Cloud,
            "conversion API rejected the credentials",
        )
        .with_status(code),
        c if c >= 500 => {
            EngineError::transient(EngineKind::Cloud, format!("conversion API returned {status}"))
                .with_status(code)
        }
        _ => EngineError::fatal(EngineKind::Cloud, format!("conversion API returned {status}"))
            .with_status(code),
    }
}

/// Validate one wire item into a tagged disposition.
fn decode_item(job_id: &str, item: WireResult) -> Result<EngineOutput, EngineError> {
    let disposition = match item.status {
        WireStatus::Ok => {
            let encoded = item.pdf_base64.ok_or_else(|| {
                EngineError::fatal(
                    EngineKind::Cloud,
                    format!("job {job_id}: item {} reported ok without PDF content", item.id),
                )
            })?;
            let bytes = BASE64.decode(encoded.as_bytes()).map_err(|_| {
                EngineError::fatal(
                    EngineKind::Cloud,
                    format!("job {job_id}: item {} carries invalid base64 PDF", item.id),
                )
            })?;
            OutputDisposition::Pdf(ConversionArtifact {
                filename: item.filename,
                bytes,
                engine_metadata: item.metadata,
            })
        }
        WireStatus::SkippedUnsupported => OutputDisposition::Skipped {
            reason: ConversionReason::SkippedUnsupported,
        },
        WireStatus::SkippedTooLarge => OutputDisposition::Skipped {
            reason: ConversionReason::SkippedTooLarge,
        },
        WireStatus::SkippedPasswordProtected => OutputDisposition::Skipped {
            reason: ConversionReason::SkippedPasswordProtected,
        },
        WireStatus::Error => OutputDisposition::Failed {
            detail: item
                .detail
                .unwrap_or_else(|| "engine reported an unspecified item failure".into()),
        },
    };
    Ok(EngineOutput {
        correlation_id: item.id,
        disposition,
    })
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct SubmitRequest {
    items: Vec<WireItem>,
}

#[derive(Debug, Serialize)]
struct WireItem {
    id: Uuid,
    filename: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_base64: Option<String>,
}

impl From<&ConversionInput> for WireItem {
    fn from(input: &ConversionInput) -> Self {
        match &input.content {
            InputContent::Html(markup) => WireItem {
                id: input.correlation_id,
                filename: input.filename.clone(),
                kind: "html",
                html: Some(markup.clone()),
                mime: None,
                content_base64: None,
            },
            InputContent::File { mime, bytes } => WireItem {
                id: input.correlation_id,
                filename: input.filename.clone(),
                kind: "file",
                html: None,
                mime: Some(mime.clone()),
                content_base64: Some(BASE64.encode(bytes)),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
    items: Vec<WireResult>,
}

#[derive(Debug, Deserialize)]
struct WireResult {
    id: Uuid,
    status: WireStatus,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    pdf_base64: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireStatus {
    Ok,
    SkippedUnsupported,
    SkippedTooLarge,
    SkippedPasswordProtected,
    Error,
}
