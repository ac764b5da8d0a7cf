//! Configuration types for email-to-PDF conversion.
//!
//! All pipeline behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Keeping every knob in one struct
//! makes it trivial to share configs across workers, log them, and diff two
//! runs to understand why their outcomes differ.
//!
//! # Design choice: explicit overrides over ambient state
//! The engine override is a field on this struct, threaded into
//! [`crate::decision::decide_engines`] by the orchestrator. Nothing deeper
//! in the pipeline reads environment variables or process globals, so a
//! decision is always reproducible from its inputs.

use crate::error::MailPdfError;
use crate::outcome::EngineKind;
use serde::{Deserialize, Serialize};

/// Hardcoded conversion size ceiling applied to non-PDF attachments.
pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

/// Configuration for one conversion run.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use mailpdf::{ConversionConfig, EngineKind};
///
/// let config = ConversionConfig::builder()
///     .max_attachment_bytes(5 * 1024 * 1024)
///     .body_engine_override(EngineKind::Local)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// Conversion size ceiling for non-PDF attachments, in bytes.
    /// Default: 10 MiB.
    ///
    /// Applies to *conversion* only — an oversized attachment is still
    /// stored as an original, it just skips the engine with
    /// `skipped_too_large`. PDFs bypass conversion entirely and are exempt.
    pub max_attachment_bytes: usize,

    /// Explicit global overrides for the engine decision. When a field is
    /// set it wins outright and disables flag evaluation for that decision.
    pub overrides: EngineOverrides,

    /// Subscription tier of the owning tenant, recorded in the decision
    /// trace and available to flag segmentation.
    pub tier: SubscriptionTier,

    /// Cloud conversion API endpoint. `None` means the cloud engine is
    /// unconfigured and will raise a configuration error if selected.
    pub cloud_endpoint: Option<String>,

    /// Cloud conversion API key. Required alongside the endpoint.
    pub cloud_api_key: Option<String>,

    /// Request-level timeout for one cloud batch submission. Default: 60.
    ///
    /// The submit call is the single blocking await point of a run; the
    /// timeout bounds it so a hung remote cannot wedge the worker.
    pub cloud_timeout_secs: u64,

    /// Per-document timeout for local headless rendering. Default: 30.
    pub render_timeout_secs: u64,

    /// Concurrent document-store writes while persisting a run's outputs.
    /// Default: 4.
    pub store_concurrency: usize,

    /// Capacity of the buffered error/metrics dispatch channel. Default: 64.
    ///
    /// When the buffer is full, events are dropped with a warning rather
    /// than blocking conversion.
    pub report_buffer: usize,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            overrides: EngineOverrides::default(),
            tier: SubscriptionTier::default(),
            cloud_endpoint: None,
            cloud_api_key: None,
            cloud_timeout_secs: 60,
            render_timeout_secs: 30,
            store_concurrency: 4,
            report_buffer: 64,
        }
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn max_attachment_bytes(mut self, n: usize) -> Self {
        self.config.max_attachment_bytes = n;
        self
    }

    pub fn body_engine_override(mut self, engine: EngineKind) -> Self {
        self.config.overrides.body_engine = Some(engine);
        self
    }

    pub fn convert_attachments_override(mut self, enabled: bool) -> Self {
        self.config.overrides.convert_attachments = Some(enabled);
        self
    }

    pub fn tier(mut self, tier: SubscriptionTier) -> Self {
        self.config.tier = tier;
        self
    }

    pub fn cloud_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.cloud_endpoint = Some(endpoint.into());
        self
    }

    pub fn cloud_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.cloud_api_key = Some(key.into());
        self
    }

    pub fn cloud_timeout_secs(mut self, secs: u64) -> Self {
        self.config.cloud_timeout_secs = secs;
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs;
        self
    }

    pub fn store_concurrency(mut self, n: usize) -> Self {
        self.config.store_concurrency = n.max(1);
        self
    }

    pub fn report_buffer(mut self, n: usize) -> Self {
        self.config.report_buffer = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, MailPdfError> {
        let c = &self.config;
        if c.max_attachment_bytes == 0 {
            return Err(MailPdfError::InvalidConfig(
                "max_attachment_bytes must be ≥ 1".into(),
            ));
        }
        if c.cloud_timeout_secs == 0 || c.render_timeout_secs == 0 {
            return Err(MailPdfError::InvalidConfig(
                "timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.cloud_api_key.is_some() && c.cloud_endpoint.is_none() {
            return Err(MailPdfError::InvalidConfig(
                "cloud_api_key set without cloud_endpoint".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Decision inputs ──────────────────────────────────────────────────────

/// Explicit global overrides for the engine decision.
///
/// A set field wins outright over flag evaluation (precedence rule 1);
/// unset fields fall through to flags, then to the hardcoded safe default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOverrides {
    pub body_engine: Option<EngineKind>,
    pub convert_attachments: Option<bool>,
}

/// Subscription tier of the owning tenant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    #[default]
    Standard,
    Premium,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Standard => "standard",
            SubscriptionTier::Premium => "premium",
        }
    }
}
