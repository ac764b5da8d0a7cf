//! CLI binary for mailpdf.
//!
//! A thin shim over the library crate: parses an `.eml` file, maps CLI
//! flags to `ConversionConfig`, runs the pipeline against a directory-backed
//! document store, and prints the outcome table plus summary.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use mailpdf::{
    convert_email, CloudEngine, ConversionConfig, DocumentRecord, DocumentStore, EngineError,
    EngineKind, ErrorContext, ErrorReporter, FlagSnapshot, InboundEmail, LocalEngine,
    MetricsSink, NewDocument, PipelineDeps, StoreError, SubscriptionTier,
};
use mailpdf::report::spawn_dispatcher;
use mailpdf::EmailConversionSummary;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI arguments ────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "mailpdf",
    version,
    about = "Convert an inbound email (.eml) into auditable PDF artifacts",
    after_help = "The cloud engine activates only when both --cloud-endpoint and \
MAILPDF_CLOUD_API_KEY are configured; otherwise every batch falls back to the \
local headless renderer."
)]
struct Args {
    /// Path to the raw RFC 5322 message (.eml).
    eml: PathBuf,

    /// Output directory for stored documents.
    #[arg(short, long, default_value = "./mailpdf-out")]
    out: PathBuf,

    /// Tenant id override (defaults to the plus-addressed recipient).
    #[arg(long)]
    tenant: Option<Uuid>,

    /// Force the body engine (local|cloud), bypassing flag evaluation.
    #[arg(long)]
    engine: Option<String>,

    /// Force attachment conversion on or off, bypassing flag evaluation.
    #[arg(long)]
    convert_attachments: Option<bool>,

    /// Conversion size ceiling for non-PDF attachments, in MiB.
    #[arg(long, default_value_t = 10)]
    max_attachment_mib: usize,

    /// Cloud conversion API endpoint.
    #[arg(long, env = "MAILPDF_CLOUD_ENDPOINT")]
    cloud_endpoint: Option<String>,

    /// Cloud conversion API key.
    #[arg(long, env = "MAILPDF_CLOUD_API_KEY", hide_env_values = true)]
    cloud_api_key: Option<String>,

    /// Subscription tier recorded in the decision trace (free|standard|premium).
    #[arg(long, default_value = "standard")]
    tier: String,

    /// Print the summary as JSON instead of the human table.
    #[arg(long)]
    json: bool,
}

// ── Directory-backed document store ──────────────────────────────────────

/// Writes each document into the output directory as
/// `<short-id>-<filename>`. Good enough for CLI runs; real deployments
/// wire in their own storage collaborator.
struct DirStore {
    root: PathBuf,
}

#[async_trait]
impl DocumentStore for DirStore {
    async fn create_document(&self, doc: NewDocument) -> Result<DocumentRecord, StoreError> {
        let id = Uuid::new_v4();
        let short = &id.to_string()[..8];
        let path = self.root.join(format!("{short}-{}", doc.filename));
        tokio::fs::write(&path, &doc.bytes).await?;
        Ok(DocumentRecord {
            id,
            tenant_id: doc.tenant_id,
            filename: doc.filename,
            mime: doc.mime,
            size_bytes: doc.bytes.len(),
            conversion_engine: doc.conversion_engine,
            conversion_reason: doc.conversion_reason,
            conversion_input_sha256: doc.conversion_input_sha256,
            derived_from_document_id: doc.derived_from_document_id,
            source_message_id: doc.source_message_id,
            conversion_metadata: doc.conversion_metadata,
            created_at: Utc::now(),
        })
    }
}

/// Routes engine failures and summaries to the terminal via tracing.
struct LogCollaborator;

impl ErrorReporter for LogCollaborator {
    fn report_error(&self, error: &EngineError, context: &ErrorContext) {
        tracing::error!(
            %error,
            tenant = %context.tenant_id,
            job_id = context.job_id.as_deref().unwrap_or("-"),
            attachments = context.attachment_count,
            "engine failure"
        );
    }
}

impl MetricsSink for LogCollaborator {
    fn record_email_summary(&self, summary: &EmailConversionSummary) {
        tracing::info!(
            pdfs = summary.pdfs_produced,
            originals = summary.originals_stored,
            duration_ms = summary.total_duration_ms,
            "summary recorded"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let raw = std::fs::read(&args.eml)
        .with_context(|| format!("reading {}", args.eml.display()))?;
    let mut email = InboundEmail::from_mime(&raw).context("parsing message")?;
    if let Some(tenant) = args.tenant {
        email.tenant_id = tenant;
    }

    tokio::fs::create_dir_all(&args.out)
        .await
        .with_context(|| format!("creating {}", args.out.display()))?;

    let mut builder = ConversionConfig::builder()
        .max_attachment_bytes(args.max_attachment_mib * 1024 * 1024)
        .tier(parse_tier(&args.tier)?);
    if let Some(name) = &args.engine {
        let engine = EngineKind::parse(name)
            .with_context(|| format!("unknown engine '{name}' (expected local|cloud)"))?;
        builder = builder.body_engine_override(engine);
    }
    if let Some(enabled) = args.convert_attachments {
        builder = builder.convert_attachments_override(enabled);
    }
    if let Some(endpoint) = &args.cloud_endpoint {
        builder = builder.cloud_endpoint(endpoint.clone());
        if let Some(key) = &args.cloud_api_key {
            builder = builder.cloud_api_key(key.clone());
        }
    }
    let config = builder.build()?;

    let collaborator = Arc::new(LogCollaborator);
    let (reports, dispatcher) =
        spawn_dispatcher(collaborator.clone(), collaborator, config.report_buffer);

    let deps = PipelineDeps {
        store: Arc::new(DirStore {
            root: args.out.clone(),
        }),
        cloud: Arc::new(CloudEngine::from_config(&config)),
        local: Arc::new(LocalEngine::new(config.render_timeout_secs)),
        reports,
        flags: FlagSnapshot::new(),
    };

    let report = convert_email(&email, &config, &deps).await?;

    // Flush buffered reports before printing.
    drop(deps);
    dispatcher.await.ok();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.summary)?);
        return Ok(());
    }

    println!("{}", bold(&format!("Email: {}", email.subject)));
    for reason in &report.decision.reasons {
        println!("  {}", dim(reason));
    }
    println!();
    for outcome in &report.outcomes {
        let mark = if outcome.converted {
            green("✓")
        } else if outcome.success {
            yellow("•")
        } else {
            yellow("!")
        };
        println!(
            "  {mark} {:<40} {}",
            outcome.slot.to_string(),
            outcome.user_visible_status
        );
    }
    let s = &report.summary;
    println!();
    println!(
        "{}",
        bold(&format!(
            "{} PDFs, {} originals stored as-is, {} skipped/failed — {} ms",
            s.pdfs_produced,
            s.originals_stored,
            s.skipped_counts.values().sum::<usize>(),
            s.total_duration_ms
        ))
    );
    println!("{}", dim(&format!("documents in {}", args.out.display())));

    Ok(())
}

fn parse_tier(s: &str) -> Result<SubscriptionTier> {
    match s.to_ascii_lowercase().as_str() {
        "free" => Ok(SubscriptionTier::Free),
        "standard" => Ok(SubscriptionTier::Standard),
        "premium" => Ok(SubscriptionTier::Premium),
        other => anyhow::bail!("unknown tier '{other}' (expected free|standard|premium)"),
    }
}
