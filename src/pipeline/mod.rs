//! Pipeline stages for email-to-PDF conversion.
//!
//! Each submodule implements exactly one step. Keeping stages separate makes
//! each independently testable and lets us swap implementations (e.g. a new
//! rendering backend) without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! sanitize ──▶ classify ──▶ engine ──▶ fallback ──▶ provenance ──▶ summary
//! (body html)  (per file)   (batch)    (recover)    (hash+store)   (metrics)
//! ```
//!
//! 1. [`sanitize`]   — clean untrusted body markup, prepend the provenance
//!    header
//! 2. [`classify`]   — tag each attachment store-only / convert / reject;
//!    pure and deterministic
//! 3. [`engine`]     — the adapter contract shared by both backends;
//!    correlation-id batch mapping
//! 4. [`cloud`]      — remote conversion API adapter; the only stage with
//!    network I/O
//! 5. [`local`]      — in-process headless-Chromium rendering; runs in
//!    `spawn_blocking` because the browser driver is synchronous
//! 6. [`fallback`]   — batch-level recovery policy across engines
//! 7. [`provenance`] — hash inputs, persist originals and derivatives with
//!    lineage links
//! 8. [`summary`]    — per-email accounting, recorded on every path

pub mod classify;
pub mod cloud;
pub mod engine;
pub mod fallback;
pub mod local;
pub mod provenance;
pub mod sanitize;
pub mod summary;
