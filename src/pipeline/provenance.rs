//! Document/provenance builder: hash inputs, persist originals and
//! derivatives with lineage links.
//!
//! ## The chain of custody
//!
//! Every converted file leaves two records behind: the untouched original
//! (stored first, conversion fields null) and the derivative pointing back
//! at it. The derivative carries the hex SHA-256 of the *exact* bytes or
//! markup that went into the engine — not the output — so two conversions
//! of identical input are comparable later, and an auditor can re-hash the
//! stored original (or the re-sanitised body) to verify what the engine was
//! actually given.
//!
//! Lineage is single-level by construction: [`ProvenanceBuilder::store_derivative`]
//! only accepts an original with no lineage of its own, so no chain of
//! derivatives-of-derivatives can ever be persisted.

use crate::collab::DocumentStore;
use crate::error::MailPdfError;
use crate::outcome::{ConversionReason, DocumentRecord, EngineKind, NewDocument};
use crate::pipeline::engine::ConversionArtifact;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

/// Hex-encoded SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Persists documents for one orchestration run.
pub struct ProvenanceBuilder<'a> {
    store: &'a dyn DocumentStore,
    tenant_id: Uuid,
    message_id: Option<String>,
}

impl<'a> ProvenanceBuilder<'a> {
    pub fn new(store: &'a dyn DocumentStore, tenant_id: Uuid, message_id: Option<String>) -> Self {
        Self {
            store,
            tenant_id,
            message_id,
        }
    }

    /// Persist an untouched original. Conversion fields stay null: an
    /// original is not the product of any engine.
    pub async fn store_original(
        &self,
        filename: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<DocumentRecord, MailPdfError> {
        let record = self
            .store
            .create_document(NewDocument {
                tenant_id: self.tenant_id,
                filename: filename.to_string(),
                mime: mime.to_string(),
                bytes,
                conversion_engine: None,
                conversion_reason: None,
                conversion_input_sha256: None,
                derived_from_document_id: None,
                source_message_id: self.message_id.clone(),
                conversion_metadata: serde_json::Map::new(),
            })
            .await
            .map_err(|source| MailPdfError::Persistence {
                filename: filename.to_string(),
                source,
            })?;
        debug!(id = %record.id, filename, "stored original");
        Ok(record)
    }

    /// Persist a converted derivative linked to its original.
    ///
    /// `input_sha256` must be the hash of the exact content submitted to
    /// the engine. Returns an internal error if the given original already
    /// has lineage — derivatives only ever point at true originals.
    pub async fn store_derivative(
        &self,
        original: &DocumentRecord,
        engine: EngineKind,
        artifact: ConversionArtifact,
        input_sha256: String,
    ) -> Result<DocumentRecord, MailPdfError> {
        if original.derived_from_document_id.is_some() {
            return Err(MailPdfError::Internal(format!(
                "document {} already has lineage; refusing multi-level chain",
                original.id
            )));
        }

        let filename = artifact.filename.clone();
        let record = self
            .store
            .create_document(NewDocument {
                tenant_id: self.tenant_id,
                filename: artifact.filename,
                mime: "application/pdf".to_string(),
                bytes: artifact.bytes,
                conversion_engine: Some(engine),
                conversion_reason: Some(ConversionReason::Ok),
                conversion_input_sha256: Some(input_sha256),
                derived_from_document_id: Some(original.id),
                source_message_id: self.message_id.clone(),
                conversion_metadata: artifact.engine_metadata,
            })
            .await
            .map_err(|source| MailPdfError::Persistence { filename, source })?;
        debug!(
            id = %record.id,
            original = %original.id,
            engine = %engine,
            "stored converted derivative"
        );
        Ok(record)
    }
}
