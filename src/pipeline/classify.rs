//! Attachment classifier: store as-is, convert, or reject.
//!
//! A pure function from attachment properties to a [`Classification`] — no
//! I/O, no clock, no randomness — so identical input always classifies
//! identically. Reproducibility matters here: the classifier's verdict is
//! recorded in the audit trail and replayed in tests.
//!
//! Rejection is not failure. A rejected attachment still has its original
//! stored; the classification only decides whether a conversion job is
//! worth submitting, and which stable reason code explains the bypass.
//!
//! Password detection is heuristic, not guaranteed: an encrypted OOXML
//! document is a CFB container rather than a ZIP, which is cheap to sniff.
//! Files that defeat the heuristic surface later as a per-item engine
//! failure and degrade to originals-only, so a miss costs an API call, not
//! data.

use crate::email::Attachment;
use crate::outcome::ConversionReason;

/// What to do with one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentAction {
    /// Persist the original; no conversion job (already a PDF, or
    /// conversion disabled).
    StoreOnly,
    /// Submit to a conversion engine.
    ConvertToPdf,
    /// Persist the original; conversion bypassed with the given reason.
    Reject,
}

/// Classifier verdict: the action plus the reason code to record if
/// conversion is bypassed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub action: AttachmentAction,
    pub reason: ConversionReason,
}

/// MIME types with a conversion path through the cloud engine.
const CONVERTIBLE_MIMES: &[&str] = &[
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/vnd.oasis.opendocument.presentation",
    "application/rtf",
    "text/plain",
    "text/html",
    "text/csv",
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/tiff",
    "image/bmp",
];

/// Extension fallback for senders whose mail client declares
/// `application/octet-stream` for everything.
const CONVERTIBLE_EXTENSIONS: &[&str] = &[
    "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp", "rtf", "txt", "csv", "html",
    "htm", "png", "jpg", "jpeg", "gif", "webp", "tif", "tiff", "bmp",
];

/// OOXML extensions subject to the encrypted-container sniff.
const OOXML_EXTENSIONS: &[&str] = &["docx", "xlsx", "pptx"];

/// CFB (Compound File Binary) magic. Plain OOXML is a ZIP (`PK`); an OOXML
/// file wrapped in CFB is the encrypted variant.
const CFB_MAGIC: [u8; 4] = [0xD0, 0xCF, 0x11, 0xE0];

/// Classify one attachment against the conversion size ceiling.
pub fn classify(attachment: &Attachment, max_bytes: usize) -> Classification {
    if attachment.size() == 0 {
        return Classification {
            action: AttachmentAction::Reject,
            reason: ConversionReason::SkippedUnsupported,
        };
    }

    // PDFs bypass conversion entirely; the size ceiling does not apply to
    // storage, so an oversized PDF is still an `Ok` store, not a skip.
    if is_pdf(attachment) {
        return Classification {
            action: AttachmentAction::StoreOnly,
            reason: ConversionReason::Ok,
        };
    }

    if attachment.size() > max_bytes {
        return Classification {
            action: AttachmentAction::Reject,
            reason: ConversionReason::SkippedTooLarge,
        };
    }

    if looks_password_protected(attachment) {
        return Classification {
            action: AttachmentAction::Reject,
            reason: ConversionReason::SkippedPasswordProtected,
        };
    }

    if is_convertible(attachment) {
        return Classification {
            action: AttachmentAction::ConvertToPdf,
            reason: ConversionReason::Ok,
        };
    }

    Classification {
        action: AttachmentAction::Reject,
        reason: ConversionReason::SkippedUnsupported,
    }
}

fn is_pdf(attachment: &Attachment) -> bool {
    attachment.mime.eq_ignore_ascii_case("application/pdf")
        || attachment.extension().as_deref() == Some("pdf")
        || attachment.bytes.starts_with(b"%PDF")
}

fn is_convertible(attachment: &Attachment) -> bool {
    let mime = attachment.mime.to_ascii_lowercase();
    if CONVERTIBLE_MIMES.contains(&mime.as_str()) {
        return true;
    }
    match attachment.extension() {
        Some(ext) => CONVERTIBLE_EXTENSIONS.contains(&ext.as_str()),
        None => false,
    }
}

fn looks_password_protected(attachment: &Attachment) -> bool {
    match attachment.extension() {
        Some(ext) if OOXML_EXTENSIONS.contains(&ext.as_str()) => {
            attachment.bytes.starts_with(&CFB_MAGIC)
        }
        _ => false,
    }
}
