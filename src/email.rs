//! Inbound email model: the logical input to one orchestration run.
//!
//! An [`InboundEmail`] usually arrives pre-parsed from an ingestion webhook
//! (sender, recipient, subject, plain/HTML bodies, attachments). For raw
//! RFC 5322 messages — `.eml` files, SMTP drops — [`InboundEmail::from_mime`]
//! walks the MIME tree and produces the same shape, so the pipeline never
//! cares where the message came from.
//!
//! Inbound messages are routed to tenants by plus-addressing: mail sent to
//! `upload+<tenant-uuid>@<domain>` belongs to that tenant. See
//! [`tenant_from_recipient`].

use crate::error::MailPdfError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use uuid::Uuid;

/// One inbound email awaiting conversion.
#[derive(Debug, Clone)]
pub struct InboundEmail {
    /// Owning tenant, resolved from the recipient address (nil when the
    /// recipient carried no tenant id; callers may overwrite).
    pub tenant_id: Uuid,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub message_id: Option<String>,
    pub received_at: DateTime<Utc>,
    /// HTML body, when the message had one. Untrusted until sanitised.
    pub body_html: Option<String>,
    /// Plain-text body, used when no HTML body exists.
    pub body_text: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// One attachment: filename, declared MIME type, decoded bytes.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Build an attachment from webhook-style base64 content.
    pub fn from_base64(
        filename: impl Into<String>,
        mime: impl Into<String>,
        content_base64: &str,
    ) -> Result<Self, MailPdfError> {
        let filename = filename.into();
        let bytes = BASE64.decode(content_base64.trim()).map_err(|_| {
            MailPdfError::InvalidAttachmentEncoding {
                filename: filename.clone(),
            }
        })?;
        Ok(Self {
            filename,
            mime: mime.into(),
            bytes,
        })
    }

    /// Lowercased extension, without the dot.
    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.filename.rsplit_once('.')?;
        if ext.is_empty() {
            None
        } else {
            Some(ext.to_ascii_lowercase())
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Extract the tenant id from a plus-addressed upload recipient.
///
/// Accepts `upload+<uuid>@domain` and `Display Name <upload+<uuid>@domain>`.
/// Returns `None` when the local part carries no parseable UUID.
pub fn tenant_from_recipient(recipient: &str) -> Option<Uuid> {
    let addr = recipient
        .rfind('<')
        .map(|i| recipient[i + 1..].trim_end_matches('>'))
        .unwrap_or(recipient)
        .trim();
    let local = addr.split('@').next()?;
    let (_, tag) = local.split_once('+')?;
    Uuid::parse_str(tag).ok()
}

impl InboundEmail {
    /// Parse a raw RFC 5322 message into the pipeline input shape.
    ///
    /// The MIME tree is walked depth-first: the first `text/plain` and first
    /// `text/html` leaf become the bodies, and every part with an attachment
    /// disposition (or a filename on a non-text part) becomes an
    /// [`Attachment`] with its transfer encoding already decoded.
    pub fn from_mime(raw: &[u8]) -> Result<Self, MailPdfError> {
        let mail = mailparse::parse_mail(raw).map_err(|e| MailPdfError::MalformedEmail {
            detail: e.to_string(),
        })?;

        let to = mail.headers.get_first_value("To").unwrap_or_default();
        let received_at = mail
            .headers
            .get_first_value("Date")
            .and_then(|d| mailparse::dateparse(&d).ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);

        let mut email = InboundEmail {
            tenant_id: tenant_from_recipient(&to).unwrap_or_else(Uuid::nil),
            from: mail.headers.get_first_value("From").unwrap_or_default(),
            to,
            subject: mail.headers.get_first_value("Subject").unwrap_or_default(),
            message_id: mail
                .headers
                .get_first_value("Message-ID")
                .map(|v| v.trim_matches(['<', '>']).to_string()),
            received_at,
            body_html: None,
            body_text: None,
            attachments: Vec::new(),
        };

        collect_parts(&mail, &mut email)?;
        Ok(email)
    }

    /// Number of logical conversion slots: one per attachment plus the body.
    pub fn slot_count(&self) -> usize {
        self.attachments.len() + 1
    }
}

/// Depth-first MIME walk filling bodies and attachments.
fn collect_parts(part: &ParsedMail, email: &mut InboundEmail) -> Result<(), MailPdfError> {
    let disposition = part.get_content_disposition();
    let mimetype = part.ctype.mimetype.to_ascii_lowercase();

    let filename = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned();

    let is_attachment = disposition.disposition == DispositionType::Attachment
        || (filename.is_some() && !mimetype.starts_with("text/") && !mimetype.starts_with("multipart/"));

    if is_attachment {
        let bytes = part
            .get_body_raw()
            .map_err(|e| MailPdfError::MalformedEmail {
                detail: format!("undecodable attachment part: {e}"),
            })?;
        email.attachments.push(Attachment {
            filename: filename.unwrap_or_else(|| "attachment.bin".to_string()),
            mime: mimetype,
            bytes,
        });
        return Ok(());
    }

    if part.subparts.is_empty() {
        let body = part.get_body().map_err(|e| MailPdfError::MalformedEmail {
            detail: format!("undecodable body part: {e}"),
        })?;
        if mimetype == "text/html" && email.body_html.is_none() {
            email.body_html = Some(body);
        } else if mimetype.starts_with("text/") && email.body_text.is_none() {
            email.body_text = Some(body);
        }
        return Ok(());
    }

    for sub in &part.subparts {
        collect_parts(sub, email)?;
    }
    Ok(())
}
