//! Markup templates for rendered email bodies.
//!
//! Centralising every template here serves two purposes:
//!
//! 1. **Single source of truth** — changing the artifact's look (header
//!    layout, styling) requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the generated markup without
//!    rendering a PDF.
//!
//! The provenance header makes every rendered body artifact self-describing:
//! a reader of the PDF alone can tell who sent the message, to whom, when it
//! was received, and under which Message-ID — the human-visible end of the
//! chain of custody.

use crate::email::InboundEmail;

/// Stylesheet embedded in every composed document. Deliberately small:
/// artifacts must render identically years later, so no external resources.
pub const DOCUMENT_STYLE: &str = "\
body { font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; margin: 2em; color: #1a1a1a; }\n\
table.provenance { border-collapse: collapse; margin-bottom: 1.5em; font-size: 0.85em; }\n\
table.provenance td { border: 1px solid #ccc; padding: 0.3em 0.6em; }\n\
table.provenance td.label { font-weight: 600; background: #f5f5f5; }\n\
hr.provenance-rule { border: none; border-top: 2px solid #444; margin-bottom: 1.5em; }\n";

/// Escape text for safe interpolation into HTML content or attributes.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Build the provenance header block for a message.
///
/// Every value is escaped; the header is prepended to the sanitised body so
/// the rendered artifact carries its own custody metadata.
pub fn provenance_header(email: &InboundEmail) -> String {
    let mut rows = String::new();
    let mut row = |label: &str, value: &str| {
        if !value.is_empty() {
            rows.push_str(&format!(
                "<tr><td class=\"label\">{}</td><td>{}</td></tr>\n",
                label,
                escape_html(value)
            ));
        }
    };
    row("From", &email.from);
    row("To", &email.to);
    row("Subject", &email.subject);
    row(
        "Received",
        &email.received_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    row("Message-ID", email.message_id.as_deref().unwrap_or(""));

    format!(
        "<table class=\"provenance\">\n{rows}</table>\n<hr class=\"provenance-rule\">\n"
    )
}

/// Wrap plain text in a minimal HTML document body: escaped, with newlines
/// preserved as `<br>`.
pub fn plain_text_to_html(text: &str) -> String {
    let escaped = escape_html(text);
    let with_breaks = escaped.replace("\r\n", "\n").replace('\n', "<br>\n");
    format!("<div class=\"plain-body\">{with_breaks}</div>")
}

/// Compose the final self-describing document from a header block and an
/// already-sanitised body fragment.
pub fn compose_document(title: &str, header: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{}</title>\n<style>\n{}</style>\n</head>\n<body>\n{}{}\n</body>\n</html>\n",
        escape_html(title),
        DOCUMENT_STYLE,
        header,
        body,
    )
}
