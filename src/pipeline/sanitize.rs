//! Content sanitiser: deterministic cleanup of untrusted email markup.
//!
//! ## Why sanitise at all?
//!
//! The body HTML comes from an arbitrary sender and is about to be loaded
//! into a real rendering engine. Anything active — scripts, frames, form
//! posts, `javascript:` URIs — must be gone before the renderer sees it,
//! and the artifact must render identically years later, so external
//! resource loads are restricted to plain http(s) images.
//!
//! The sanitiser is an allow-list, not a block-list: unknown tags and
//! attributes are dropped, known-safe ones are re-serialised from parsed
//! parts. It applies cheap, deterministic regex/string rules in a defined
//! order; each rule is a pure function and independently testable.
//!
//! ## Rule Order
//!
//! Comments are stripped before containers so a commented-out `<script>`
//! cannot shield a live one; dangerous containers are removed with their
//! content before the tag filter runs, because the tag filter keeps inner
//! text (fine for `<blink>`, wrong for `<script>`).
//!
//! Tags are matched with a `[^>]*` attribute chunk. A quoted `>` inside an
//! attribute value mis-splits the tag; the remainder degrades to visible
//! text, never to live markup, which is the safe direction.

use crate::email::InboundEmail;
use crate::template;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Tags allowed through the filter. Everything else is stripped, keeping
/// its text content. `html`/`body` are deliberately absent: the sanitised
/// output is a fragment that [`crate::template::compose_document`] wraps in
/// its own shell.
const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "hr", "div", "span", "a", "b", "strong", "i", "em", "u", "s", "blockquote", "pre",
    "code", "ul", "ol", "li", "h1", "h2", "h3", "h4", "h5", "h6", "table", "thead", "tbody",
    "tfoot", "tr", "td", "th", "img", "sup", "sub", "small", "center",
];

/// Attributes allowed on kept tags. Event handlers (`on*`) are excluded by
/// construction; URI attributes get an additional scheme check.
const ALLOWED_ATTRS: &[&str] = &[
    "href", "src", "alt", "title", "width", "height", "colspan", "rowspan", "align", "valign",
    "border", "cellpadding", "cellspacing",
];

/// Containers whose *content* is dangerous and must go with the tags.
const DANGEROUS_CONTAINERS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "form", "head", "title", "svg", "noscript",
];

/// Prepare the email body for rendering.
///
/// Prefers the HTML body, falls back to wrapping the plain-text body, and
/// returns `None` when the message has no body content at all — body
/// conversion is then skipped entirely, not treated as an error.
///
/// The result is a complete, self-describing HTML document: provenance
/// header first, sanitised content after.
pub fn sanitize_body(email: &InboundEmail) -> Option<String> {
    let inner = match (&email.body_html, &email.body_text) {
        (Some(html), _) if !html.trim().is_empty() => sanitize_html(html),
        (_, Some(text)) if !text.trim().is_empty() => template::plain_text_to_html(text),
        _ => return None,
    };

    let title = if email.subject.trim().is_empty() {
        "Email"
    } else {
        email.subject.as_str()
    };
    Some(template::compose_document(
        title,
        &template::provenance_header(email),
        &inner,
    ))
}

/// Apply the allow-list rules to an untrusted HTML fragment.
///
/// Rules (applied in order):
/// 1. Strip HTML comments and doctype declarations
/// 2. Remove dangerous containers together with their content
/// 3. Remove any leftover dangerous tags (unclosed / self-closing forms)
/// 4. Filter every remaining tag against the allow-lists, re-serialising
///    kept tags from parsed attributes with escaped values
pub fn sanitize_html(input: &str) -> String {
    let s = strip_comments(input);
    let s = strip_dangerous_containers(&s);
    let s = strip_dangerous_tags(&s);
    filter_tags(&s)
}

// ── Rule 1: Strip comments and doctype declarations ──────────────────────

static RE_COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static RE_DOCTYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<!DOCTYPE[^>]*>").unwrap());

fn strip_comments(input: &str) -> String {
    let s = RE_COMMENTS.replace_all(input, "");
    RE_DOCTYPE.replace_all(&s, "").to_string()
}

// ── Rule 2: Remove dangerous containers with content ─────────────────────

static RE_CONTAINERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    DANGEROUS_CONTAINERS
        .iter()
        .map(|tag| Regex::new(&format!(r"(?si)<{tag}\b[^>]*>.*?</{tag}\s*>")).unwrap())
        .collect()
});

fn strip_dangerous_containers(input: &str) -> String {
    let mut s = input.to_string();
    for re in RE_CONTAINERS.iter() {
        s = re.replace_all(&s, "").to_string();
    }
    s
}

// ── Rule 3: Remove leftover dangerous tags ───────────────────────────────

static RE_DANGEROUS_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)</?(script|style|iframe|object|embed|form|head|title|svg|noscript|base|link|meta)\b[^>]*>",
    )
    .unwrap()
});

fn strip_dangerous_tags(input: &str) -> String {
    RE_DANGEROUS_TAGS.replace_all(input, "").to_string()
}

// ── Rule 4: Allow-list tag filter ────────────────────────────────────────

static RE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\s*(/?)\s*([a-zA-Z][a-zA-Z0-9]*)([^>]*)>").unwrap());

static RE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([a-zA-Z][a-zA-Z0-9_:-]*)\s*(?:=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .unwrap()
});

fn filter_tags(input: &str) -> String {
    RE_TAG
        .replace_all(input, |caps: &Captures<'_>| {
            let closing = &caps[1] == "/";
            let name = caps[2].to_ascii_lowercase();
            if !ALLOWED_TAGS.contains(&name.as_str()) {
                return String::new();
            }
            if closing {
                return format!("</{name}>");
            }
            let attrs = filter_attrs(&name, &caps[3]);
            format!("<{name}{attrs}>")
        })
        .to_string()
}

fn filter_attrs(tag: &str, raw: &str) -> String {
    let mut out = String::new();
    for caps in RE_ATTR.captures_iter(raw) {
        let name = caps[1].to_ascii_lowercase();
        if !ALLOWED_ATTRS.contains(&name.as_str()) {
            continue;
        }
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str());

        match value {
            Some(v) => {
                if (name == "href" || name == "src") && !safe_uri(v, tag == "a") {
                    continue;
                }
                out.push_str(&format!(" {name}=\"{}\"", template::escape_html(v)));
            }
            None => out.push_str(&format!(" {name}")),
        }
    }
    out
}

/// Check that a URI uses an allowed scheme.
///
/// `href` on links may use http/https/mailto; `src` is http/https only.
/// The scheme check runs on a copy with whitespace and control characters
/// removed, closing the classic `java\tscript:` obfuscation.
fn safe_uri(value: &str, allow_mailto: bool) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    compact.starts_with("http://")
        || compact.starts_with("https://")
        || (allow_mailto && compact.starts_with("mailto:"))
}
