//! Markdown to safe HTML for bot messages.
//!
//! Bot replies are untrusted model output. Rendering goes through
//! pulldown-cmark with two restrictions applied to the event stream:
//! - raw HTML (block or inline) is emitted as escaped text, never as markup
//! - link and image destinations with a scheme outside the allowlist are
//!   replaced by `#`
//!
//! Everything else pulldown-cmark writes is already escaped, so the output
//! can be injected into a page as-is.

use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html};

const SAFE_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

/// Converts untrusted message text into HTML that is safe to display.
///
/// Implementations must be pure, must not fail on malformed input, and must
/// never emit markup that executes script.
pub trait HtmlRenderer: Send + Sync {
    fn render(&self, text: &str) -> String;
}

/// Default renderer: CommonMark (plus tables and strikethrough) with raw HTML
/// and unsafe URLs neutralized.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownHtml;

impl HtmlRenderer for MarkdownHtml {
    fn render(&self, text: &str) -> String {
        render_markdown_html(text)
    }
}

/// What the host should put into the message bubble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayBody {
    /// Sanitized HTML.
    Html(String),
    /// Plain text; must be shown without HTML interpretation.
    Text(String),
}

impl DisplayBody {
    pub fn as_str(&self) -> &str {
        match self {
            DisplayBody::Html(s) | DisplayBody::Text(s) => s,
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self, DisplayBody::Html(_))
    }
}

/// Renders through `renderer`, or falls back to plain text when there is none.
pub fn display_body(renderer: Option<&dyn HtmlRenderer>, text: &str) -> DisplayBody {
    match renderer {
        Some(renderer) => DisplayBody::Html(renderer.render(text)),
        None => DisplayBody::Text(text.to_string()),
    }
}

/// Renders markdown text into sanitized HTML.
pub fn render_markdown_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(text, options).map(sanitize_event);

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn sanitize_event(event: Event<'_>) -> Event<'_> {
    match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        other => other,
    }
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    if is_safe_url(&url) {
        url
    } else {
        CowStr::Borrowed("#")
    }
}

/// Accepts scheme-less (relative, fragment) URLs and the allowlisted schemes.
fn is_safe_url(url: &str) -> bool {
    // Browsers drop control characters and whitespace inside schemes
    // ("java\tscript:"), so compare against the stripped form.
    let compact: String = url
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .collect();

    let Some(colon) = compact.find(':') else {
        return true;
    };
    let head = &compact[..colon];
    if head.contains(['/', '?', '#']) {
        // The colon belongs to a path, query or fragment, not a scheme.
        return true;
    }
    let scheme = head.to_ascii_lowercase();
    SAFE_SCHEMES.contains(&scheme.as_str())
}
