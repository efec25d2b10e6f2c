//! Source file parsing and text extraction.

use crate::types::Document;
use chrono::{DateTime, Utc};
use ragline_core::{AppError, AppResult};
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Markdown,
    Html,
    #[serde(rename = "text")]
    PlainText,
}

impl ContentType {
    /// Detect content type from file extension; `None` for unsupported files.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|e| e.to_str())?.to_lowercase();
        match ext.as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            "txt" | "text" => Some(Self::PlainText),
            _ => None,
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::PlainText => "text",
        }
    }
}

/// Read a source file into a [`Document`].
///
/// The path (as given) becomes the source id, the file's modification time
/// the document timestamp.
pub fn parse_file(path: &Path) -> AppResult<Document> {
    let content_type = ContentType::from_path(path).ok_or_else(|| {
        AppError::Other(format!("Unsupported file type: {:?}", path))
    })?;

    let raw = fs::read_to_string(path)?;
    if raw.contains('\0') {
        tracing::warn!("Skipping likely binary file: {:?}", path);
        return Err(AppError::Other(format!("Binary file not supported: {:?}", path)));
    }

    let mut doc = Document::from_raw(path.to_string_lossy(), &raw, content_type);

    if let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) {
        doc.metadata.timestamp = Some(DateTime::<Utc>::from(modified));
    }
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        doc.metadata.extra.insert("file_name".into(), name.into());
    }

    Ok(doc)
}

pub(crate) fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Text of the first level-one ATX heading.
pub(crate) fn markdown_title(text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Contents of the `<title>` element.
pub(crate) fn html_title(raw: &str) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let document = Html::parse_document(raw);
    let title = document.select(&selector).next()?.text().collect::<String>();
    let title = collapse_spaces(&title);
    (!title.is_empty()).then_some(title)
}

/// Elements whose contents are never visible text.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "head", "noscript", "template"];

/// Elements that start a new paragraph.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "aside", "nav", "h1", "h2",
    "h3", "h4", "h5", "h6", "ul", "ol", "table", "blockquote", "pre", "hr", "details",
    "summary",
];

/// Elements that start a new line.
const LINE_ELEMENTS: &[&str] = &["br", "li", "tr", "dt", "dd"];

/// Reduce HTML to visible text.
///
/// Markup, comments and script/style contents are removed, entities are
/// decoded, and block elements become paragraph breaks so the chunker can
/// still find natural boundaries.
pub fn clean_html(raw: &str) -> String {
    let document = Html::parse_document(raw);
    let mut collector = TextCollector::default();
    collector.walk(document.root_element());
    normalize_whitespace(&collector.out)
}

/// Visible text of an element tree with block structure kept as newlines.
#[derive(Default)]
struct TextCollector {
    out: String,
    preformatted: usize,
}

impl TextCollector {
    fn walk(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        if SKIPPED_ELEMENTS.contains(&name) {
            return;
        }

        let block = BLOCK_ELEMENTS.contains(&name);
        if block {
            self.out.push_str("\n\n");
        } else if LINE_ELEMENTS.contains(&name) {
            self.out.push('\n');
        } else if matches!(name, "td" | "th") && !self.out.ends_with(char::is_whitespace) {
            self.out.push(' ');
        }

        let pre = name == "pre";
        if pre {
            self.preformatted += 1;
        }
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.push_text(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.walk(child);
                    }
                }
                _ => {}
            }
        }
        if pre {
            self.preformatted -= 1;
        }

        if block {
            self.out.push_str("\n\n");
        }
    }

    fn push_text(&mut self, text: &str) {
        if self.preformatted > 0 {
            self.out.push_str(text);
        } else {
            // Source line breaks are layout, not content
            self.out
                .extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
        }
    }
}

/// Remove inline HTML from Markdown, keeping the text it wraps.
///
/// Fenced code blocks and inline code spans are left verbatim, as are
/// autolinks such as `<https://example.com>`.
pub(crate) fn strip_markdown_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_fence = false;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end();
        let fence = trimmed.starts_with("```") || trimmed.starts_with("~~~");
        if fence {
            in_fence = !in_fence;
        }
        if fence || in_fence || !has_markup(line) {
            out.push_str(line);
            continue;
        }

        let (body, newline) = match line.strip_suffix('\n') {
            Some(body) => (body, "\n"),
            None => (line, ""),
        };
        let mut cleaned = String::with_capacity(body.len());
        for (i, segment) in body.split('`').enumerate() {
            if i > 0 {
                cleaned.push('`');
            }
            // Odd segments sit inside inline code
            if i % 2 == 1 || !has_markup(segment) {
                cleaned.push_str(segment);
            } else {
                cleaned.push_str(&fragment_text(segment));
            }
        }
        out.push_str(cleaned.trim_end());
        out.push_str(newline);
    }

    out
}

/// Whether the text following a `<` opens a lowercase HTML tag or comment.
fn is_tag_start(rest: &str) -> bool {
    if rest.starts_with("!--") {
        return true;
    }
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    let name_len = rest
        .find(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .unwrap_or(rest.len());
    rest.starts_with(|c: char| c.is_ascii_lowercase())
        && rest[name_len..].starts_with(|c: char| c.is_whitespace() || c == '>' || c == '/')
}

fn has_markup(text: &str) -> bool {
    text.match_indices('<')
        .any(|(i, _)| is_tag_start(&text[i + 1..]))
}

/// Text of one line of inline HTML, kept on a single line.
fn fragment_text(segment: &str) -> String {
    // Escape every `<` that does not open a tag so autolinks survive parsing
    let mut escaped = String::with_capacity(segment.len());
    for (i, c) in segment.char_indices() {
        match c {
            '<' if !is_tag_start(&segment[i + 1..]) => escaped.push_str("&lt;"),
            _ => escaped.push(c),
        }
    }

    let fragment = Html::parse_fragment(&escaped);
    let mut collector = TextCollector::default();
    collector.walk(fragment.root_element());

    let indent = &segment[..segment.len() - segment.trim_start().len()];
    format!("{}{}", indent, collector.out.replace('\n', " ").trim_start())
}

/// Collapse horizontal whitespace per line and keep at most one blank line
/// between paragraphs.
fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut pending_blank = false;

    for line in text.lines() {
        let line = collapse_spaces(line);
        if line.is_empty() {
            pending_blank = !result.is_empty();
            continue;
        }
        if !result.is_empty() {
            result.push_str(if pending_blank { "\n\n" } else { "\n" });
        }
        result.push_str(&line);
        pending_blank = false;
    }

    result
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
