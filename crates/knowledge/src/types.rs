//! Core data types for documents.

use crate::parser::{self, ContentType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form structured metadata attached to documents, chunks and records.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Optional structured metadata supplied with a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Caller-defined fields, copied into every chunk
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: Metadata,
}

/// A unit of ingestion.
///
/// Documents are immutable once built. Ingesting another document with the
/// same `source_id` supersedes the earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub source_id: String,

    /// Normalized text; chunk offsets refer to this string
    pub text: String,

    pub content_type: ContentType,

    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    /// A plain-text document.
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
            content_type: ContentType::PlainText,
            metadata: DocumentMetadata::default(),
        }
    }

    /// A Markdown document. Line endings are normalized, inline HTML is
    /// reduced to its text and the first level-one heading becomes the title.
    pub fn markdown(source_id: impl Into<String>, text: &str) -> Self {
        let text = parser::strip_markdown_html(&parser::normalize_newlines(text));
        let title = parser::markdown_title(&text);
        let mut doc = Self {
            source_id: source_id.into(),
            text,
            content_type: ContentType::Markdown,
            metadata: DocumentMetadata::default(),
        };
        doc.metadata.title = title;
        doc
    }

    /// An HTML document, reduced to its visible text.
    pub fn html(source_id: impl Into<String>, raw: &str) -> Self {
        let mut doc = Self {
            source_id: source_id.into(),
            text: parser::clean_html(raw),
            content_type: ContentType::Html,
            metadata: DocumentMetadata::default(),
        };
        doc.metadata.title = parser::html_title(raw);
        doc
    }

    /// Build a document of the given content type from raw text.
    pub fn from_raw(source_id: impl Into<String>, raw: &str, content_type: ContentType) -> Self {
        match content_type {
            ContentType::Markdown => Self::markdown(source_id, raw),
            ContentType::Html => Self::html(source_id, raw),
            ContentType::PlainText => Self::new(source_id, parser::normalize_newlines(raw)),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.metadata.timestamp = Some(timestamp);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.extra.insert(key.into(), value.into());
        self
    }

    /// Flattened metadata inherited by every chunk of this document.
    ///
    /// Caller extras come first so the reserved keys cannot be shadowed.
    pub fn inherited_metadata(&self) -> Metadata {
        let mut map = self.metadata.extra.clone();
        map.insert("source_id".into(), self.source_id.clone().into());
        map.insert("content_type".into(), self.content_type.as_str().into());
        if let Some(ref title) = self.metadata.title {
            map.insert("title".into(), title.clone().into());
        }
        if !self.metadata.tags.is_empty() {
            map.insert("tags".into(), self.metadata.tags.clone().into());
        }
        if let Some(ts) = self.metadata.timestamp {
            map.insert("timestamp".into(), ts.to_rfc3339().into());
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_title_and_newlines() {
        let doc = Document::markdown("guide.md", "# Milvus Guide\r\n\r\nIntro text.");
        assert_eq!(doc.metadata.title.as_deref(), Some("Milvus Guide"));
        assert!(!doc.text.contains('\r'));
        assert_eq!(doc.content_type, ContentType::Markdown);
    }

    #[test]
    fn test_markdown_inline_html_is_stripped() {
        let doc = Document::markdown(
            "setup.md",
            "# Setup <img src=\"logo.png\">\n\n## Install <small>beta</small>\n\n\
             Run it<br>twice.\n\n```html\n<b>kept</b>\n```\n",
        );
        assert_eq!(doc.metadata.title.as_deref(), Some("Setup"));
        assert!(!doc.text.contains("<img"));
        assert!(doc.text.contains("Run it twice."));
        assert!(doc.text.contains("<b>kept</b>"));

        let chunks: Vec<_> = crate::chunk::Chunker::new(200, 0)
            .unwrap()
            .chunks(&doc)
            .collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata["title"], "Setup");
        assert!(!chunks[0].text.contains("<small>"));

        let install = crate::chunk::Chunker::new(30, 0)
            .unwrap()
            .chunks(&doc)
            .find(|c| c.text.contains("Run it"))
            .unwrap();
        assert_eq!(install.metadata["title_path"], "Setup > Install beta");
    }

    #[test]
    fn test_inherited_metadata_keeps_reserved_keys() {
        let doc = Document::new("a.txt", "body")
            .with_title("A")
            .with_tags(["rust", "db"])
            .with_extra("source_id", "spoofed")
            .with_extra("subject", "general");

        let meta = doc.inherited_metadata();
        assert_eq!(meta["source_id"], "a.txt");
        assert_eq!(meta["subject"], "general");
        assert_eq!(meta["tags"], serde_json::json!(["rust", "db"]));
        assert_eq!(meta["content_type"], "text");
    }
}
