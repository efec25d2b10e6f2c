//! Document chunking.
//!
//! [`Chunker`] splits a [`Document`] into bounded, overlapping segments that
//! prefer natural boundaries. Iteration is lazy and restartable: the
//! [`Chunks`] iterator is `Clone`, and calling [`Chunker::chunks`] again
//! starts over from the beginning of the document.

mod headings;
mod metadata;

pub use metadata::{calculate_hash, chunk_id};

use crate::parser::ContentType;
use crate::types::{Document, Metadata};
use ragline_core::config::RagSettings;
use ragline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use text_splitter::{Characters, ChunkConfig, MarkdownSplitter, TextSplitter};

/// A contiguous span of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic id, see [`chunk_id`]
    pub id: String,

    /// Source document identifier
    pub source_id: String,

    /// Chunk position in document (0-indexed)
    pub position: u32,

    /// Exact text of `document.text[start..end]`
    pub text: String,

    /// Byte offset of the first character
    pub start: usize,

    /// Byte offset one past the last character
    pub end: usize,

    /// Document metadata plus chunk-level fields
    pub metadata: Metadata,
}

/// Splits documents into chunks of at most `chunk_size` characters where
/// consecutive chunks share at most `overlap` characters.
///
/// Boundaries come from `text-splitter`: the largest semantic level that
/// fits wins (paragraph, line, sentence, word, grapheme). Markdown documents
/// use the Markdown-aware splitter so headings and code blocks stay whole
/// where they fit.
#[derive(Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
    text: Arc<TextSplitter<Characters>>,
    markdown: Arc<MarkdownSplitter<Characters>>,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("chunk_size", &self.chunk_size)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Chunker {
    fn eq(&self, other: &Self) -> bool {
        self.chunk_size == other.chunk_size && self.overlap == other.overlap
    }
}

impl Eq for Chunker {}

impl Chunker {
    /// # Errors
    /// `InvalidConfig` unless `0 < chunk_size` and `overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> AppResult<Self> {
        if chunk_size == 0 {
            return Err(AppError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(AppError::InvalidConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }

        let config = || {
            ChunkConfig::new(chunk_size)
                .with_overlap(overlap)
                .map_err(|e| AppError::InvalidConfig(format!("chunk geometry: {}", e)))
        };

        Ok(Self {
            chunk_size,
            overlap,
            text: Arc::new(TextSplitter::new(config()?)),
            markdown: Arc::new(MarkdownSplitter::new(config()?)),
        })
    }

    pub fn from_settings(settings: &RagSettings) -> AppResult<Self> {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily iterate over the chunks of `document`.
    pub fn chunks<'a>(&self, document: &'a Document) -> Chunks<'a> {
        let headings = match document.content_type {
            ContentType::Markdown => headings::outline(&document.text),
            _ => Vec::new(),
        };

        Chunks {
            document,
            chunker: self.clone(),
            cursor: 0,
            last_end: 0,
            position: 0,
            finished: document.text.is_empty(),
            headings: headings.into(),
            inherited: Arc::new(document.inherited_metadata()),
        }
    }

    /// First chunk of `window` and the offset of the second, relative to the window.
    fn leading_chunks<'t>(
        &self,
        content_type: ContentType,
        window: &'t str,
    ) -> (Option<(usize, &'t str)>, Option<usize>) {
        fn first_two<'t>(
            mut iter: impl Iterator<Item = (usize, &'t str)>,
        ) -> (Option<(usize, &'t str)>, Option<usize>) {
            let first = iter.next();
            (first, iter.next().map(|(offset, _)| offset))
        }

        match content_type {
            ContentType::Markdown => first_two(self.markdown.chunk_indices(window)),
            _ => first_two(self.text.chunk_indices(window)),
        }
    }
}

/// Split `document` with the given geometry.
pub fn chunk(document: &Document, chunk_size: usize, overlap: usize) -> AppResult<Chunks<'_>> {
    Ok(Chunker::new(chunk_size, overlap)?.chunks(document))
}

/// Iterator over the chunks of one document.
///
/// The splitter runs over a bounded window starting at `cursor`; only the
/// first chunk of each window is emitted and the cursor moves to where the
/// splitter placed the second one.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    document: &'a Document,
    chunker: Chunker,
    cursor: usize,
    last_end: usize,
    position: u32,
    finished: bool,
    headings: Arc<[headings::Heading]>,
    inherited: Arc<Metadata>,
}

/// Window length in chunks handed to the splitter per step.
const WINDOW_CHUNKS: usize = 4;

impl Chunks<'_> {
    /// Compute the next `[start, end)` span and advance.
    fn next_span(&mut self) -> Option<(usize, usize)> {
        let text = self.document.text.as_str();

        while !self.finished {
            let window_end = text[self.cursor..]
                .char_indices()
                .nth(self.chunker.chunk_size * WINDOW_CHUNKS)
                .map(|(i, _)| self.cursor + i)
                .unwrap_or(text.len());
            let at_end = window_end == text.len();
            let window = &text[self.cursor..window_end];

            let (first, second) = self
                .chunker
                .leading_chunks(self.document.content_type, window);

            let Some((offset, chunk)) = first else {
                // Nothing but whitespace in this window
                self.finished = at_end;
                self.cursor = window_end;
                continue;
            };

            let start = self.cursor + offset;
            let end = start + chunk.len();
            match second {
                Some(next) if next > offset => self.cursor += next,
                _ if at_end => self.finished = true,
                _ => self.cursor = end,
            }

            if end > self.last_end {
                self.last_end = end;
                return Some((start, end));
            }
        }

        None
    }

    fn build(&self, start: usize, end: usize, position: u32) -> Chunk {
        let text = &self.document.text[start..end];
        let mut metadata = (*self.inherited).clone();
        metadata.insert("position".into(), position.into());
        metadata.insert("start".into(), start.into());
        metadata.insert("end".into(), end.into());
        metadata.insert("char_count".into(), text.chars().count().into());
        metadata.insert("hash".into(), calculate_hash(text).into());
        if let Some(path) = headings::title_path(&self.headings, start) {
            metadata.insert("title_path".into(), path.into());
        }

        Chunk {
            id: chunk_id(&self.document.source_id, start),
            source_id: self.document.source_id.clone(),
            position,
            text: text.to_string(),
            start,
            end,
            metadata,
        }
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        loop {
            let (start, end) = self.next_span()?;
            // Whitespace-only spans carry nothing worth embedding
            if self.document.text[start..end].trim().is_empty() {
                continue;
            }
            let position = self.position;
            self.position += 1;
            return Some(self.build(start, end, position));
        }
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}
