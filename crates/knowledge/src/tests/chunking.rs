//! Chunk geometry over a range of texts and sizes.

use crate::chunk::{Chunk, Chunker};
use crate::types::Document;

const SAMPLES: &[&str] = &[
    "The quick brown fox. Jumps over the lazy dog.",
    "# Title\n\nFirst paragraph of text.\n\nSecond paragraph, somewhat longer than the first one.\n\n## Section\n\nMore words follow here.",
    "nowhitespaceatallinthisverylongtokenthatmustbehardsplitsomewhere",
    "Ünïcödé wörds — mixed with emoji 🦀🦀 and CJK 漢字漢字漢字 text, all multi-byte.",
    "   leading and trailing space   \n\n\n   ",
    "Short.",
];

fn documents() -> Vec<Document> {
    SAMPLES
        .iter()
        .enumerate()
        .flat_map(|(i, text)| {
            [
                Document::new(format!("plain-{}", i), *text),
                Document::markdown(format!("md-{}", i), text),
            ]
        })
        .collect()
}

fn geometries() -> Vec<(usize, usize)> {
    vec![(1, 0), (5, 2), (10, 3), (20, 5), (32, 31), (64, 8), (500, 50)]
}

fn char_len(text: &str, start: usize, end: usize) -> usize {
    text[start..end].chars().count()
}

#[test]
fn test_chunks_reconstruct_their_text() {
    for doc in documents() {
        for (size, overlap) in geometries() {
            let chunker = Chunker::new(size, overlap).unwrap();
            for chunk in chunker.chunks(&doc) {
                assert_eq!(&doc.text[chunk.start..chunk.end], chunk.text);
                assert_eq!(chunk.source_id, doc.source_id);
            }
        }
    }
}

#[test]
fn test_chunk_size_and_overlap_bounds() {
    for doc in documents() {
        for (size, overlap) in geometries() {
            let chunks: Vec<Chunk> = Chunker::new(size, overlap).unwrap().chunks(&doc).collect();

            for chunk in &chunks {
                assert!(
                    char_len(&doc.text, chunk.start, chunk.end) <= size,
                    "{} chars in a {}-char chunk of {:?}",
                    chunk.text.chars().count(),
                    size,
                    doc.source_id
                );
            }

            for pair in chunks.windows(2) {
                assert!(pair[0].start < pair[1].start, "no progress in {:?}", doc.source_id);
                if pair[1].start < pair[0].end {
                    assert!(char_len(&doc.text, pair[1].start, pair[0].end) <= overlap);
                }
            }
        }
    }
}

#[test]
fn test_non_whitespace_text_is_covered() {
    for doc in documents() {
        for (size, overlap) in geometries() {
            let chunks: Vec<Chunk> = Chunker::new(size, overlap).unwrap().chunks(&doc).collect();
            let mut covered = vec![false; doc.text.len()];
            for chunk in &chunks {
                covered[chunk.start..chunk.end].iter_mut().for_each(|c| *c = true);
            }
            for (offset, ch) in doc.text.char_indices() {
                if !ch.is_whitespace() {
                    assert!(
                        covered[offset],
                        "{:?} at {} of {:?} not covered (size {}, overlap {})",
                        ch, offset, doc.source_id, size, overlap
                    );
                }
            }
        }
    }
}

#[test]
fn test_positions_are_dense_and_ids_deterministic() {
    for doc in documents() {
        let chunker = Chunker::new(20, 5).unwrap();
        let first: Vec<Chunk> = chunker.chunks(&doc).collect();
        let again: Vec<Chunk> = chunker.chunks(&doc).collect();
        assert_eq!(first, again);

        for (i, chunk) in first.iter().enumerate() {
            assert_eq!(chunk.position as usize, i);
        }
    }
}
