use anyhow::{Context, Result};
use regex::Regex;
use tracing::warn;

use crate::model::CaseDocument;
use crate::util::truncate_chars;

pub const PAGES_PER_CHUNK: usize = 50;
pub const MAX_CHARS_PER_CHUNK: usize = 180_000;

#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    pub pages_per_chunk: usize,
    pub max_chars_per_chunk: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            pages_per_chunk: PAGES_PER_CHUNK,
            max_chars_per_chunk: MAX_CHARS_PER_CHUNK,
        }
    }
}

/// Text belonging to exactly one physical source page, tagged with its
/// document/page label. Immutable once created.
#[derive(Debug, Clone)]
pub struct PageBlock {
    pub label: String,
    pub text: String,
}

/// A bounded group of consecutive page blocks sent as one model request.
/// `text` is the labeled concatenation of the contained blocks, truncated to
/// the chunk character budget. A chunk never splits a page block; the only
/// blockless chunk is the zero-marker fallback.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    pub blocks: Vec<PageBlock>,
    pub text: String,
}

/// Concatenate per-document page texts into one marker-labeled blob.
/// Documents and pages are 1-indexed in the labels.
pub fn build_labeled_blob(documents: &[CaseDocument]) -> String {
    let mut blob = String::new();
    for (doc_index, document) in documents.iter().enumerate() {
        for (page_index, page_text) in document.pages.iter().enumerate() {
            blob.push_str(&format!(
                "[Document {} - Page {}]\n",
                doc_index + 1,
                page_index + 1
            ));
            blob.push_str(page_text);
            blob.push_str("\n\n");
        }
    }
    blob
}

#[derive(Debug)]
pub struct PageSegmenter {
    marker: Regex,
}

impl PageSegmenter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            marker: Regex::new(r"\[(Document \d+ - Page \d+)\]")
                .context("failed to compile page marker regex")?,
        })
    }

    /// Split a labeled blob into ordered page blocks. Content before the
    /// first marker is dropped with a warning, never merged into block 1.
    /// Zero markers yield zero blocks; the batcher handles that fallback.
    pub fn split(&self, blob: &str) -> Vec<PageBlock> {
        let markers: Vec<_> = self.marker.captures_iter(blob).collect();
        if markers.is_empty() {
            return Vec::new();
        }

        let first_start = markers[0].get(0).map(|m| m.start()).unwrap_or(0);
        if !blob[..first_start].trim().is_empty() {
            warn!(
                chars = first_start,
                "dropping unlabeled content before first page marker"
            );
        }

        let mut blocks = Vec::with_capacity(markers.len());
        for (index, captures) in markers.iter().enumerate() {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let label = captures
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let text_start = whole.end();
            let text_end = markers
                .get(index + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(blob.len());

            blocks.push(PageBlock {
                label,
                text: blob[text_start..text_end].to_string(),
            });
        }

        blocks
    }
}

/// Partition blocks into fixed-size page windows and render each window's
/// labeled text under the chunk character budget. Chunk count and page
/// coverage are fully determined here, before any model call.
pub fn batch_chunks(blob: &str, blocks: Vec<PageBlock>, options: &ChunkOptions) -> Vec<Chunk> {
    if blocks.is_empty() {
        // Unlabeled legacy document: one chunk holding the head of the blob.
        let text = truncate_chars(blob, options.max_chars_per_chunk).to_string();
        return vec![Chunk {
            index: 0,
            blocks: Vec::new(),
            text,
        }];
    }

    let pages_per_chunk = options.pages_per_chunk.max(1);
    let mut chunks = Vec::new();

    for (index, window) in blocks.chunks(pages_per_chunk).enumerate() {
        let mut text = String::new();
        for block in window {
            text.push_str(&format!("[{}]\n{}", block.label, block.text.trim()));
            text.push_str("\n\n");
        }

        let char_count = text.chars().count();
        if char_count > options.max_chars_per_chunk {
            warn!(
                chunk = index,
                chars = char_count,
                budget = options.max_chars_per_chunk,
                "chunk text exceeds character budget, truncating"
            );
            text = truncate_chars(&text, options.max_chars_per_chunk).to_string();
        }

        chunks.push(Chunk {
            index,
            blocks: window.to_vec(),
            text,
        });
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::{ChunkOptions, PageSegmenter, batch_chunks, build_labeled_blob};
    use crate::model::CaseDocument;

    fn document(doc_id: &str, pages: &[&str]) -> CaseDocument {
        CaseDocument {
            doc_id: doc_id.to_string(),
            pages: pages.iter().map(|page| page.to_string()).collect(),
        }
    }

    #[test]
    fn split_produces_one_block_per_marker_and_preserves_text() {
        let docs = vec![
            document("d1", &["first page body", "second page body"]),
            document("d2", &["third page body"]),
        ];
        let blob = build_labeled_blob(&docs);
        let segmenter = PageSegmenter::new().expect("segmenter should build");
        let blocks = segmenter.split(&blob);

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].label, "Document 1 - Page 1");
        assert_eq!(blocks[2].label, "Document 2 - Page 1");
        for (block, expected) in blocks
            .iter()
            .zip(["first page body", "second page body", "third page body"])
        {
            assert_eq!(block.text.trim(), expected);
        }
    }

    #[test]
    fn split_drops_content_before_first_marker() {
        let blob = "stray OCR noise\n[Document 1 - Page 1]\nreal body";
        let segmenter = PageSegmenter::new().expect("segmenter should build");
        let blocks = segmenter.split(blob);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text.trim(), "real body");
        assert!(!blocks[0].text.contains("stray OCR noise"));
    }

    #[test]
    fn zero_markers_fall_back_to_single_blob_chunk() {
        let segmenter = PageSegmenter::new().expect("segmenter should build");
        let blob = "a legacy document with no markers at all";
        let blocks = segmenter.split(blob);
        assert!(blocks.is_empty());

        let options = ChunkOptions {
            pages_per_chunk: 50,
            max_chars_per_chunk: 10,
        };
        let chunks = batch_chunks(blob, blocks, &options);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "a legacy d");
        assert!(chunks[0].blocks.is_empty());
    }

    #[test]
    fn chunks_never_split_a_page_block() {
        let pages: Vec<String> = (0..7).map(|n| format!("page body {n}")).collect();
        let page_refs: Vec<&str> = pages.iter().map(String::as_str).collect();
        let docs = vec![document("d1", &page_refs)];
        let blob = build_labeled_blob(&docs);
        let segmenter = PageSegmenter::new().expect("segmenter should build");
        let blocks = segmenter.split(&blob);

        let options = ChunkOptions {
            pages_per_chunk: 3,
            ..ChunkOptions::default()
        };
        let chunks = batch_chunks(&blob, blocks, &options);

        assert_eq!(chunks.len(), 3);
        let covered: usize = chunks.iter().map(|chunk| chunk.blocks.len()).sum();
        assert_eq!(covered, 7);
        assert_eq!(chunks[2].blocks.len(), 1);
    }

    #[test]
    fn oversized_chunk_is_truncated_not_reshuffled() {
        let docs = vec![document("d1", &["x".repeat(500).as_str(), "short"])];
        let blob = build_labeled_blob(&docs);
        let segmenter = PageSegmenter::new().expect("segmenter should build");
        let blocks = segmenter.split(&blob);

        let options = ChunkOptions {
            pages_per_chunk: 2,
            max_chars_per_chunk: 100,
        };
        let chunks = batch_chunks(&blob, blocks, &options);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].blocks.len(), 2);
        assert_eq!(chunks[0].text.chars().count(), 100);
    }

    #[test]
    fn hundred_twenty_pages_across_two_documents_make_three_chunks() {
        let doc1_pages: Vec<String> = (0..70).map(|n| format!("doc1 page {n}")).collect();
        let doc2_pages: Vec<String> = (0..50).map(|n| format!("doc2 page {n}")).collect();
        let docs = vec![
            document("d1", &doc1_pages.iter().map(String::as_str).collect::<Vec<_>>()),
            document("d2", &doc2_pages.iter().map(String::as_str).collect::<Vec<_>>()),
        ];
        let blob = build_labeled_blob(&docs);
        let segmenter = PageSegmenter::new().expect("segmenter should build");
        let blocks = segmenter.split(&blob);
        assert_eq!(blocks.len(), 120);

        let chunks = batch_chunks(&blob, blocks, &ChunkOptions::default());
        let sizes: Vec<usize> = chunks.iter().map(|chunk| chunk.blocks.len()).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
    }
}
