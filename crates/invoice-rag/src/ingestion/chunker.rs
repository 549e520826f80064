//! Recursive character text splitting with overlap

use crate::types::{Chunk, LoadedDocument};

/// Separators tried in order, coarsest first
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Splits text on the coarsest separator that occurs, recursing into oversized pieces.
///
/// Lengths are counted in chars. Separators stay attached to the start of the piece
/// that follows them, so merged pieces are joined without a delimiter.
#[derive(Debug, Clone)]
pub struct RecursiveTextSplitter {
    /// Target chunk size in characters
    chunk_size: usize,
    /// Characters carried from the end of one chunk into the next
    overlap: usize,
    separators: Vec<String>,
}

impl RecursiveTextSplitter {
    /// Create a splitter with the default separators
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Split one text into chunks
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        self.split_recursive(text, &separators)
    }

    /// Split every loaded document, copying its metadata onto each chunk
    pub fn split_documents(&self, documents: &[LoadedDocument]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for doc in documents {
            for content in self.split_text(&doc.content) {
                chunks.push(Chunk {
                    index: chunks.len(),
                    content,
                    metadata: doc.metadata.clone(),
                });
            }
        }

        tracing::debug!(
            "Split {} documents into {} chunks (size={}, overlap={})",
            documents.len(),
            chunks.len(),
            self.chunk_size,
            self.overlap
        );

        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // Last separator is the fallback when none of the others occur
        let mut separator = separators.last().copied().unwrap_or("");
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut good_splits: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good_splits.push(piece);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }

            if remaining.is_empty() {
                final_chunks.push(piece.to_string());
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }

        final_chunks
    }

    /// Greedily pack small pieces into chunks, carrying up to `overlap` chars forward
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: Vec<(&str, usize)> = Vec::new();
        let mut total = 0usize;
        let mut front = 0usize;

        for piece in splits {
            let len = char_len(piece);

            if total + len > self.chunk_size && front < current.len() {
                if let Some(doc) = join_trimmed(&current[front..]) {
                    docs.push(doc);
                }

                while front < current.len()
                    && (total > self.overlap || (total + len > self.chunk_size && total > 0))
                {
                    total -= current[front].1;
                    front += 1;
                }
            }

            current.push((piece, len));
            total += len;
        }

        if let Some(doc) = join_trimmed(&current[front..]) {
            docs.push(doc);
        }

        docs
    }
}

impl Default for RecursiveTextSplitter {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn join_trimmed(pieces: &[(&str, usize)]) -> Option<String> {
    let joined: String = pieces.iter().map(|(p, _)| *p).collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split on `separator`, keeping it at the start of the following piece.
/// An empty separator splits into single chars. Empty pieces are dropped.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
