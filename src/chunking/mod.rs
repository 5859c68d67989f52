//! Layered-separator chunking for extracted documents.
//!
//! Documents that fit the configured chunk size are kept whole so short items
//! (quotes, short emails) are never fragmented. Longer documents are split on
//! paragraph boundaries first, then sentence boundaries, then spaces, then at
//! raw character offsets, with each layer applied only where the previous one
//! cannot produce a piece within budget. Adjacent chunks share an overlap so
//! context survives a split mid-paragraph.
//!
//! Sizes are measured in characters, not bytes; all split points land on
//! character boundaries.


use serde::{Deserialize, Serialize};
use tracing::info;

use crate::metadata::DocumentMetadata;

/// Separator ladder, coarsest first. When none apply, splitting falls back to
/// fixed-width character windows.
const SEPARATORS: &[&str] = &["\n\n", ". ", " "];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters, overlap included.
    pub chunk_size: usize,
    /// Characters of trailing context repeated at the start of the next
    /// chunk.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

/// A bounded span of document text carrying its document's metadata. The unit
/// that gets embedded, indexed, and retrieved.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub metadata: DocumentMetadata,
    /// 0-based position within the parent document.
    pub chunk_index: usize,
    /// Number of sibling chunks from the same document.
    pub total_chunks: usize,
}

/// Byte offsets of one chunk within its document. `start..core_start` is the
/// overlap repeated from the previous chunk; `core_start..end` is new text.
/// Cores partition the document exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkSpan {
    pub(crate) start: usize,
    pub(crate) core_start: usize,
    pub(crate) end: usize,
}

/// Split one document into chunks. Documents within the size budget come back
/// as a single verbatim chunk.
#[inline]
pub fn split_document(
    text: &str,
    metadata: &DocumentMetadata,
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    if char_len(text) <= config.chunk_size {
        return vec![Chunk {
            content: text.to_string(),
            metadata: metadata.clone(),
            chunk_index: 0,
            total_chunks: 1,
        }];
    }

    let spans = split_spans(text, config);
    let total_chunks = spans.len();
    spans
        .into_iter()
        .enumerate()
        .map(|(chunk_index, span)| Chunk {
            content: text[span.start..span.end].to_string(),
            metadata: metadata.clone(),
            chunk_index,
            total_chunks,
        })
        .collect()
}

/// Split a batch of documents, emitting whole (unsplit) documents' chunks
/// before split documents' chunks. Order within one document is sequential.
#[inline]
pub fn split_documents(
    documents: &[(String, DocumentMetadata)],
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    let mut whole = Vec::new();
    let mut split = Vec::new();

    for (text, metadata) in documents {
        if char_len(text) <= config.chunk_size {
            whole.extend(split_document(text, metadata, config));
        } else {
            split.extend(split_document(text, metadata, config));
        }
    }

    info!(
        "Created {} chunks ({} kept whole, {} from splitting)",
        whole.len() + split.len(),
        whole.len(),
        split.len()
    );

    whole.extend(split);
    whole
}

pub(crate) fn split_spans(text: &str, config: &ChunkingConfig) -> Vec<ChunkSpan> {
    // Overlap rides on top of each core, so cores get the remaining budget.
    let core_budget = config
        .chunk_size
        .saturating_sub(config.chunk_overlap)
        .max(1);

    let mut atoms = Vec::new();
    split_atoms(text, 0, 0, core_budget, &mut atoms);
    let cores = pack_atoms(text, &atoms, core_budget);
    attach_overlap(text, &cores, config.chunk_overlap)
}

/// Partition `text` into pieces of at most `budget` characters, preferring
/// the coarsest separator that fits. Pieces keep their trailing separator so
/// concatenating them reproduces the input exactly.
fn split_atoms(text: &str, base: usize, level: usize, budget: usize, out: &mut Vec<(usize, usize)>) {
    if text.is_empty() {
        return;
    }
    if char_len(text) <= budget {
        out.push((base, base + text.len()));
        return;
    }

    if level >= SEPARATORS.len() {
        // Last resort: fixed-width character windows.
        let mut window_start = 0;
        let mut window_chars = 0;
        for (idx, _) in text.char_indices() {
            if window_chars == budget {
                out.push((base + window_start, base + idx));
                window_start = idx;
                window_chars = 0;
            }
            window_chars += 1;
        }
        if window_start < text.len() {
            out.push((base + window_start, base + text.len()));
        }
        return;
    }

    let separator = SEPARATORS[level];
    let mut pieces: Vec<(usize, usize)> = Vec::new();
    let mut piece_start = 0;
    let mut cursor = 0;
    while let Some(found) = text[cursor..].find(separator) {
        let piece_end = cursor + found + separator.len();
        pieces.push((piece_start, piece_end));
        piece_start = piece_end;
        cursor = piece_end;
    }
    if piece_start < text.len() {
        pieces.push((piece_start, text.len()));
    }

    if pieces.len() <= 1 {
        // Separator absent (or the text is one separator-terminated piece);
        // move down a layer.
        split_atoms(text, base, level + 1, budget, out);
        return;
    }

    for (start, end) in pieces {
        split_atoms(&text[start..end], base + start, level, budget, out);
    }
}

/// Greedily merge consecutive atoms up to the core budget.
fn pack_atoms(text: &str, atoms: &[(usize, usize)], budget: usize) -> Vec<(usize, usize)> {
    let mut cores = Vec::new();
    let mut current: Option<(usize, usize, usize)> = None;

    for &(start, end) in atoms {
        let atom_chars = char_len(&text[start..end]);
        current = match current {
            Some((core_start, _, core_chars)) if core_chars + atom_chars <= budget => {
                Some((core_start, end, core_chars + atom_chars))
            }
            Some((core_start, core_end, _)) => {
                cores.push((core_start, core_end));
                Some((start, end, atom_chars))
            }
            None => Some((start, end, atom_chars)),
        };
    }
    if let Some((core_start, core_end, _)) = current {
        cores.push((core_start, core_end));
    }

    cores
}

fn attach_overlap(text: &str, cores: &[(usize, usize)], overlap: usize) -> Vec<ChunkSpan> {
    cores
        .iter()
        .enumerate()
        .map(|(i, &(core_start, end))| {
            let start = if i == 0 || overlap == 0 {
                core_start
            } else {
                back_up_chars(text, core_start, overlap, cores[i - 1].0)
            };
            ChunkSpan {
                start,
                core_start,
                end,
            }
        })
        .collect()
}

/// Byte offset `chars` characters before `from`, clamped to `floor`.
fn back_up_chars(text: &str, from: usize, chars: usize, floor: usize) -> usize {
    let mut position = from;
    let mut stepped = 0;
    for (idx, _) in text[floor..from].char_indices().rev() {
        position = floor + idx;
        stepped += 1;
        if stepped == chars {
            break;
        }
    }
    position
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
