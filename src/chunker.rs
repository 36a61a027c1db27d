// Chunker (spec.md §4.4.1), grounded on `trigram_index.rs::extract_trigrams`'s
// character-walking idiom (byte-safe sliding windows over `&str`) and
// `symbol_storage.rs`'s preference for syntactic breakpoints over mid-token
// cuts. Splits respect UTF-8 char boundaries and prefer paragraph/line
// breaks; source and markdown inputs additionally prefer fenced-block and
// top-level structural boundaries.

use crate::builders::ChunkBuilder;
use crate::contracts::Chunk;
use crate::errors::{ConduitError, Result};
use crate::types::ValidatedDocumentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Prose,
    Markdown,
    SourceCode,
}

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub target_size: usize,
    pub overlap: usize,
    pub kind: ChunkKind,
    /// File extension, used only to pick a tree-sitter grammar for
    /// `SourceCode` inputs when the `tree-sitter-chunking` feature is on.
    pub extension: String,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { target_size: 1000, overlap: 150, kind: ChunkKind::Prose, extension: String::new() }
    }
}

/// True for lines the chunker treats as strong structural boundaries:
/// markdown headers/fences, or top-level (non-indented) source lines.
fn is_structural_line(line: &str, kind: ChunkKind) -> bool {
    match kind {
        ChunkKind::Markdown => line.starts_with('#') || line.trim_start().starts_with("```"),
        ChunkKind::SourceCode => !line.is_empty() && !line.starts_with(char::is_whitespace),
        ChunkKind::Prose => false,
    }
}

/// Finds the best split point at or before `upper_bound`, searching
/// backward for: a blank line (paragraph break), then a tree-sitter
/// top-level node boundary (if any fall in range), then a structural
/// line, then any line break, falling back to `upper_bound` itself.
fn find_split_point(content: &str, lower_bound: usize, upper_bound: usize, kind: ChunkKind, ts_boundaries: &[usize]) -> usize {
    let window = &content[lower_bound..upper_bound];

    if let Some(rel) = window.rfind("\n\n") {
        return snap_to_char_boundary(content, lower_bound + rel + 2);
    }

    if let Some(pos) = ts_boundaries.iter().copied().filter(|&b| b > lower_bound && b <= upper_bound).max() {
        return snap_to_char_boundary(content, pos);
    }

    let mut best_structural = None;
    let mut best_linebreak = None;
    let mut offset = 0usize;
    for line in window.split_inclusive('\n') {
        let line_start = lower_bound + offset;
        let trimmed = line.trim_end_matches('\n');
        if is_structural_line(trimmed, kind) && line_start > lower_bound {
            best_structural = Some(line_start);
        }
        if line.ends_with('\n') {
            best_linebreak = Some(line_start + line.len());
        }
        offset += line.len();
    }

    if let Some(pos) = best_structural {
        return snap_to_char_boundary(content, pos);
    }
    if let Some(pos) = best_linebreak {
        if pos > lower_bound {
            return snap_to_char_boundary(content, pos);
        }
    }
    snap_to_char_boundary(content, upper_bound)
}

/// Top-level node start offsets for `SourceCode` inputs, used as strong
/// split-point candidates ahead of the line-based heuristic. Empty for
/// anything else, or when the grammar for `extension` isn't compiled in.
fn source_boundaries(content: &str, config: &ChunkerConfig) -> Vec<usize> {
    if config.kind != ChunkKind::SourceCode {
        return Vec::new();
    }
    tree_sitter_boundaries(content, &config.extension).unwrap_or_default()
}

#[cfg(feature = "tree-sitter-chunking")]
fn tree_sitter_boundaries(content: &str, extension: &str) -> Option<Vec<usize>> {
    let language: tree_sitter::Language = match extension {
        "rs" => tree_sitter_rust::LANGUAGE.into(),
        "ts" | "tsx" => tree_sitter_typescript::LANGUAGE_TSX.into(),
        "js" | "jsx" => tree_sitter_javascript::LANGUAGE.into(),
        "py" => tree_sitter_python::LANGUAGE.into(),
        _ => return None,
    };

    let mut parser = tree_sitter::Parser::new();
    parser.set_language(&language).ok()?;
    let tree = parser.parse(content, None)?;
    let root = tree.root_node();
    let mut cursor = root.walk();
    let boundaries: Vec<usize> =
        root.children(&mut cursor).map(|node| node.start_byte()).filter(|&b| b > 0).collect();
    Some(boundaries)
}

#[cfg(not(feature = "tree-sitter-chunking"))]
fn tree_sitter_boundaries(_content: &str, _extension: &str) -> Option<Vec<usize>> {
    None
}

fn snap_to_char_boundary(content: &str, mut idx: usize) -> usize {
    idx = idx.min(content.len());
    while idx > 0 && !content.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Splits `content` into overlapping (start, end) byte-offset windows.
fn split_offsets(content: &str, config: &ChunkerConfig) -> Vec<(usize, usize)> {
    if content.is_empty() {
        return Vec::new();
    }
    let ts_boundaries = source_boundaries(content, config);
    let len = content.len();
    let mut spans = Vec::new();
    let mut start = 0usize;

    while start < len {
        let target_end = (start + config.target_size).min(len);
        let end = if target_end >= len {
            len
        } else {
            let lower_bound = start + config.target_size.saturating_sub(config.target_size.min(config.overlap * 2).max(1));
            let lower_bound = lower_bound.max(start);
            let split = find_split_point(content, lower_bound, target_end, config.kind, &ts_boundaries);
            if split <= start { target_end } else { split }
        };
        let end = snap_to_char_boundary(content, end).max(snap_to_char_boundary(content, start + 1).min(len));
        spans.push((start, end));

        if end >= len {
            break;
        }
        let next_start = end.saturating_sub(config.overlap);
        start = snap_to_char_boundary(content, next_start.max(start + 1));
    }

    spans
}

/// Splits `content` into chunks for `document_id`, assigning stable
/// zero-based intra-document indices and deterministic chunk ids.
pub fn chunk_document(document_id: ValidatedDocumentId, content: &str, config: &ChunkerConfig) -> Result<Vec<Chunk>> {
    let spans = split_offsets(content, config);
    spans
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| {
            ChunkBuilder::new()
                .document_id(document_id)
                .index(index)
                .content(content[start..end].to_string())
                .offsets(start, end)
                .build()
                .map_err(ConduitError::from)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_paragraph_breaks_when_possible() {
        let content = "First paragraph with some words.\n\nSecond paragraph follows here.\n\nThird and final paragraph.";
        let config = ChunkerConfig { target_size: 40, overlap: 5, kind: ChunkKind::Prose, extension: String::new() };
        let spans = split_offsets(content, &config);
        assert!(spans.len() >= 2);
        for (start, end) in &spans {
            assert!(content.is_char_boundary(*start));
            assert!(content.is_char_boundary(*end));
        }
    }

    #[test]
    fn chunk_ids_are_deterministic_for_identical_content() {
        let doc_id = ValidatedDocumentId::new();
        let content = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let config = ChunkerConfig::default();
        let first = chunk_document(doc_id, content, &config).unwrap();
        let second = chunk_document(doc_id, content, &config).unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.id, b.id);
        }
    }

    #[test]
    fn markdown_prefers_header_boundaries() {
        let content = "# Heading One\nSome body text that goes on for a while.\n# Heading Two\nMore body text here.";
        let config = ChunkerConfig { target_size: 50, overlap: 5, kind: ChunkKind::Markdown, extension: String::new() };
        let spans = split_offsets(content, &config);
        assert!(spans.len() >= 2);
    }

    #[test]
    fn handles_multibyte_content_without_panicking() {
        let content = "héllo wörld ".repeat(50);
        let config = ChunkerConfig { target_size: 30, overlap: 10, kind: ChunkKind::Prose, extension: String::new() };
        let spans = split_offsets(&content, &config);
        for (start, end) in spans {
            assert!(content.is_char_boundary(start));
            assert!(content.is_char_boundary(end));
        }
    }

    #[test]
    fn empty_content_yields_no_chunks() {
        let doc_id = ValidatedDocumentId::new();
        let result = chunk_document(doc_id, "", &ChunkerConfig::default()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn unsupported_extension_falls_back_to_line_heuristic() {
        let content = "fn one() {}\nfn two() {}\nfn three() {}\n";
        let config = ChunkerConfig { target_size: 15, overlap: 2, kind: ChunkKind::SourceCode, extension: "zig".to_string() };
        let spans = split_offsets(content, &config);
        assert!(!spans.is_empty());
    }
}
