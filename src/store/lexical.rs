// BM25-style lexical index over chunk content, generalized from the
// teacher's trigram frequency/coverage scoring to a term-level inverted
// index with phrase support.

use std::collections::HashMap;

use crate::types::ValidatedChunkId;

const K1: f64 = 1.2;
const B: f64 = 0.75;
const PHRASE_BONUS: f64 = 2.0;

#[derive(Debug, Clone)]
struct Posting {
    chunk_id: ValidatedChunkId,
    term_freq: u32,
    positions: Vec<u32>,
}

#[derive(Default)]
struct ChunkLength {
    token_count: u32,
}

/// An in-memory BM25 index over chunk bodies. One instance covers the whole
/// Store; entries are removed when their owning chunk is deleted.
#[derive(Default)]
pub struct LexicalIndex {
    postings: HashMap<String, Vec<Posting>>,
    lengths: HashMap<ValidatedChunkId, ChunkLength>,
    total_tokens: u64,
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Splits a query into its flat term list (for BM25 scoring) and the
/// multi-word phrases found inside `"..."` quotes (for the phrase bonus).
/// Quoted terms still contribute to the flat list, so a phrase query still
/// retrieves candidates through ordinary term matching even when the exact
/// phrase isn't present.
fn parse_query(query: &str) -> (Vec<String>, Vec<Vec<String>>) {
    let mut terms = Vec::new();
    let mut phrases = Vec::new();
    let mut rest = query;

    while let Some(start) = rest.find('"') {
        terms.extend(tokenize(&rest[..start]));
        let after_quote = &rest[start + 1..];
        match after_quote.find('"') {
            Some(end) => {
                let phrase_tokens = tokenize(&after_quote[..end]);
                if phrase_tokens.len() >= 2 {
                    phrases.push(phrase_tokens.clone());
                }
                terms.extend(phrase_tokens);
                rest = &after_quote[end + 1..];
            }
            None => {
                terms.extend(tokenize(after_quote));
                rest = "";
                break;
            }
        }
    }
    terms.extend(tokenize(rest));
    (terms, phrases)
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_chunk(&mut self, chunk_id: ValidatedChunkId, text: &str) {
        self.remove_chunk(chunk_id);

        let tokens = tokenize(text);
        if tokens.is_empty() {
            return;
        }

        let mut per_term: HashMap<&str, Vec<u32>> = HashMap::new();
        for (position, token) in tokens.iter().enumerate() {
            per_term.entry(token.as_str()).or_default().push(position as u32);
        }

        for (term, positions) in per_term {
            self.postings.entry(term.to_string()).or_default().push(Posting {
                chunk_id,
                term_freq: positions.len() as u32,
                positions,
            });
        }

        self.total_tokens += tokens.len() as u64;
        self.lengths.insert(chunk_id, ChunkLength { token_count: tokens.len() as u32 });
    }

    pub fn remove_chunk(&mut self, chunk_id: ValidatedChunkId) {
        if let Some(length) = self.lengths.remove(&chunk_id) {
            self.total_tokens = self.total_tokens.saturating_sub(length.token_count as u64);
        }
        self.postings.retain(|_, postings| {
            postings.retain(|p| p.chunk_id != chunk_id);
            !postings.is_empty()
        });
    }

    fn avg_doc_length(&self) -> f64 {
        if self.lengths.is_empty() {
            0.0
        } else {
            self.total_tokens as f64 / self.lengths.len() as f64
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.lengths.len() as f64;
        let df = self.postings.get(term).map(|p| p.len()).unwrap_or(0) as f64;
        if df == 0.0 {
            0.0
        } else {
            ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
        }
    }

    /// Ranks chunks against a query using BM25; a candidate must contain at
    /// least one query term. Terms wrapped in double quotes additionally
    /// earn a phrase-match bonus when they appear as a contiguous run in the
    /// candidate (checked via `Posting.positions`). Ties broken by insertion
    /// order (stable sort).
    pub fn search(&self, query: &str, allowed: Option<&dyn Fn(ValidatedChunkId) -> bool>) -> Vec<(ValidatedChunkId, f64)> {
        let (terms, phrases) = parse_query(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let avg_len = self.avg_doc_length();
        let mut scores: HashMap<ValidatedChunkId, f64> = HashMap::new();

        for term in &terms {
            let idf = self.idf(term);
            if idf == 0.0 {
                continue;
            }
            if let Some(postings) = self.postings.get(term) {
                for posting in postings {
                    if let Some(filter) = allowed {
                        if !filter(posting.chunk_id) {
                            continue;
                        }
                    }
                    let doc_len = self.lengths.get(&posting.chunk_id).map(|l| l.token_count as f64).unwrap_or(0.0);
                    let tf = posting.term_freq as f64;
                    let denom = tf + K1 * (1.0 - B + B * (doc_len / avg_len.max(1.0)));
                    let score = idf * (tf * (K1 + 1.0)) / denom.max(f64::EPSILON);
                    *scores.entry(posting.chunk_id).or_insert(0.0) += score;
                }
            }
        }

        if !phrases.is_empty() {
            for (chunk_id, score) in scores.iter_mut() {
                for phrase in &phrases {
                    if self.contains_phrase(*chunk_id, phrase) {
                        *score += PHRASE_BONUS;
                    }
                }
            }
        }

        let mut ranked: Vec<(ValidatedChunkId, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }

    /// True if `phrase`'s tokens appear in `chunk_id` as a contiguous run,
    /// using each term's recorded positions rather than re-scanning text.
    fn contains_phrase(&self, chunk_id: ValidatedChunkId, phrase: &[String]) -> bool {
        let Some(first_positions) = self.positions_in_chunk(&phrase[0], chunk_id) else {
            return false;
        };

        'starts: for &start in first_positions {
            for (offset, term) in phrase.iter().enumerate().skip(1) {
                let Some(positions) = self.positions_in_chunk(term, chunk_id) else {
                    continue 'starts;
                };
                if !positions.contains(&(start + offset as u32)) {
                    continue 'starts;
                }
            }
            return true;
        }
        false
    }

    fn positions_in_chunk(&self, term: &str, chunk_id: ValidatedChunkId) -> Option<&[u32]> {
        self.postings.get(term)?.iter().find(|p| p.chunk_id == chunk_id).map(|p| p.positions.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_more_frequent_matches_higher() {
        let mut index = LexicalIndex::new();
        let a = ValidatedChunkId::new();
        let b = ValidatedChunkId::new();
        index.index_chunk(a, "rust rust rust systems programming");
        index.index_chunk(b, "rust is a language");

        let results = index.search("rust", None);
        assert_eq!(results[0].0, a);
    }

    #[test]
    fn remove_chunk_drops_its_postings() {
        let mut index = LexicalIndex::new();
        let a = ValidatedChunkId::new();
        index.index_chunk(a, "hello world");
        index.remove_chunk(a);
        assert!(index.search("hello", None).is_empty());
    }

    #[test]
    fn empty_query_returns_no_results() {
        let index = LexicalIndex::new();
        assert!(index.search("   ", None).is_empty());
    }

    #[test]
    fn quoted_phrase_outranks_scattered_terms() {
        let mut index = LexicalIndex::new();
        let phrase_chunk = ValidatedChunkId::new();
        let scattered_chunk = ValidatedChunkId::new();
        index.index_chunk(phrase_chunk, "the brown fox jumps over a lazy dog");
        index.index_chunk(scattered_chunk, "fox tracks were brown, the dog barked");

        let results = index.search("\"brown fox\"", None);
        assert_eq!(results[0].0, phrase_chunk);
    }
}
