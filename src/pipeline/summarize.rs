//! Extractive summarization (§4.5 step 3) — sentence-split, embed, centroid,
//! cosine-rank, top-3, restore original order.
//!
//! Grounded on `nlp/semantic_shave.rs`'s chunk/query cosine-similarity pattern
//! (the `cosine_similarity` helper is reused as-is, see
//! [`crate::providers::embedding::cosine_similarity`]) combined with
//! `original_source/crawler/services/ai_service.py::analyze_content_local`'s
//! centroid-then-top-3-then-restore-order selection.

use crate::providers::embedding::{cosine_similarity, EmbeddingProvider};
use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

fn sentence_terminator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // The `regex` crate has no lookbehind, so sentence boundaries are found by
    // matching "terminator + whitespace" and keeping the terminator attached
    // to the preceding sentence rather than the following one.
    RE.get_or_init(|| Regex::new(r"[.!?]\s+").expect("sentence boundary regex is valid"))
}

/// §4.5(b): only sentences at least this long are summary candidates.
pub const MIN_SENTENCE_CHARS: usize = 25;
/// §4.5(b): at most this many leading candidate sentences are considered.
/// The source system caps at 40; the spec explicitly states 50 — followed
/// here per DESIGN.md decision #3.
pub const MAX_CANDIDATE_SENTENCES: usize = 50;
/// §4.5(f): the number of sentences kept in the final summary.
pub const SUMMARY_SENTENCE_COUNT: usize = 3;

/// Split `text` on a sentence terminator (`.`, `!`, `?`) followed by
/// whitespace (§4.5(a)), returning non-empty trimmed sentences. The
/// terminator stays attached to the sentence it ends.
pub fn split_sentences(text: &str) -> Vec<String> {
    let re = sentence_terminator_regex();
    let text = text.trim();
    let mut result = Vec::new();
    let mut last = 0usize;

    for m in re.find_iter(text) {
        // The matched terminator is a single-byte ASCII char, so `start()+1`
        // is a valid char boundary.
        let term_end = m.start() + 1;
        let sentence = text[last..term_end].trim();
        if !sentence.is_empty() {
            result.push(sentence.to_string());
        }
        last = m.end();
    }

    let tail = text[last..].trim();
    if !tail.is_empty() {
        result.push(tail.to_string());
    }

    result
}

#[derive(Debug, Clone)]
pub struct ExtractiveSummary {
    pub sentences: Vec<String>,
}

/// Compute the extractive summary of `content` (§4.5 step 3). Returns an
/// empty summary without calling the embedding provider when `content` yields
/// no candidate sentences at all.
pub async fn summarize(embedding: &EmbeddingProvider, content: &str) -> Result<ExtractiveSummary> {
    let candidates: Vec<String> = split_sentences(content)
        .into_iter()
        .filter(|s| s.chars().count() >= MIN_SENTENCE_CHARS)
        .take(MAX_CANDIDATE_SENTENCES)
        .collect();

    if candidates.is_empty() {
        return Ok(ExtractiveSummary { sentences: vec![] });
    }

    // §4.5(3): "if <= 3 use all" — matches the source system's short-circuit,
    // and also the boundary behaviour in §8 (single/three-sentence cases).
    if candidates.len() <= SUMMARY_SENTENCE_COUNT {
        return Ok(ExtractiveSummary { sentences: candidates });
    }

    let vectors = embedding.encode_batch(candidates.clone()).await?;
    let centroid = mean_vector(&vectors);

    let mut scored: Vec<(usize, f32)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (i, cosine_similarity(v, &centroid)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut top_indices: Vec<usize> = scored.into_iter().take(SUMMARY_SENTENCE_COUNT).map(|(i, _)| i).collect();
    // §4.5(g): restore original document order after top-K selection.
    top_indices.sort_unstable();

    let sentences = top_indices.into_iter().map(|i| candidates[i].clone()).collect();
    Ok(ExtractiveSummary { sentences })
}

fn mean_vector(vectors: &[Vec<f32>]) -> Vec<f32> {
    if vectors.is_empty() {
        return vec![];
    }
    let dim = vectors[0].len();
    let mut sum = vec![0.0f32; dim];
    for v in vectors {
        for (i, x) in v.iter().enumerate() {
            if i < dim {
                sum[i] += x;
            }
        }
    }
    let n = vectors.len() as f32;
    sum.iter().map(|x| x / n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_sentences_on_terminators() {
        let s = split_sentences("Kinh tế tăng trưởng. Lạm phát giảm! Người dân vui mừng?");
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn split_sentences_trims_and_drops_empty() {
        let s = split_sentences("  Một câu.   Hai câu.  ");
        assert_eq!(s, vec!["Một câu.".to_string(), "Hai câu.".to_string()]);
    }

    #[test]
    fn mean_vector_of_two_vectors() {
        let v = mean_vector(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(v, vec![2.0, 3.0]);
    }

    #[test]
    fn mean_vector_empty_input() {
        assert!(mean_vector(&[]).is_empty());
    }
}
