//! Deterministic id derivation and fixed-size chunking (§3, Chunk).
//!
//! Grounded on `original_source/crawler/utils.py::split_text_into_chunks`:
//! fixed character-window slices, trailing slice dropped via `continue` when
//! shorter than the minimum — here expressed as a plain filter since, given a
//! fixed sequential window, only the final slice can ever be short.

use crate::core::types::Chunk;
use uuid::Uuid;

/// `article_id` is a deterministic UUIDv5 of `url` over `NAMESPACE_DNS` — a
/// deliberate divergence from the source system's random UUIDs (DESIGN.md #1),
/// required by §3's "`article_id` is a deterministic function of `url`".
pub fn derive_article_id(url: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, url.as_bytes()).to_string()
}

/// UUIDv5 point id for a chunk point, over its logical key `chunk_id`.
pub fn chunk_point_id(chunk_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, chunk_id.as_bytes())
}

/// UUIDv5 point id for an article's summary point, over `"{article_id}_summary"`.
pub fn summary_point_id(article_id: &str) -> Uuid {
    let key = format!("{article_id}_summary");
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, key.as_bytes())
}

/// Split `content` into fixed-size character-window [`Chunk`]s, dropping any
/// trailing slice shorter than `min_chars`. Idempotent under stable `content`
/// and `window_chars`/`min_chars` — re-running on unchanged input regenerates
/// byte-identical chunk text and ids (§3, P3/P4).
pub fn split_text_into_chunks(article_id: &str, content: &str, window_chars: usize, min_chars: usize) -> Vec<Chunk> {
    if window_chars == 0 {
        return vec![];
    }
    let chars: Vec<char> = content.chars().collect();
    let mut chunks = Vec::new();
    let mut index = 0usize;
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + window_chars).min(chars.len());
        let text: String = chars[start..end].iter().collect();
        let trimmed_len = text.trim().chars().count();
        if trimmed_len < min_chars {
            // Only the trailing window can land here given fixed sequential
            // slicing; drop it rather than emit a too-short chunk.
            start = end;
            index += 1;
            continue;
        }
        chunks.push(Chunk {
            chunk_id: format!("{article_id}_{index}"),
            article_id: article_id.to_string(),
            index,
            text,
        });
        start = end;
        index += 1;
    }

    chunks
}

/// Number of usable chunks §8's P4 expects: `ceil(usable(content) / window)`
/// where `usable` drops a trailing slice shorter than `min_chars`.
pub fn expected_chunk_count(content: &str, window_chars: usize, min_chars: usize) -> usize {
    split_text_into_chunks("probe", content, window_chars, min_chars).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_article_id_is_deterministic() {
        let a = derive_article_id("https://vnexpress.net/bai-viet-1");
        let b = derive_article_id("https://vnexpress.net/bai-viet-1");
        assert_eq!(a, b);
        let c = derive_article_id("https://vnexpress.net/bai-viet-2");
        assert_ne!(a, c);
    }

    #[test]
    fn chunk_point_id_and_summary_point_id_differ_for_same_article() {
        let chunk_id = chunk_point_id("art1_0");
        let summary_id = summary_point_id("art1");
        assert_ne!(chunk_id, summary_id);
    }

    #[test]
    fn short_content_below_min_yields_no_chunks() {
        let chunks = split_text_into_chunks("a1", "too short", 1000, 50);
        assert!(chunks.is_empty());
    }

    #[test]
    fn content_length_50_yields_one_chunk() {
        let content = "x".repeat(50);
        let chunks = split_text_into_chunks("a1", &content, 1000, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "a1_0");
    }

    #[test]
    fn trailing_short_slice_is_dropped_not_emitted() {
        // 1000 + 1000 + 10 chars: the trailing 10-char slice must be dropped.
        let content = "a".repeat(1000) + &"b".repeat(1000) + &"c".repeat(10);
        let chunks = split_text_into_chunks("a1", &content, 1000, 50);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].chunk_id, "a1_1");
    }

    #[test]
    fn trailing_slice_at_or_above_min_is_kept() {
        let content = "a".repeat(1000) + &"b".repeat(60);
        let chunks = split_text_into_chunks("a1", &content, 1000, 50);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn chunking_is_idempotent_on_stable_content() {
        let content = "z".repeat(2345);
        let first = split_text_into_chunks("art", &content, 1000, 50);
        let second = split_text_into_chunks("art", &content, 1000, 50);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.chunk_id, b.chunk_id);
            assert_eq!(a.text, b.text);
        }
    }
}
