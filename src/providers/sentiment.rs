//! Sentiment provider (§4.2) — a pure `classify(text) -> {label, confidence}`
//! function. The source system (`ai_service.py`) wraps a hosted HuggingFace
//! pipeline; no equivalent local Vietnamese sentiment-model crate exists in
//! this workspace's dependency stack, so this is a from-scratch deterministic
//! lexicon scorer (DESIGN.md decision #2) — a stateless function with the
//! exact input/output shape §4.2 asks for, loaded lazily behind the same
//! singleton discipline as [`crate::providers::embedding::EmbeddingProvider`]
//! so a future swap to a real model changes no caller.

use crate::core::types::SentimentLabel;
use std::sync::OnceLock;
use tracing::info;

/// Input text length is capped by the caller (§4.2: ≤ 1500 chars).
pub const CLASSIFY_CHAR_LIMIT: usize = 1500;

const POSITIVE_WORDS: &[&str] = &[
    "tăng trưởng", "tích cực", "thành công", "phát triển", "khởi sắc", "lợi nhuận",
    "tăng", "cải thiện", "hồi phục", "vượt", "kỷ lục", "thuận lợi", "ổn định",
    "bứt phá", "lạc quan", "hiệu quả", "thắng lợi", "tốt", "mạnh mẽ", "tăng cao",
];

const NEGATIVE_WORDS: &[&str] = &[
    "suy thoái", "giảm", "khủng hoảng", "thua lỗ", "sụt giảm", "lạm phát",
    "tiêu cực", "khó khăn", "rủi ro", "nợ xấu", "phá sản", "sụp đổ", "bất ổn",
    "thất bại", "trì trệ", "sa thải", "cảnh báo", "xấu", "yếu kém", "giảm sút",
];

struct LexiconModel {
    positive: Vec<&'static str>,
    negative: Vec<&'static str>,
}

impl LexiconModel {
    fn new() -> Self {
        Self {
            positive: POSITIVE_WORDS.to_vec(),
            negative: NEGATIVE_WORDS.to_vec(),
        }
    }

    fn classify(&self, text: &str) -> (SentimentLabel, f32) {
        let lower = text.to_lowercase();
        let pos_hits = self.positive.iter().filter(|w| lower.contains(*w)).count();
        let neg_hits = self.negative.iter().filter(|w| lower.contains(*w)).count();

        if pos_hits == 0 && neg_hits == 0 {
            return (SentimentLabel::Neutral, 0.0);
        }

        let total = (pos_hits + neg_hits) as f32;
        let score = (pos_hits as f32 - neg_hits as f32) / total;

        // A dead-zone around zero avoids flip-flopping on a single stray hit.
        if score.abs() < 0.15 {
            return (SentimentLabel::Neutral, 1.0 - score.abs());
        }

        let confidence = score.abs().clamp(0.0, 1.0);
        if score > 0.0 {
            (SentimentLabel::Positive, confidence)
        } else {
            (SentimentLabel::Negative, confidence)
        }
    }
}

pub struct SentimentProvider {
    model: OnceLock<LexiconModel>,
}

impl SentimentProvider {
    pub fn new() -> Self {
        Self {
            model: OnceLock::new(),
        }
    }

    fn model(&self) -> &LexiconModel {
        self.model.get_or_init(|| {
            info!("sentiment: initializing lexicon-based classifier");
            LexiconModel::new()
        })
    }

    /// Classify `text`, truncated to [`CLASSIFY_CHAR_LIMIT`] chars. Defaults to
    /// Neutral/0.0 on empty input — callers never need to special-case an
    /// unavailable provider since this one is never truly unavailable, but the
    /// shape matches what a hosted-model provider would need to degrade to.
    pub fn classify(&self, text: &str) -> (SentimentLabel, f32) {
        let truncated: String = text.chars().take(CLASSIFY_CHAR_LIMIT).collect();
        if truncated.trim().is_empty() {
            return (SentimentLabel::Neutral, 0.0);
        }
        self.model().classify(&truncated)
    }
}

impl Default for SentimentProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_neutral_zero() {
        let provider = SentimentProvider::new();
        let (label, conf) = provider.classify("");
        assert_eq!(label, SentimentLabel::Neutral);
        assert_eq!(conf, 0.0);
    }

    #[test]
    fn clearly_positive_text_is_positive() {
        let provider = SentimentProvider::new();
        let (label, conf) = provider.classify("Nền kinh tế tăng trưởng tích cực, lợi nhuận doanh nghiệp tăng cao kỷ lục.");
        assert_eq!(label, SentimentLabel::Positive);
        assert!(conf > 0.0);
    }

    #[test]
    fn clearly_negative_text_is_negative() {
        let provider = SentimentProvider::new();
        let (label, _) = provider.classify("Khủng hoảng nợ xấu khiến nhiều doanh nghiệp phá sản, thua lỗ nặng nề.");
        assert_eq!(label, SentimentLabel::Negative);
    }

    #[test]
    fn no_lexicon_hits_is_neutral() {
        let provider = SentimentProvider::new();
        let (label, conf) = provider.classify("Hôm nay trời nắng, đường phố đông đúc như thường lệ.");
        assert_eq!(label, SentimentLabel::Neutral);
        assert_eq!(conf, 0.0);
    }

    #[test]
    fn truncates_to_char_limit() {
        let provider = SentimentProvider::new();
        let long_text = "a ".repeat(2000);
        // Should not panic on very long input.
        let _ = provider.classify(&long_text);
    }
}
