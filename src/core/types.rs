use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifecycle status of an [`Article`]. Transitions are monotonic and serialized
/// through the document store: `Raw -> Processing -> (Enriched | AiError)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Raw,
    Processing,
    Enriched,
    AiError,
}

impl Default for ArticleStatus {
    fn default() -> Self {
        ArticleStatus::Raw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl Default for SentimentLabel {
    fn default() -> Self {
        SentimentLabel::Neutral
    }
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "Positive",
            SentimentLabel::Negative => "Negative",
            SentimentLabel::Neutral => "Neutral",
        }
    }
}

/// The canonical retrieval unit. `article_id` is a deterministic UUIDv5 of `url`
/// (see [`crate::pipeline::chunking::derive_article_id`]), not a random id —
/// this is a deliberate divergence, see DESIGN.md decision #1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub article_id: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub site_categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub crawled_at: DateTime<Utc>,
    pub website: String,
    #[serde(default)]
    pub status: ArticleStatus,
    #[serde(default)]
    pub ai_summary: Vec<String>,
    pub ai_sentiment_score: Option<f32>,
    pub ai_sentiment_label: Option<SentimentLabel>,
    pub last_enriched_at: Option<DateTime<Utc>>,
    /// Every search session that has claimed this article. Grows monotonically;
    /// only shrunk by history retention (§3, P7).
    #[serde(default)]
    pub search_id: BTreeSet<String>,
    /// The keyword this article was attributed to at crawl time: explicit
    /// `keyword_search`, else the last 1-2 `site_categories`, else `website`.
    #[serde(default)]
    pub search_keyword: String,
    #[serde(default)]
    pub user_id: String,
}

impl Article {
    /// `true` when `content` is too short for the model pipeline (§3, §4.5 step 2).
    pub fn content_below_enrichment_floor(&self) -> bool {
        self.content.trim().chars().count() < 50
    }
}

impl Default for Article {
    fn default() -> Self {
        Self {
            article_id: String::new(),
            url: String::new(),
            title: String::new(),
            summary: String::new(),
            content: String::new(),
            site_categories: Vec::new(),
            tags: Vec::new(),
            publish_date: None,
            crawled_at: Utc::now(),
            website: String::new(),
            status: ArticleStatus::default(),
            ai_summary: Vec::new(),
            ai_sentiment_score: None,
            ai_sentiment_label: None,
            last_enriched_at: None,
            search_id: BTreeSet::new(),
            search_keyword: String::new(),
            user_id: String::new(),
        }
    }
}

/// A fixed-size character-window slice of an [`Article`]'s `content`.
/// Identity is `"{article_id}_{index}"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub article_id: String,
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSessionStatus {
    Processing,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSession {
    pub search_id: String,
    pub user_id: String,
    pub keyword_search: String,
    #[serde(default)]
    pub keyword_content: Option<String>,
    pub max_articles_requested: usize,
    pub total_saved: usize,
    pub status: SearchSessionStatus,
    pub start_date: String,
    pub end_date: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub data_cleared: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub url: String,
    pub name: String,
    pub website: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub last_crawled_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

// ── Vector-index payload shapes (§3) ────────────────────────────────────────

/// The two closed point kinds a vector-index entry can take. Kept as a tagged
/// enum rather than a duck-typed map, per §9's design note.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VectorPointPayload {
    Chunk {
        article_id: String,
        chunk_id: String,
        text: String,
        title: String,
        url: String,
        website: String,
        publish_date: Option<DateTime<Utc>>,
        sentiment: Option<SentimentLabel>,
        topic: Option<String>,
        search_id: BTreeSet<String>,
        user_id: String,
    },
    AiSummary {
        article_id: String,
        summary_text: Vec<String>,
        title: String,
        url: String,
        website: String,
        publish_date: Option<DateTime<Utc>>,
        sentiment: Option<SentimentLabel>,
        topic: Option<String>,
        search_id: BTreeSet<String>,
        user_id: String,
    },
}

// ── HTTP request / response DTOs (§6) ───────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlRequest {
    #[serde(default)]
    pub websites: Vec<String>,
    pub keyword_search: String,
    #[serde(default)]
    pub keyword_content: Option<String>,
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
    pub start_date: String,
    pub end_date: String,
    pub user_id: String,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_max_articles() -> usize {
    10
}
fn default_page() -> usize {
    1
}
fn default_page_size() -> usize {
    10
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlMeta {
    pub total_available_now: usize,
    pub page: usize,
    pub page_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlResponse {
    pub status: String,
    pub search_id: String,
    pub meta: CrawlMeta,
    pub stream_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub search_id: String,
    pub status: String,
    pub total_saved: usize,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub search_id: String,
    pub status: String,
    pub total_saved: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEndEvent {
    pub search_id: String,
    pub final_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageMeta {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PagedArticles {
    pub data: Vec<Article>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrieveContextRequest {
    pub question: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedContext {
    pub text: String,
    pub title: String,
    pub url: String,
    pub score: f32,
    pub publish_date: Option<DateTime<Utc>>,
    pub sentiment_label: Option<SentimentLabel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveContextResponse {
    pub contexts: Vec<RetrievedContext>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    pub minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitTopicsResponse {
    pub website: String,
    pub topics_discovered: usize,
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_below_floor_boundary() {
        let mut a = Article {
            content: "x".repeat(49),
            ..Default::default()
        };
        assert!(a.content_below_enrichment_floor());
        a.content = "x".repeat(50);
        assert!(!a.content_below_enrichment_floor());
    }

    #[test]
    fn sentiment_label_roundtrips_as_pascal_case() {
        let json = serde_json::to_string(&SentimentLabel::Positive).unwrap();
        assert_eq!(json, "\"Positive\"");
    }

    #[test]
    fn crawl_request_defaults_apply() {
        let raw = serde_json::json!({
            "keyword_search": "lạm phát",
            "start_date": "01/12/2024",
            "end_date": "31/12/2024",
            "user_id": "u1",
        });
        let req: CrawlRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(req.max_articles, 10);
        assert_eq!(req.page, 1);
        assert_eq!(req.page_size, 10);
        assert!(req.websites.is_empty());
    }
}
