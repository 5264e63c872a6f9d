//! Site adapter contract (§4.1) — a pluggable per-host crawler behind one
//! shared HTTP client, grounded on `original_source/crawler/crawlers/
//! base_crawler.py`'s abstract `fetch_search_page` / `fetch_category_page` /
//! `extract_article_links` / `crawl_article_detail` contract. The listing
//! fetch and link-extraction steps are folded into a single method per page
//! kind here — there is no separate "parse this `Html` I already fetched"
//! step, since nothing in this crate needs to fetch a listing page without
//! immediately extracting its links.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;

/// One article link surfaced by a listing page (search or category).
#[derive(Debug, Clone)]
pub struct ArticleLink {
    pub url: String,
    pub title: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
}

/// One category/topic link discovered on a site's navigation page
/// (§6 `POST /topics/init-from-html`).
#[derive(Debug, Clone)]
pub struct TopicCandidate {
    pub name: String,
    pub url: String,
}

/// The fields an adapter can recover from an article's detail page. The
/// caller (crawl executor / topic scheduler) is responsible for deriving
/// `article_id`, stamping `crawled_at`/`status`, and filling `search_id`.
#[derive(Debug, Clone, Default)]
pub struct DraftArticle {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub site_categories: Vec<String>,
    pub tags: Vec<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub website: String,
}

/// §4.1 adapter contract. One implementation per distinct HTML shape; the
/// crawl executor and topic scheduler only ever talk to this trait, never to
/// a concrete adapter type.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// The `website` value this adapter produces articles under (matches
    /// `Article.website` / `Topic.website`).
    fn website(&self) -> &str;

    /// On-demand keyword search (§4.6's crawl-the-gap path).
    async fn fetch_search_page(
        &self,
        client: &Client,
        keyword: &str,
        page: usize,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Vec<ArticleLink>>;

    /// Category/topic listing page (§4.8's periodic topic crawl).
    async fn fetch_category_page(&self, client: &Client, category_url: &str, page: usize) -> Result<Vec<ArticleLink>>;

    /// Fetches and extracts one article's detail page. Returns `Ok(None)`
    /// when the page doesn't look like a real article (e.g. extraction
    /// yielded too little content), or when `content_filter` is supplied and
    /// none of its comma-separated OR terms appear in the extracted content
    /// (case-insensitive, §4.1).
    async fn crawl_detail(
        &self,
        client: &Client,
        link: &ArticleLink,
        content_filter: Option<&str>,
    ) -> Result<Option<DraftArticle>>;

    /// §6 `POST /topics/init-from-html` — discovers category/topic links from
    /// this site's navigation page. Default: not configured, yields nothing.
    async fn discover_topics(&self, _client: &Client) -> Result<Vec<TopicCandidate>> {
        Ok(vec![])
    }
}

/// §4.1/§4.7: comma-separated OR-of-substrings match, case-insensitive, over
/// `haystack`. `None` filter always matches. Shared by every adapter so the
/// semantics are identical regardless of which adapter applies it.
pub fn matches_content_filter(content_filter: Option<&str>, haystack: &str) -> bool {
    let Some(filter) = content_filter else {
        return true;
    };
    let terms: Vec<String> = filter
        .split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() {
        return true;
    }
    let lower = haystack.to_lowercase();
    terms.iter().any(|t| lower.contains(t.as_str()))
}

/// Process-wide registry mapping `website` to its adapter, shared by the
/// crawl executor and topic scheduler (§4.1: "pluggable per-host adapter
/// contract behind a process-global registry").
#[derive(Default)]
pub struct SiteRegistry {
    adapters: HashMap<String, Arc<dyn SiteAdapter>>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn SiteAdapter>) {
        self.adapters.insert(adapter.website().to_string(), adapter);
    }

    pub fn get(&self, website: &str) -> Option<Arc<dyn SiteAdapter>> {
        self.adapters.get(website).cloned()
    }

    pub fn websites(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopAdapter(&'static str);

    #[async_trait]
    impl SiteAdapter for NoopAdapter {
        fn website(&self) -> &str {
            self.0
        }

        async fn fetch_search_page(
            &self,
            _client: &Client,
            _keyword: &str,
            _page: usize,
            _start_date: DateTime<Utc>,
            _end_date: DateTime<Utc>,
        ) -> Result<Vec<ArticleLink>> {
            Ok(vec![])
        }

        async fn fetch_category_page(&self, _client: &Client, _category_url: &str, _page: usize) -> Result<Vec<ArticleLink>> {
            Ok(vec![])
        }

        async fn crawl_detail(&self, _client: &Client, _link: &ArticleLink, _content_filter: Option<&str>) -> Result<Option<DraftArticle>> {
            Ok(None)
        }
    }

    #[test]
    fn registry_resolves_by_website() {
        let mut registry = SiteRegistry::new();
        registry.register(Arc::new(NoopAdapter("example")));
        assert!(registry.get("example").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.websites(), vec!["example".to_string()]);
    }

    #[test]
    fn content_filter_none_always_matches() {
        assert!(matches_content_filter(None, "anything"));
    }

    #[test]
    fn content_filter_or_of_substrings_case_insensitive() {
        assert!(matches_content_filter(Some("nợ xấu, lạm phát"), "Tin tức về NỢ XẤU ngân hàng"));
        assert!(matches_content_filter(Some("nợ xấu, lạm phát"), "lạm phát tăng cao"));
        assert!(!matches_content_filter(Some("nợ xấu, lạm phát"), "tăng trưởng GDP"));
    }
}
