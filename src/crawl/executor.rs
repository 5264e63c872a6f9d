//! Crawl executor (§4.7) — runs a quota-bounded crawl across one or more
//! sites. Grounded on `original_source/crawler/services/crawler_service.py`:
//! `execute_crawl_task` (sequential site iteration so the gap quota is
//! respected exactly) and `_crawl_task_wrapper` (page cap 50, per-page
//! concurrent detail fetch, 1s inter-page sleep, bulk upsert then lexical
//! sync). Concurrency-limiting pattern (`buffer_unordered` over a bounded
//! stream) is reused from `tools/crawl.rs`'s BFS crawler, re-targeted from
//! unbounded recursive link-following to this bounded quota loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::adapters::{ArticleLink, DraftArticle, SiteRegistry};
use crate::core::config::Config;
use crate::core::types::{Article, ArticleStatus};
use crate::pipeline::chunking::derive_article_id;
use crate::stores::fanout::{FanoutArticle, StoreFanout};

/// §4.7: at most this many listing pages are ever walked for one site in one
/// crawl run, matching the source's hardcoded page cap.
const MAX_PAGES_PER_SITE: usize = 50;

/// §4.7: pause between listing pages, matching the source's `sleep(1)`.
const INTER_PAGE_DELAY: Duration = Duration::from_secs(1);

/// Sentinel keyword meaning "no explicit user keyword" — used by the topic
/// scheduler so derived articles fall back to their own tags/categories
/// instead of being tagged with a literal placeholder string.
pub const AUTO_TOPIC_KEYWORD: &str = "auto_topic";

#[derive(Debug, Clone)]
pub struct CrawlParams {
    pub keyword_search: String,
    pub keyword_content: Option<String>,
    /// Websites to crawl. Empty means "every adapter currently registered".
    pub websites: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub user_id: String,
}

pub struct CrawlExecutor {
    http_client: reqwest::Client,
    site_registry: Arc<SiteRegistry>,
    fanout: Arc<StoreFanout>,
    detail_fetch_limit: Arc<Semaphore>,
    config: Arc<Config>,
}

impl CrawlExecutor {
    pub fn new(
        http_client: reqwest::Client,
        site_registry: Arc<SiteRegistry>,
        fanout: Arc<StoreFanout>,
        detail_fetch_limit: Arc<Semaphore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            http_client,
            site_registry,
            fanout,
            detail_fetch_limit,
            config,
        }
    }

    /// Runs the crawl across sites sequentially so the `quota` (the search
    /// gap, §4.6) is respected exactly — a site that fills the remaining
    /// quota stops every subsequent site from being crawled at all.
    pub async fn run(&self, params: &CrawlParams, search_id: &str, quota: usize) -> Result<usize> {
        let websites = if params.websites.is_empty() {
            self.site_registry.websites()
        } else {
            params.websites.clone()
        };

        let mut remaining = quota;
        let mut total = 0usize;

        for website in websites {
            if remaining == 0 {
                info!("crawl executor: quota reached, skipping remaining sites");
                break;
            }
            let Some(adapter) = self.site_registry.get(&website) else {
                warn!("crawl executor: no adapter registered for '{website}'");
                continue;
            };

            let count = self
                .crawl_site_search(adapter.as_ref(), params, search_id, remaining)
                .await
                .unwrap_or_else(|e| {
                    warn!("crawl executor: site '{website}' failed: {:#}", e);
                    0
                });
            total += count;
            remaining = remaining.saturating_sub(count);
        }

        Ok(total)
    }

    async fn crawl_site_search(
        &self,
        adapter: &dyn crate::adapters::SiteAdapter,
        params: &CrawlParams,
        search_id: &str,
        quota: usize,
    ) -> Result<usize> {
        let mut count = 0usize;
        let mut page = 1usize;

        while count < quota && page <= MAX_PAGES_PER_SITE {
            let links = adapter
                .fetch_search_page(&self.http_client, &params.keyword_search, page, params.start_date, params.end_date)
                .await?;
            if links.is_empty() {
                break;
            }

            let remaining_slots = quota - count;
            let links_to_fetch: Vec<ArticleLink> = links.into_iter().take(remaining_slots).collect();
            if links_to_fetch.is_empty() {
                break;
            }

            let drafts = self
                .fetch_details(adapter, links_to_fetch, params.keyword_content.as_deref())
                .await;
            if drafts.is_empty() {
                break;
            }

            let articles: Vec<FanoutArticle> = drafts
                .into_iter()
                .map(|draft| build_article(draft, Some(&params.keyword_search), &params.user_id, search_id))
                .map(|article| FanoutArticle { article, vector_points: None })
                .collect();

            let fetched = articles.len();
            self.fanout.upsert_articles(&articles).await;
            count += fetched;

            if count >= quota {
                break;
            }
            page += 1;
            tokio::time::sleep(INTER_PAGE_DELAY).await;
        }

        Ok(count)
    }

    /// Fetches every link's detail page concurrently, bounded by the shared
    /// process-wide semaphore (§5: default 20 in-flight detail fetches).
    async fn fetch_details(
        &self,
        adapter: &dyn crate::adapters::SiteAdapter,
        links: Vec<ArticleLink>,
        content_filter: Option<&str>,
    ) -> Vec<DraftArticle> {
        let client = &self.http_client;
        let limit = &self.detail_fetch_limit;
        stream::iter(links)
            .map(|link| async move {
                let _permit = limit.acquire().await.ok()?;
                match adapter.crawl_detail(client, &link, content_filter).await {
                    Ok(Some(draft)) => Some(draft),
                    Ok(None) => None,
                    Err(e) => {
                        warn!("crawl executor: detail fetch failed for {}: {:#}", link.url, e);
                        None
                    }
                }
            })
            .buffer_unordered(self.config.resolve_max_concurrent_requests())
            .filter_map(|r| async move { r })
            .collect()
            .await
    }
}

/// §4.7/crawl_and_process_article: builds a finished [`Article`] from an
/// adapter's draft, deriving `article_id` from the URL and the
/// `search_keyword` via explicit-keyword > tags > last-2-categories >
/// website fallback.
pub fn build_article(draft: DraftArticle, explicit_keyword: Option<&str>, user_id: &str, search_id: &str) -> Article {
    let article_id = derive_article_id(&draft.url);
    let search_keyword = derive_search_keyword(explicit_keyword, &draft.tags, &draft.site_categories, &draft.website);

    let mut article = Article {
        article_id,
        url: draft.url,
        title: draft.title,
        summary: draft.summary,
        content: draft.content,
        site_categories: draft.site_categories,
        tags: draft.tags,
        publish_date: draft.publish_date,
        crawled_at: Utc::now(),
        website: draft.website,
        status: ArticleStatus::Raw,
        search_keyword,
        user_id: user_id.to_string(),
        ..Article::default()
    };
    article.search_id.insert(search_id.to_string());
    article
}

/// Pure derivation rule shared by the crawl executor and the topic
/// scheduler, grounded in `crawl_and_process_article`'s fallback chain.
pub fn derive_search_keyword(explicit: Option<&str>, tags: &[String], site_categories: &[String], website: &str) -> String {
    if let Some(keyword) = explicit {
        if !keyword.is_empty() && keyword != AUTO_TOPIC_KEYWORD {
            return keyword.to_string();
        }
    }
    if !tags.is_empty() {
        return tags.join(", ");
    }
    if !site_categories.is_empty() {
        let start = site_categories.len().saturating_sub(2);
        return site_categories[start..].join(", ");
    }
    website.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_keyword_wins_when_present() {
        let kw = derive_search_keyword(Some("bong da"), &["tag".into()], &["cat".into()], "site");
        assert_eq!(kw, "bong da");
    }

    #[test]
    fn auto_topic_sentinel_falls_through_to_tags() {
        let kw = derive_search_keyword(Some(AUTO_TOPIC_KEYWORD), &["kinh-te".into()], &[], "site");
        assert_eq!(kw, "kinh-te");
    }

    #[test]
    fn falls_back_to_last_two_categories_without_tags() {
        let cats = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let kw = derive_search_keyword(None, &[], &cats, "site");
        assert_eq!(kw, "B, C");
    }

    #[test]
    fn falls_back_to_website_with_nothing_else() {
        let kw = derive_search_keyword(None, &[], &[], "vnexpress");
        assert_eq!(kw, "vnexpress");
    }

    #[test]
    fn build_article_derives_deterministic_id_and_seeds_search_id() {
        let draft = DraftArticle {
            url: "https://vnexpress.net/bai-1".into(),
            title: "T".into(),
            summary: "S".into(),
            content: "C".into(),
            site_categories: vec!["Kinh doanh".into()],
            tags: vec![],
            publish_date: None,
            website: "vnexpress".into(),
        };
        let article = build_article(draft, Some("kinh te"), "user-1", "search-1");
        assert_eq!(article.article_id, derive_article_id("https://vnexpress.net/bai-1"));
        assert!(article.search_id.contains("search-1"));
        assert_eq!(article.status, ArticleStatus::Raw);
    }
}
