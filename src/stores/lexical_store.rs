//! Lexical index (§3, §4.6) — a Meilisearch mirror of the document store.
//! Grounded on `original_source/crawler/services/crawler_service.py`'s
//! `sync_to_meilisearch` (idempotent attribute configuration reapplied on
//! every sync, `add_documents(primary_key='article_id')`) and
//! `perform_hybrid_search`'s lexical-query construction (filter string,
//! `attributesToSearchOn`, `limit`).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use meilisearch_sdk::client::Client;
use tracing::warn;

use crate::core::types::Article;

const INDEX_NAME: &str = "articles";
const FILTERABLE_ATTRIBUTES: &[&str] = &[
    "publish_date",
    "website",
    "site_categories",
    "search_id",
    "ai_sentiment_label",
];
const SEARCHABLE_ATTRIBUTES: &[&str] = &[
    "title",
    "summary",
    "content",
    "site_categories",
    "website",
    "search_keyword",
    "ai_sentiment_label",
];

pub struct LexicalStore {
    client: Client,
}

/// Parameters for a lexical query (§4.6), independent of the keyword_content
/// post-filter which is applied client-side after the Meilisearch round-trip.
#[derive(Debug, Clone)]
pub struct LexicalSearchParams {
    pub keyword_search: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub websites: Vec<String>,
    pub limit: usize,
}

impl LexicalStore {
    pub fn connect(url: &str, api_key: Option<&str>) -> Result<Self> {
        let client = Client::new(url, api_key).context("failed to build meilisearch client")?;
        Ok(Self { client })
    }

    /// Reapplies the index's filterable/searchable attribute configuration.
    /// Idempotent and cheap enough to call on every fanout write, matching
    /// the source's "reconfigure then add_documents" pattern.
    pub async fn ensure_attributes(&self) -> Result<()> {
        let index = self.client.index(INDEX_NAME);
        index
            .set_filterable_attributes(FILTERABLE_ATTRIBUTES)
            .await
            .context("set_filterable_attributes failed")?;
        index
            .set_searchable_attributes(SEARCHABLE_ATTRIBUTES)
            .await
            .context("set_searchable_attributes failed")?;
        Ok(())
    }

    pub async fn add_documents(&self, articles: &[Article]) -> Result<()> {
        if articles.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.ensure_attributes().await {
            warn!("meilisearch attribute sync failed (continuing): {:#}", e);
        }
        self.client
            .index(INDEX_NAME)
            .add_documents(articles, Some("article_id"))
            .await
            .context("add_documents failed")?;
        Ok(())
    }

    pub async fn delete_documents(&self, article_ids: &[String]) -> Result<()> {
        if article_ids.is_empty() {
            return Ok(());
        }
        self.client
            .index(INDEX_NAME)
            .delete_documents(article_ids)
            .await
            .context("delete_documents failed")?;
        Ok(())
    }

    /// Runs the Meilisearch half of §4.6's hybrid query. Returns raw hits;
    /// the `keyword_content` OR-substring post-filter and dedup/sort/truncate
    /// steps live in `search::hybrid` as pure, independently testable functions.
    pub async fn search(&self, params: &LexicalSearchParams) -> Result<Vec<Article>> {
        let filter = build_filter(params);
        let index = self.client.index(INDEX_NAME);
        let mut query = index.search();
        query
            .with_query(&params.keyword_search)
            .with_limit(params.limit)
            .with_attributes_to_search_on(&["title", "site_categories", "website", "search_keyword"]);
        if !filter.is_empty() {
            query.with_filter(&filter);
        }
        let results = query
            .execute::<Article>()
            .await
            .context("meilisearch query failed")?;
        Ok(results.hits.into_iter().map(|h| h.result).collect())
    }
}

/// Builds the `publish_date >= .. AND publish_date <= .. AND (website = ..
/// OR ..)` filter string. Pure and independently testable.
pub fn build_filter(params: &LexicalSearchParams) -> String {
    let mut conditions = Vec::new();
    if let Some(start) = params.start_date {
        conditions.push(format!("publish_date >= '{}'", start.format("%Y-%m-%d")));
    }
    if let Some(end) = params.end_date {
        conditions.push(format!("publish_date <= '{}'", end.format("%Y-%m-%d")));
    }
    if !params.websites.is_empty() {
        let site_filters: Vec<String> = params
            .websites
            .iter()
            .map(|site| format!("website = '{site}'"))
            .collect();
        conditions.push(format!("({})", site_filters.join(" OR ")));
    }
    conditions.join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params(websites: Vec<&str>) -> LexicalSearchParams {
        LexicalSearchParams {
            keyword_search: "test".into(),
            start_date: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
            end_date: Some(Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap()),
            websites: websites.into_iter().map(String::from).collect(),
            limit: 120,
        }
    }

    #[test]
    fn builds_date_range_filter_without_websites() {
        let f = build_filter(&params(vec![]));
        assert_eq!(f, "publish_date >= '2026-01-01' AND publish_date <= '2026-01-31'");
    }

    #[test]
    fn appends_oring_website_clause() {
        let f = build_filter(&params(vec!["vnexpress", "vneconomy"]));
        assert!(f.ends_with("AND (website = 'vnexpress' OR website = 'vneconomy')"));
    }

    #[test]
    fn empty_params_yields_empty_filter() {
        let p = LexicalSearchParams {
            keyword_search: "x".into(),
            start_date: None,
            end_date: None,
            websites: vec![],
            limit: 10,
        };
        assert_eq!(build_filter(&p), "");
    }
}
