//! Hybrid search orchestrator (§4.6) — reconciles a user query against the
//! lexical index, decides whether the result is short of `max_articles`, and
//! if so enqueues a background crawl task before returning immediately.
//! Grounded on `original_source/crawler/services/crawler_service.py::
//! perform_hybrid_search` (filter construction, title-substring post-filter,
//! dedup-by-url, sort-by-publish_date-desc-missing-last, truncate) and
//! `execute_crawl_task`'s gap-fill parameterization.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::{info, warn};

use crate::adapters::matches_content_filter;
use crate::core::config::Config;
use crate::core::error::{AppError, AppResult};
use crate::core::types::{
    Article, CrawlMeta, CrawlRequest, CrawlResponse, PageMeta, PagedArticles, RetrieveContextRequest,
    RetrieveContextResponse, RetrievedContext, SearchSession, SearchSessionStatus,
};
use crate::crawl::executor::{CrawlExecutor, CrawlParams};
use crate::providers::EmbeddingProvider;
use crate::stores::document_store::DocumentStore;
use crate::stores::lexical_store::{LexicalSearchParams, LexicalStore};
use crate::stores::vector_store::VectorStore;
use crate::stores::StoreFanout;

/// §4.6 step 2: the lexical query is over-fetched by this much headroom
/// before the title/keyword_content post-filter and truncate run.
const LEXICAL_OVERFETCH: usize = 100;

pub struct HybridSearchOrchestrator {
    document_store: Arc<DocumentStore>,
    lexical_store: Arc<LexicalStore>,
    vector_store: Arc<VectorStore>,
    fanout: Arc<StoreFanout>,
    crawl_executor: Arc<CrawlExecutor>,
    embedding: Arc<EmbeddingProvider>,
    config: Arc<Config>,
}

impl HybridSearchOrchestrator {
    pub fn new(
        document_store: Arc<DocumentStore>,
        lexical_store: Arc<LexicalStore>,
        vector_store: Arc<VectorStore>,
        fanout: Arc<StoreFanout>,
        crawl_executor: Arc<CrawlExecutor>,
        embedding: Arc<EmbeddingProvider>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            document_store,
            lexical_store,
            vector_store,
            fanout,
            crawl_executor,
            embedding,
            config,
        }
    }

    /// §4.6 — the full algorithm behind `POST /crawl`. Never blocks on a
    /// crawl: step 6's gap-fill runs in a detached task.
    pub async fn start_search(self: &Arc<Self>, req: CrawlRequest) -> AppResult<CrawlResponse> {
        let start_date = parse_ddmmyyyy(&req.start_date)?;
        let end_date = parse_ddmmyyyy(&req.end_date)?;
        if start_date > end_date {
            return Err(AppError::BadInput(format!(
                "start_date {} is after end_date {}",
                req.start_date, req.end_date
            )));
        }

        let search_id = allocate_search_id(&req.user_id);

        let lexical_params = LexicalSearchParams {
            keyword_search: req.keyword_search.clone(),
            start_date: Some(start_date),
            end_date: Some(end_date),
            websites: req.websites.clone(),
            limit: req.max_articles + LEXICAL_OVERFETCH,
        };
        let hits = self
            .lexical_store
            .search(&lexical_params)
            .await
            .map_err(|e| AppError::Store { store: "lexical_store", source: e })
            .unwrap_or_else(|e| {
                warn!("lexical search failed, treating as zero hits: {:#}", e);
                vec![]
            });

        let filtered = post_filter(hits, &req.keyword_search, req.keyword_content.as_deref());
        let results = dedup_sort_truncate(filtered, req.max_articles);

        let article_ids: Vec<String> = results.iter().map(|a| a.article_id.clone()).collect();
        if !article_ids.is_empty() {
            if let Err(e) = self.fanout.add_search_id(&article_ids, &search_id).await {
                warn!("failed to attach search_id {} to existing results: {:#}", search_id, e);
            }
        }

        let missing = req.max_articles.saturating_sub(results.len());
        let status = if missing == 0 { SearchSessionStatus::Completed } else { SearchSessionStatus::Processing };

        let now = Utc::now();
        let session = SearchSession {
            search_id: search_id.clone(),
            user_id: req.user_id.clone(),
            keyword_search: req.keyword_search.clone(),
            keyword_content: req.keyword_content.clone(),
            max_articles_requested: req.max_articles,
            total_saved: results.len(),
            status,
            start_date: req.start_date.clone(),
            end_date: req.end_date.clone(),
            created_at: now,
            updated_at: now,
            data_cleared: false,
        };
        self.document_store
            .insert_search_session(&session)
            .await
            .map_err(|e| AppError::Store { store: "document_store", source: e })?;

        if missing > 0 {
            self.spawn_gap_fill(req.clone(), search_id.clone(), missing, start_date, end_date);
        }

        self.run_retention_sweep(&req.user_id);

        Ok(CrawlResponse {
            status: status_str(status).to_string(),
            search_id: search_id.clone(),
            meta: CrawlMeta {
                total_available_now: results.len(),
                page: req.page,
                page_size: req.page_size,
            },
            stream_url: format!("/crawl/stream-status/{search_id}"),
        })
    }

    /// §4.6 step 6/7: the background crawl task. Marks the session
    /// `completed` and refreshes `total_saved` once the crawl finishes,
    /// regardless of how many articles it actually managed to add.
    fn spawn_gap_fill(
        self: &Arc<Self>,
        req: CrawlRequest,
        search_id: String,
        quota: usize,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let params = CrawlParams {
                keyword_search: req.keyword_search,
                keyword_content: req.keyword_content,
                websites: req.websites,
                start_date,
                end_date,
                user_id: req.user_id.clone(),
            };
            let outcome = orchestrator.crawl_executor.run(&params, &search_id, quota).await;
            if let Err(e) = &outcome {
                warn!("gap-fill crawl for search_id {} failed: {:#}", search_id, e);
            }
            let total = orchestrator
                .document_store
                .count_by_search_id(&search_id)
                .await
                .unwrap_or(0) as usize;
            if let Err(e) = orchestrator
                .document_store
                .update_search_session_status(&search_id, SearchSessionStatus::Completed, total)
                .await
            {
                warn!("failed to mark search_id {} completed: {:#}", search_id, e);
            }
        });
    }

    /// §3/P7: runs the per-user session retention sweep in the background so
    /// it never delays the response to the caller.
    fn run_retention_sweep(self: &Arc<Self>, user_id: &str) {
        let orchestrator = Arc::clone(self);
        let user_id = user_id.to_string();
        let keep_n = self.config.resolve_history_limit() as i64;
        tokio::spawn(async move {
            match orchestrator.document_store.retention_sweep(&user_id, keep_n).await {
                Ok(outcome) if !outcome.orphaned_article_ids.is_empty() => {
                    info!(
                        "retention sweep for {}: dropped {} sessions, orphaned {} articles",
                        user_id,
                        outcome.dropped_search_ids.len(),
                        outcome.orphaned_article_ids.len()
                    );
                    if let Err(e) = orchestrator.fanout.delete_by_article_ids(&outcome.orphaned_article_ids).await {
                        warn!("retention sweep delete failed: {:#}", e);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("retention sweep failed for {}: {:#}", user_id, e),
            }
        });
    }

    /// §4.4 `retrieve_context` — vector-only semantic retrieval consumed by
    /// the chat assistant layer. `top_k` hits sorted by similarity score.
    pub async fn retrieve_context(&self, req: RetrieveContextRequest) -> AppResult<RetrieveContextResponse> {
        let vector = self
            .embedding
            .encode_single(&req.question)
            .await
            .map_err(AppError::Upstream)?;
        let caller = req.user_id.as_deref().unwrap_or("");
        let points = self
            .vector_store
            .retrieve_context(&vector, caller, req.top_k)
            .await
            .map_err(|e| AppError::Store { store: "vector_store", source: e })?;

        let mut contexts: Vec<RetrievedContext> = points
            .into_iter()
            .map(|p| {
                let score = 1.0 - p.distance.unwrap_or(1.0);
                match p.payload {
                    crate::core::types::VectorPointPayload::Chunk { text, title, url, publish_date, sentiment, .. } => {
                        RetrievedContext { text, title, url, score, publish_date, sentiment_label: sentiment }
                    }
                    crate::core::types::VectorPointPayload::AiSummary { summary_text, title, url, publish_date, sentiment, .. } => {
                        RetrievedContext {
                            text: summary_text.join(" "),
                            title,
                            url,
                            score,
                            publish_date,
                            sentiment_label: sentiment,
                        }
                    }
                }
            })
            .collect();
        contexts.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        contexts.truncate(req.top_k);
        Ok(RetrieveContextResponse { contexts })
    }

    /// §6 `GET /history/{search_id}/articles`.
    pub async fn paged_articles(&self, search_id: &str, page: usize, page_size: usize) -> AppResult<PagedArticles> {
        let (data, total) = self
            .document_store
            .list_by_search_id(search_id, page.max(1), page_size.max(1))
            .await
            .map_err(|e| AppError::Store { store: "document_store", source: e })?;
        let total_pages = if page_size == 0 { 0 } else { ((total as usize) + page_size - 1) / page_size };
        Ok(PagedArticles {
            data,
            meta: PageMeta { total: total as usize, page, page_size, total_pages },
        })
    }
}

fn status_str(status: SearchSessionStatus) -> &'static str {
    match status {
        SearchSessionStatus::Processing => "processing",
        SearchSessionStatus::Completed => "completed",
    }
}

/// §3: `search_id = timestamp + "_" + user_id`, built so that lexical string
/// ordering agrees with chronological ordering (millisecond epoch, zero-padded).
pub fn allocate_search_id(user_id: &str) -> String {
    format!("{:020}_{}", Utc::now().timestamp_millis(), user_id)
}

/// `"DD/MM/YYYY"` per §6's wire format.
pub fn parse_ddmmyyyy(raw: &str) -> AppResult<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .map_err(|_| AppError::BadInput(format!("invalid date '{raw}', expected DD/MM/YYYY")))?;
    Utc.from_local_datetime(&date.and_hms_opt(0, 0, 0).unwrap())
        .single()
        .ok_or_else(|| AppError::BadInput(format!("invalid date '{raw}'")))
}

/// §4.6 step 2: title-substring match (lowercased) followed by the
/// `keyword_content` OR-of-substrings filter over `content ∪ summary`. Pure
/// and independently testable.
pub fn post_filter(hits: Vec<Article>, keyword_search: &str, keyword_content: Option<&str>) -> Vec<Article> {
    let keyword_lower = keyword_search.to_lowercase();
    hits.into_iter()
        .filter(|a| a.title.to_lowercase().contains(&keyword_lower))
        .filter(|a| {
            let haystack = format!("{} {}", a.content, a.summary);
            matches_content_filter(keyword_content, &haystack)
        })
        .collect()
}

/// §4.6 step 3: dedupe by `url`, sort descending by `publish_date` (missing
/// last), truncate to `max_articles`.
pub fn dedup_sort_truncate(hits: Vec<Article>, max_articles: usize) -> Vec<Article> {
    let mut seen = std::collections::HashSet::new();
    let mut deduped: Vec<Article> = hits.into_iter().filter(|a| seen.insert(a.url.clone())).collect();
    deduped.sort_by(|a, b| match (a.publish_date, b.publish_date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    deduped.truncate(max_articles);
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(url: &str, title: &str, content: &str, publish_date: Option<DateTime<Utc>>) -> Article {
        Article {
            url: url.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            publish_date,
            ..Article::default()
        }
    }

    #[test]
    fn parse_ddmmyyyy_parses_and_rejects() {
        let parsed = parse_ddmmyyyy("01/12/2024").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d").to_string(), "2024-12-01");
        assert!(parse_ddmmyyyy("2024-12-01").is_err());
    }

    #[test]
    fn allocate_search_id_embeds_user_id_suffix() {
        let id = allocate_search_id("u1");
        assert!(id.ends_with("_u1"));
    }

    #[test]
    fn post_filter_requires_title_substring_case_insensitively() {
        let hits = vec![
            article("https://a", "Tin tức Vietnam hôm nay", "nội dung", None),
            article("https://b", "Khác hẳn", "nội dung", None),
        ];
        let filtered = post_filter(hits, "vietnam", None);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].url, "https://a");
    }

    #[test]
    fn post_filter_applies_keyword_content_or_filter() {
        let hits = vec![
            article("https://a", "Vietnam kinh tế", "có nợ xấu trong hệ thống", None),
            article("https://b", "Vietnam chính trị", "không liên quan gì cả", None),
        ];
        let filtered = post_filter(hits, "vietnam", Some("nợ xấu, lạm phát"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].url, "https://a");
    }

    #[test]
    fn dedup_sort_truncate_dedupes_by_url_and_sorts_missing_last() {
        let d1 = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        let d2 = Utc.with_ymd_and_hms(2026, 1, 20, 0, 0, 0).unwrap();
        let hits = vec![
            article("https://a", "A", "c", Some(d1)),
            article("https://b", "B", "c", Some(d2)),
            article("https://a", "A dup", "c", Some(d1)),
            article("https://c", "C", "c", None),
        ];
        let result = dedup_sort_truncate(hits, 10);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].url, "https://b");
        assert_eq!(result[1].url, "https://a");
        assert_eq!(result[2].url, "https://c");
    }

    #[test]
    fn dedup_sort_truncate_caps_at_max_articles() {
        let hits = vec![
            article("https://a", "A", "c", None),
            article("https://b", "B", "c", None),
            article("https://c", "C", "c", None),
        ];
        let result = dedup_sort_truncate(hits, 2);
        assert_eq!(result.len(), 2);
    }
}
