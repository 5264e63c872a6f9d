//! Enrichment worker (§4.5) — claims raw/ai_error articles, computes an
//! extractive summary and a sentiment label, chunks the content, embeds
//! chunks and summary, and fans everything out to all three stores.
//!
//! Grounded on `original_source/crawler/services/scheduler_service.py::
//! enrichment_worker`: claim-batch via `find` + bulk `$set status=processing`,
//! per-article try/except with `status='ai_error'` on any failure, the
//! `content.len() < 50` short-circuit to a neutral/empty result, and the
//! `search_id` default-to-`["system_auto"]` behaviour when an article has
//! none. Chunk/summary point construction mirrors the same function's
//! Qdrant `PointStruct` assembly, adapted to [`crate::stores::vector_store`].

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::config::Config;
use crate::core::types::{Article, ArticleStatus, SentimentLabel, VectorPointPayload};
use crate::pipeline::chunking::{chunk_point_id, split_text_into_chunks, summary_point_id};
use crate::pipeline::summarize;
use crate::providers::{EmbeddingProvider, SentimentProvider};
use crate::stores::document_store::DocumentStore;
use crate::stores::fanout::{FanoutArticle, StoreFanout};
use crate::stores::vector_store::VectorPoint;

/// Articles below this content length skip embedding/summarization entirely
/// and are enriched straight to Neutral/empty (§4.5 step 1, matching the
/// source's `len(content_for_analysis) < 50` short-circuit).
const ENRICHMENT_FLOOR_CHARS: usize = 50;

/// §4.5 step 4: sentiment falls back to the first N chars of `content` when
/// there is no summary to classify instead.
const SENTIMENT_FALLBACK_CHARS: usize = 1500;

/// Default `search_id` applied to an article that carries none at enrichment
/// time — this is how auto-discovered (topic-crawled) articles surface in
/// search before any user ever queries for them.
const SYSTEM_AUTO_SEARCH_ID: &str = "system_auto";

pub struct EnrichmentWorker {
    document_store: Arc<DocumentStore>,
    fanout: Arc<StoreFanout>,
    embedding: Arc<EmbeddingProvider>,
    sentiment: Arc<SentimentProvider>,
    batch_size: i64,
    chunk_size_chars: usize,
    chunk_min_chars: usize,
    tick_secs: u64,
    /// Caps concurrently-running `run_once` ticks at 2, matching the source
    /// scheduler's `max_instances=2` for this job.
    concurrency_limit: Arc<Semaphore>,
}

impl EnrichmentWorker {
    pub fn new(
        document_store: Arc<DocumentStore>,
        fanout: Arc<StoreFanout>,
        embedding: Arc<EmbeddingProvider>,
        sentiment: Arc<SentimentProvider>,
        config: &Config,
    ) -> Self {
        Self {
            document_store,
            fanout,
            embedding,
            sentiment,
            batch_size: config.resolve_enrichment_batch_size() as i64,
            chunk_size_chars: config.resolve_chunk_size_chars(),
            chunk_min_chars: config.resolve_chunk_min_chars(),
            tick_secs: config.resolve_enrichment_tick_secs(),
            concurrency_limit: Arc::new(Semaphore::new(2)),
        }
    }

    /// Runs the worker loop until the process exits. Each tick claims a batch
    /// and processes it; at most 2 ticks ever run concurrently (a tick that
    /// outlasts the interval just lets the next one skip rather than stack
    /// up unboundedly).
    pub async fn run_forever(self: Arc<Self>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.tick_secs));
        loop {
            interval.tick().await;
            let Ok(permit) = self.concurrency_limit.clone().try_acquire_owned() else {
                continue;
            };
            let worker = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = worker.run_once().await {
                    warn!("enrichment tick failed: {:#}", e);
                }
            });
        }
    }

    /// Claims and processes one batch; returns the number of articles
    /// successfully enriched (not counting ones that failed into `ai_error`).
    pub async fn run_once(&self) -> Result<usize> {
        let batch = self.document_store.claim_batch_for_enrichment(self.batch_size).await?;
        if batch.is_empty() {
            return Ok(0);
        }
        info!("enrichment: processing {} articles", batch.len());

        let mut fanout_batch = Vec::with_capacity(batch.len());
        for article in batch {
            let article_id = article.article_id.clone();
            match self.enrich_one(article).await {
                Ok(fanout_article) => fanout_batch.push(fanout_article),
                Err(e) => {
                    warn!("enrichment failed for {}: {:#}", article_id, e);
                    if let Err(mark_err) = self.document_store.mark_ai_error(&article_id).await {
                        warn!("failed to mark {} as ai_error: {:#}", article_id, mark_err);
                    }
                }
            }
        }

        let processed = fanout_batch.len();
        if processed > 0 {
            self.fanout.upsert_articles(&fanout_batch).await;
        }
        Ok(processed)
    }

    async fn enrich_one(&self, mut article: Article) -> Result<FanoutArticle> {
        let content_for_analysis = if !article.content.is_empty() {
            article.content.clone()
        } else {
            article.summary.clone()
        };

        if article.search_id.is_empty() {
            article.search_id.insert(SYSTEM_AUTO_SEARCH_ID.to_string());
        }

        if content_for_analysis.chars().count() < ENRICHMENT_FLOOR_CHARS {
            article.ai_summary = vec![];
            article.ai_sentiment_score = Some(0.0);
            article.ai_sentiment_label = Some(SentimentLabel::Neutral);
            article.last_enriched_at = Some(Utc::now());
            article.status = ArticleStatus::Enriched;
            return Ok(FanoutArticle {
                article,
                vector_points: Some(vec![]),
            });
        }

        let summary = summarize::summarize(&self.embedding, &content_for_analysis).await?;

        // §4.5 step 4: classify the joined summary when one was produced,
        // else the first 1500 chars of content.
        let joined_summary = summary.sentences.join(" ");
        let sentiment_input: String = if !joined_summary.is_empty() {
            joined_summary
        } else {
            content_for_analysis.chars().take(SENTIMENT_FALLBACK_CHARS).collect()
        };
        let (sentiment_label, sentiment_score) = self.sentiment.classify(&sentiment_input);

        article.ai_summary = summary.sentences.clone();
        article.ai_sentiment_score = Some(sentiment_score);
        article.ai_sentiment_label = Some(sentiment_label);
        article.last_enriched_at = Some(Utc::now());
        article.status = ArticleStatus::Enriched;

        let points = self.build_vector_points(&article, &content_for_analysis).await?;

        Ok(FanoutArticle {
            article,
            vector_points: Some(points),
        })
    }

    async fn build_vector_points(&self, article: &Article, content: &str) -> Result<Vec<VectorPoint>> {
        let chunks = split_text_into_chunks(&article.article_id, content, self.chunk_size_chars, self.chunk_min_chars);
        let chunk_texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let chunk_vectors = if chunk_texts.is_empty() {
            vec![]
        } else {
            self.embedding.encode_batch(chunk_texts).await?
        };

        let mut points = Vec::with_capacity(chunks.len() + 1);
        for (chunk, vector) in chunks.into_iter().zip(chunk_vectors.into_iter()) {
            let id: Uuid = chunk_point_id(&chunk.chunk_id);
            let payload = VectorPointPayload::Chunk {
                article_id: article.article_id.clone(),
                chunk_id: chunk.chunk_id,
                text: chunk.text,
                title: article.title.clone(),
                url: article.url.clone(),
                website: article.website.clone(),
                publish_date: article.publish_date,
                sentiment: article.ai_sentiment_label.clone(),
                topic: article.site_categories.last().cloned(),
                search_id: article.search_id.clone(),
                user_id: article.user_id.clone(),
            };
            points.push(VectorPoint { id, vector, payload });
        }

        if !article.ai_summary.is_empty() {
            let joined = article.ai_summary.join("\n");
            let vector = self.embedding.encode_single(&joined).await?;
            let id = summary_point_id(&article.article_id);
            let payload = VectorPointPayload::AiSummary {
                article_id: article.article_id.clone(),
                summary_text: article.ai_summary.clone(),
                title: article.title.clone(),
                url: article.url.clone(),
                website: article.website.clone(),
                publish_date: article.publish_date,
                sentiment: article.ai_sentiment_label.clone(),
                topic: article.site_categories.last().cloned(),
                search_id: article.search_id.clone(),
                user_id: article.user_id.clone(),
            };
            points.push(VectorPoint { id, vector, payload });
        }

        Ok(points)
    }
}
