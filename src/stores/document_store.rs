//! Document store (§3) — the authoritative collections for Articles,
//! SearchSessions, and Topics. Grounded on `original_source/crawler/database.py`
//! (collection layout: `articles`, a history/session collection, `topics`) and
//! `crawler_service.py`'s `$set`/`$addToSet`/`upsert=True`/`ordered=False` bulk
//! write idioms, translated to the `mongodb` driver's typed `Collection<T>`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, to_bson};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::{Client, Collection, Database};

use crate::core::types::{Article, SearchSession, SearchSessionStatus, Topic};

const ARTICLES_COLLECTION: &str = "articles";
const SEARCH_SESSIONS_COLLECTION: &str = "search_sessions";
const TOPICS_COLLECTION: &str = "topics";

pub struct DocumentStore {
    db: Database,
}

/// Result of a retention sweep (§3 SearchSession lifecycle, P7).
#[derive(Debug, Default)]
pub struct RetentionOutcome {
    pub dropped_search_ids: Vec<String>,
    pub orphaned_article_ids: Vec<String>,
}

impl DocumentStore {
    /// Connects using the URI's own path segment as the database name
    /// (e.g. `mongodb://host/tin_loom`), falling back to `tin_loom` when the
    /// URI carries none — mirrors the source's single-database Motor client.
    pub async fn connect(uri: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .with_context(|| format!("failed to build mongo client for {uri}"))?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .context("mongo ping failed")?;
        let db = client.default_database().unwrap_or_else(|| client.database("tin_loom"));
        Ok(Self { db })
    }

    fn articles(&self) -> Collection<Article> {
        self.db.collection(ARTICLES_COLLECTION)
    }

    fn sessions(&self) -> Collection<SearchSession> {
        self.db.collection(SEARCH_SESSIONS_COLLECTION)
    }

    fn topics(&self) -> Collection<Topic> {
        self.db.collection(TOPICS_COLLECTION)
    }

    // ---- Articles --------------------------------------------------------

    /// Upsert one article keyed by `url` (P1): `$set` every field but
    /// `search_id`, which grows via `$addToSet $each` so re-crawling the same
    /// URL never shrinks its claim set.
    pub async fn upsert_article(&self, article: &Article) -> Result<()> {
        let mut set_doc = to_bson(article)
            .context("serialize article")?
            .as_document()
            .context("article did not serialize to a document")?
            .clone();
        set_doc.remove("search_id");
        set_doc.remove("_id");

        let search_ids: Vec<_> = article.search_id.iter().cloned().collect();

        self.articles()
            .find_one_and_update(
                doc! { "url": &article.url },
                doc! {
                    "$set": set_doc,
                    "$addToSet": { "search_id": { "$each": search_ids } },
                    "$setOnInsert": { "article_id": &article.article_id },
                },
            )
            .with_options(
                FindOneAndUpdateOptions::builder()
                    .upsert(true)
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await
            .context("upsert_article failed")?;
        Ok(())
    }

    /// §4.3 `add_search_id` — grow `search_id` on every matching article.
    pub async fn add_search_id(&self, article_ids: &[String], search_id: &str) -> Result<u64> {
        if article_ids.is_empty() {
            return Ok(0);
        }
        let result = self
            .articles()
            .update_many(
                doc! { "article_id": { "$in": article_ids } },
                doc! { "$addToSet": { "search_id": search_id } },
            )
            .await
            .context("add_search_id failed")?;
        Ok(result.modified_count)
    }

    pub async fn delete_by_article_ids(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = self
            .articles()
            .delete_many(doc! { "article_id": { "$in": ids } })
            .await
            .context("delete_by_article_ids failed")?;
        Ok(result.deleted_count)
    }

    pub async fn find_by_url(&self, url: &str) -> Result<Option<Article>> {
        self.articles()
            .find_one(doc! { "url": url })
            .await
            .context("find_by_url failed")
    }

    pub async fn find_by_article_ids(&self, ids: &[String]) -> Result<Vec<Article>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cursor = self
            .articles()
            .find(doc! { "article_id": { "$in": ids } })
            .await
            .context("find_by_article_ids failed")?;
        cursor.try_collect().await.context("collect find_by_article_ids")
    }

    /// Used by the topic scheduler's early-stop check (P6): does this URL
    /// already exist with `"system_auto"` in its `search_id` set?
    pub async fn url_has_search_id(&self, url: &str, search_id: &str) -> Result<bool> {
        let doc = self.find_by_url(url).await?;
        Ok(doc.map(|a| a.search_id.contains(search_id)).unwrap_or(false))
    }

    /// Claim up to `limit` articles in `{raw, ai_error}` for enrichment
    /// (§4.5): fetch the batch, then flip it to `processing` in one
    /// `update_many` scoped to the ids just read. This is the same two-step
    /// claim the source system uses (`scheduler_service.py::enrichment_worker`)
    /// — not a single atomic document-level CAS, but race-free across worker
    /// ticks because `≤ 2` concurrent instances run in this process and no
    /// other writer ever re-sets a `processing` article back to `raw`.
    pub async fn claim_batch_for_enrichment(&self, limit: i64) -> Result<Vec<Article>> {
        let cursor = self
            .articles()
            .find(doc! { "status": { "$in": ["raw", "ai_error"] } })
            .limit(limit)
            .await
            .context("claim_batch_for_enrichment find failed")?;
        let batch: Vec<Article> = cursor.try_collect().await.context("collect claim batch")?;
        if batch.is_empty() {
            return Ok(batch);
        }
        let ids: Vec<_> = batch.iter().map(|a| a.article_id.clone()).collect();
        self.articles()
            .update_many(
                doc! { "article_id": { "$in": &ids } },
                doc! { "$set": { "status": "processing" } },
            )
            .await
            .context("mark batch processing failed")?;
        Ok(batch)
    }

    pub async fn mark_ai_error(&self, article_id: &str) -> Result<()> {
        self.articles()
            .update_one(
                doc! { "article_id": article_id },
                doc! { "$set": { "status": "ai_error" } },
            )
            .await
            .context("mark_ai_error failed")?;
        Ok(())
    }

    pub async fn count_by_search_id(&self, search_id: &str) -> Result<u64> {
        self.articles()
            .count_documents(doc! { "search_id": search_id })
            .await
            .context("count_by_search_id failed")
    }

    pub async fn list_by_search_id(
        &self,
        search_id: &str,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<Article>, u64)> {
        let total = self.count_by_search_id(search_id).await?;
        let skip = ((page.max(1) - 1) * page_size) as u64;
        let cursor = self
            .articles()
            .find(doc! { "search_id": search_id })
            .sort(doc! { "publish_date": -1 })
            .skip(skip)
            .limit(page_size as i64)
            .await
            .context("list_by_search_id find failed")?;
        let data: Vec<Article> = cursor.try_collect().await.context("collect page")?;
        Ok((data, total))
    }

    // ---- Search sessions ---------------------------------------------------

    pub async fn insert_search_session(&self, session: &SearchSession) -> Result<()> {
        self.sessions()
            .insert_one(session)
            .await
            .context("insert_search_session failed")?;
        Ok(())
    }

    pub async fn get_search_session(&self, search_id: &str) -> Result<Option<SearchSession>> {
        self.sessions()
            .find_one(doc! { "search_id": search_id })
            .await
            .context("get_search_session failed")
    }

    pub async fn update_search_session_status(
        &self,
        search_id: &str,
        status: SearchSessionStatus,
        total_saved: usize,
    ) -> Result<()> {
        let status_str = match status {
            SearchSessionStatus::Processing => "processing",
            SearchSessionStatus::Completed => "completed",
        };
        self.sessions()
            .update_one(
                doc! { "search_id": search_id },
                doc! { "$set": {
                    "status": status_str,
                    "total_saved": total_saved as i64,
                    "updated_at": Utc::now().to_rfc3339(),
                } },
            )
            .await
            .context("update_search_session_status failed")?;
        Ok(())
    }

    pub async fn list_sessions_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<SearchSession>> {
        let cursor = self
            .sessions()
            .find(doc! { "user_id": user_id })
            .sort(doc! { "created_at": -1 })
            .limit(limit)
            .await
            .context("list_sessions_for_user failed")?;
        cursor.try_collect().await.context("collect sessions")
    }

    /// §3 SearchSession retention (P7): keep only the newest `keep_n` sessions
    /// per user; pull the dropped sessions' `search_id` from every article
    /// that carries it, and report ids whose `search_id` set became empty so
    /// the caller can delete them from every store.
    pub async fn retention_sweep(&self, user_id: &str, keep_n: i64) -> Result<RetentionOutcome> {
        let total = self
            .sessions()
            .count_documents(doc! { "user_id": user_id })
            .await
            .context("count sessions for retention")?;
        let mut outcome = RetentionOutcome::default();
        if total as i64 <= keep_n {
            return Ok(outcome);
        }
        let drop_count = total as i64 - keep_n;
        let cursor = self
            .sessions()
            .find(doc! { "user_id": user_id })
            .sort(doc! { "created_at": 1 })
            .limit(drop_count)
            .await
            .context("find oldest sessions")?;
        let oldest: Vec<SearchSession> = cursor.try_collect().await.context("collect oldest sessions")?;
        if oldest.is_empty() {
            return Ok(outcome);
        }
        let dropped_ids: Vec<String> = oldest.iter().map(|s| s.search_id.clone()).collect();

        self.articles()
            .update_many(
                doc! { "search_id": { "$in": &dropped_ids } },
                doc! { "$pull": { "search_id": { "$in": &dropped_ids } } },
            )
            .await
            .context("pull dropped search ids from articles")?;

        let orphan_cursor = self
            .articles()
            .find(doc! { "search_id": doc! { "$size": 0 } })
            .await
            .context("find orphaned articles")?;
        let orphans: Vec<Article> = orphan_cursor.try_collect().await.context("collect orphans")?;
        let orphan_ids: Vec<String> = orphans.iter().map(|a| a.article_id.clone()).collect();
        if !orphan_ids.is_empty() {
            self.delete_by_article_ids(&orphan_ids).await?;
        }

        self.sessions()
            .update_many(
                doc! { "search_id": { "$in": &dropped_ids } },
                doc! { "$set": { "data_cleared": true } },
            )
            .await
            .context("mark sessions data_cleared")?;

        outcome.dropped_search_ids = dropped_ids;
        outcome.orphaned_article_ids = orphan_ids;
        Ok(outcome)
    }

    // ---- Topics -------------------------------------------------------------

    pub async fn upsert_topic(&self, topic: &Topic) -> Result<()> {
        let mut set_doc = to_bson(topic)
            .context("serialize topic")?
            .as_document()
            .context("topic did not serialize to a document")?
            .clone();
        set_doc.remove("_id");
        self.topics()
            .update_one(doc! { "url": &topic.url }, doc! { "$set": set_doc })
            .with_options(mongodb::options::UpdateOptions::builder().upsert(true).build())
            .await
            .context("upsert_topic failed")?;
        Ok(())
    }

    pub async fn list_active_topics(&self, website: Option<&str>) -> Result<Vec<Topic>> {
        let mut filter = doc! { "is_active": true };
        if let Some(site) = website {
            filter.insert("website", site);
        }
        let cursor = self.topics().find(filter).await.context("list_active_topics failed")?;
        cursor.try_collect().await.context("collect topics")
    }

    pub async fn set_topic_last_crawled(&self, url: &str, when: DateTime<Utc>) -> Result<()> {
        self.topics()
            .update_one(
                doc! { "url": url },
                doc! { "$set": { "last_crawled_at": when.to_rfc3339() } },
            )
            .await
            .context("set_topic_last_crawled failed")?;
        Ok(())
    }
}
