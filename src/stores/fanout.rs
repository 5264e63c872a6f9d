//! Store fanout (§4.3) — writes an article to all three stores with
//! best-effort-eventual consistency: no distributed transaction, a failure
//! in one store is logged and the others still get written, and the next
//! enrichment pass self-heals anything that didn't stick. Grounded directly
//! in the spec's own framing of this component; the "log and continue" shape
//! mirrors the teacher's non-fatal subsystem-degradation pattern in its
//! `AppState` construction.

use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use crate::core::types::Article;
use crate::stores::document_store::DocumentStore;
use crate::stores::lexical_store::LexicalStore;
use crate::stores::vector_store::{VectorPoint, VectorStore};

/// One article plus the vector points derived from it (chunks + optional
/// summary point), written together in one fanout call.
pub struct FanoutArticle {
    pub article: Article,
    pub vector_points: Option<Vec<VectorPoint>>,
}

/// Per-store success/failure for one fanout batch. Never aborts the others —
/// callers inspect this to decide whether to log, retry on the next pass, or
/// ignore (enrichment retries naturally via `status` on the next tick).
#[derive(Debug, Default)]
pub struct FanoutOutcome {
    pub document_store_ok: bool,
    pub lexical_store_ok: bool,
    pub vector_store_ok: bool,
}

impl FanoutOutcome {
    pub fn all_ok(&self) -> bool {
        self.document_store_ok && self.lexical_store_ok && self.vector_store_ok
    }
}

pub struct StoreFanout {
    document_store: Arc<DocumentStore>,
    lexical_store: Arc<LexicalStore>,
    vector_store: Arc<VectorStore>,
}

impl StoreFanout {
    pub fn new(
        document_store: Arc<DocumentStore>,
        lexical_store: Arc<LexicalStore>,
        vector_store: Arc<VectorStore>,
    ) -> Self {
        Self {
            document_store,
            lexical_store,
            vector_store,
        }
    }

    /// Upserts one or more articles into all three stores. The document
    /// store is authoritative and always attempted first; lexical and vector
    /// writes follow independently of whether it succeeded, since the spec
    /// treats all three as eventually-consistent mirrors, not a pipeline.
    pub async fn upsert_articles(&self, articles: &[FanoutArticle]) -> FanoutOutcome {
        let mut outcome = FanoutOutcome::default();

        let mut document_failures = 0usize;
        for item in articles {
            match self.document_store.upsert_article(&item.article).await {
                Ok(()) => {}
                Err(e) => {
                    document_failures += 1;
                    warn!("document store upsert failed for {}: {:#}", item.article.article_id, e);
                }
            }
        }
        outcome.document_store_ok = document_failures == 0;

        let plain_articles: Vec<Article> = articles.iter().map(|i| i.article.clone()).collect();
        match self.lexical_store.add_documents(&plain_articles).await {
            Ok(()) => outcome.lexical_store_ok = true,
            Err(e) => warn!("lexical store sync failed: {:#}", e),
        }

        let all_points: Vec<VectorPoint> = articles
            .iter()
            .filter_map(|i| i.vector_points.clone())
            .flatten()
            .collect();
        if all_points.is_empty() {
            outcome.vector_store_ok = true;
        } else {
            match self.vector_store.upsert_points(&all_points).await {
                Ok(()) => outcome.vector_store_ok = true,
                Err(e) => warn!("vector store upsert failed: {:#}", e),
            }
        }

        outcome
    }

    /// §4.3 `add_search_id` — grows `search_id` across all three stores for
    /// the given article ids.
    pub async fn add_search_id(&self, article_ids: &[String], search_id: &str) -> Result<()> {
        if let Err(e) = self.document_store.add_search_id(article_ids, search_id).await {
            warn!("document store add_search_id failed: {:#}", e);
        }
        if let Err(e) = self.vector_store.add_search_id(article_ids, search_id).await {
            warn!("vector store add_search_id failed: {:#}", e);
        }
        // Meilisearch documents carry search_id as part of the full article
        // record with no partial-field update primitive in this stack, so
        // the self-heal reads the now-updated articles back from the
        // document store and re-pushes the full documents.
        match self.document_store.find_by_article_ids(article_ids).await {
            Ok(articles) => {
                if let Err(e) = self.lexical_store.add_documents(&articles).await {
                    warn!("lexical store add_search_id resync failed: {:#}", e);
                }
            }
            Err(e) => warn!("add_search_id: failed to read back articles for lexical resync: {:#}", e),
        }
        Ok(())
    }

    /// Deletes the given articles from every store (used by retention, §P7).
    pub async fn delete_by_article_ids(&self, article_ids: &[String]) -> Result<()> {
        if article_ids.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.document_store.delete_by_article_ids(article_ids).await {
            warn!("document store delete failed during retention sweep: {:#}", e);
        }
        if let Err(e) = self.lexical_store.delete_documents(article_ids).await {
            warn!("lexical store delete failed during retention sweep: {:#}", e);
        }
        if let Err(e) = self.vector_store.delete_by_article_ids(article_ids).await {
            warn!("vector store delete failed during retention sweep: {:#}", e);
        }
        Ok(())
    }
}
