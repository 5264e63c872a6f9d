use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::adapters::SiteRegistry;
use crate::core::config::Config;
use crate::crawl::executor::CrawlExecutor;
use crate::providers::{EmbeddingProvider, SentimentProvider};
use crate::scheduler::topic::TopicScheduler;
use crate::search::HybridSearchOrchestrator;
use crate::stores::{DocumentStore, LexicalStore, StoreFanout, VectorStore};

/// Process-wide shared state, handed to every axum handler and background
/// task as an `Arc<AppState>`. Mirrors the teacher's `AppState` shape: plain
/// fields for always-present subsystems, `Arc` for anything cloned into a
/// spawned task, and a manual `Debug` impl that never prints a credential.
pub struct AppState {
    pub http_client: reqwest::Client,
    pub config: Arc<Config>,

    pub document_store: Arc<DocumentStore>,
    pub lexical_store: Arc<LexicalStore>,
    pub vector_store: Arc<VectorStore>,
    pub fanout: Arc<StoreFanout>,

    pub embedding: Arc<EmbeddingProvider>,
    pub sentiment: Arc<SentimentProvider>,

    pub site_registry: Arc<SiteRegistry>,
    pub crawl_executor: Arc<CrawlExecutor>,
    pub topic_scheduler: Arc<TopicScheduler>,
    pub search_orchestrator: Arc<HybridSearchOrchestrator>,

    /// Process-wide cap on in-flight detail fetches (§5: default 20), shared
    /// by the crawl executor and the topic scheduler's detail fetches.
    pub detail_fetch_limit: Arc<Semaphore>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("mongo_uri_configured", &!self.config.resolve_mongo_uri().is_empty())
            .field("meilisearch_url", &self.config.resolve_meilisearch_url())
            .field("detail_fetch_permits", &self.detail_fetch_limit.available_permits())
            .finish()
    }
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        http_client: reqwest::Client,
        config: Arc<Config>,
        document_store: Arc<DocumentStore>,
        lexical_store: Arc<LexicalStore>,
        vector_store: Arc<VectorStore>,
        embedding: Arc<EmbeddingProvider>,
        sentiment: Arc<SentimentProvider>,
        site_registry: Arc<SiteRegistry>,
    ) -> Self {
        let fanout = Arc::new(StoreFanout::new(
            document_store.clone(),
            lexical_store.clone(),
            vector_store.clone(),
        ));

        let detail_fetch_limit = Arc::new(Semaphore::new(config.resolve_max_concurrent_requests()));

        let crawl_executor = Arc::new(CrawlExecutor::new(
            http_client.clone(),
            site_registry.clone(),
            fanout.clone(),
            detail_fetch_limit.clone(),
            config.clone(),
        ));

        let topic_scheduler = Arc::new(
            TopicScheduler::new(
                http_client.clone(),
                site_registry.clone(),
                document_store.clone(),
                fanout.clone(),
                detail_fetch_limit.clone(),
                config.resolve_topic_concurrency_limit(),
            )
            .with_initial_cadence(config.resolve_topic_scheduler_tick_mins()),
        );

        let search_orchestrator = Arc::new(HybridSearchOrchestrator::new(
            document_store.clone(),
            lexical_store.clone(),
            vector_store.clone(),
            fanout.clone(),
            crawl_executor.clone(),
            embedding.clone(),
            config.clone(),
        ));

        Self {
            http_client,
            config,
            document_store,
            lexical_store,
            vector_store,
            fanout,
            embedding,
            sentiment,
            site_registry,
            crawl_executor,
            topic_scheduler,
            search_orchestrator,
            detail_fetch_limit,
        }
    }
}
