use std::env;
use std::sync::Arc;

use tin_loom::adapters::{GenericHtmlAdapter, SiteRegistry};
use tin_loom::core::app_state::AppState;
use tin_loom::core::config;
use tin_loom::core::sites_config;
use tin_loom::providers::embedding::EMBEDDING_DIM;
use tin_loom::providers::{EmbeddingProvider, SentimentProvider};
use tin_loom::pipeline::EnrichmentWorker;
use tin_loom::scheduler::topic::TopicScheduler;
use tin_loom::stores::{DocumentStore, LexicalStore, VectorStore};
use tracing::{error, info, warn};

fn parse_port_from_args() -> Option<u16> {
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == "--port" {
            if let Some(v) = args.next() {
                if let Ok(p) = v.parse::<u16>() {
                    return Some(p);
                }
            }
        } else if let Some(rest) = a.strip_prefix("--port=") {
            if let Ok(p) = rest.parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

fn port_from_env() -> Option<u16> {
    for k in ["TIN_LOOM_PORT", "PORT"] {
        if let Ok(v) = std::env::var(k) {
            if let Ok(p) = v.trim().parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("Starting tin-loom server");

    let config = Arc::new(config::load_config());

    let http_timeout = env::var("HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or_else(|| config.resolve_request_timeout_secs());
    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(http_timeout))
        .pool_max_idle_per_host(config.resolve_max_connections_per_site())
        .user_agent("Mozilla/5.0 (compatible; tin-loom/1.0; +https://github.com/tin-loom/tin-loom)")
        .build()?;

    let document_store = Arc::new(
        DocumentStore::connect(&config.resolve_mongo_uri())
            .await
            .map_err(|e| {
                error!("failed to connect to MongoDB: {:#}", e);
                e
            })?,
    );

    let lexical_store = Arc::new(
        LexicalStore::connect(&config.resolve_meilisearch_url(), config.resolve_meilisearch_key().as_deref())
            .map_err(|e| {
                error!("failed to build Meilisearch client: {:#}", e);
                e
            })?,
    );
    if let Err(e) = lexical_store.ensure_attributes().await {
        warn!("meilisearch: failed to apply index attribute configuration at startup: {:#}", e);
    }

    let vector_store = Arc::new(
        VectorStore::connect(&config.resolve_vector_store_uri(), EMBEDDING_DIM)
            .await
            .map_err(|e| {
                error!("failed to open LanceDB vector store: {:#}", e);
                e
            })?,
    );

    let embedding = Arc::new(EmbeddingProvider::new(config.resolve_embedding_model_name()));
    if let Err(e) = embedding.warm().await {
        warn!("embedding: failed to warm model at startup, will retry lazily on first use: {:#}", e);
    }
    let sentiment = Arc::new(SentimentProvider::new());

    let mut site_registry = SiteRegistry::new();
    for profile in sites_config::load_site_profiles() {
        let website = profile.website.clone();
        site_registry.register(Arc::new(
            GenericHtmlAdapter::new(profile).with_retry_count(config.resolve_retry_count()),
        ));
        info!("registered site adapter for '{}'", website);
    }
    let site_registry = Arc::new(site_registry);

    let state = Arc::new(AppState::new(
        http_client,
        config.clone(),
        document_store.clone(),
        lexical_store.clone(),
        vector_store.clone(),
        embedding.clone(),
        sentiment.clone(),
        site_registry,
    ));

    let enrichment_worker = Arc::new(EnrichmentWorker::new(
        document_store.clone(),
        state.fanout.clone(),
        embedding.clone(),
        sentiment.clone(),
        &config,
    ));
    tokio::spawn(enrichment_worker.run_forever());

    let topic_scheduler = state.topic_scheduler.clone();
    tokio::spawn(topic_scheduler.run_forever());

    let app = tin_loom::http::router(state.clone());

    let port: u16 = parse_port_from_args()
        .or_else(port_from_env)
        .unwrap_or(5000);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set PORT/TIN_LOOM_PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("tin-loom listening on http://{}", bind_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();
        let mut sigint = signal(SignalKind::interrupt()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
            _ = async {
                if let Some(ref mut s) = sigint {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received, draining in-flight requests");
}
