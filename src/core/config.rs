use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Config — file-based config loader (tin-loom.json) with env-var fallback.
// Precedence per field: JSON file value -> environment variable -> safe
// local-development default. No default below ever embeds a real credential;
// an absent credential just means the corresponding store stays disconnected
// and the owning subsystem degrades (logged, non-fatal) at startup.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub mongo_uri: Option<String>,
    pub meilisearch_url: Option<String>,
    pub meilisearch_key: Option<String>,
    pub vector_store_uri: Option<String>,
    pub embedding_model_name: Option<String>,
    pub chunk_size_chars: Option<usize>,
    pub chunk_min_chars: Option<usize>,
    pub max_concurrent_requests: Option<usize>,
    pub max_connections_per_site: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub retry_count: Option<u32>,
    pub history_limit: Option<usize>,
    pub auto_crawl_months: Option<i64>,
    pub topic_concurrency_limit: Option<usize>,
    pub enrichment_batch_size: Option<usize>,
    pub enrichment_tick_secs: Option<u64>,
    pub topic_scheduler_tick_mins: Option<i64>,
}

impl Config {
    pub fn resolve_mongo_uri(&self) -> String {
        self.mongo_uri
            .clone()
            .or_else(|| std::env::var("MONGO_URI").ok())
            .unwrap_or_else(|| "mongodb://localhost:27017".to_string())
    }

    pub fn resolve_meilisearch_url(&self) -> String {
        self.meilisearch_url
            .clone()
            .or_else(|| std::env::var("MEILISEARCH_URL").ok())
            .unwrap_or_else(|| "http://localhost:7700".to_string())
    }

    /// `None` when no key is configured — Meilisearch running without auth is a
    /// legitimate local-dev setup, so this is not defaulted to a placeholder string.
    pub fn resolve_meilisearch_key(&self) -> Option<String> {
        self.meilisearch_key
            .clone()
            .or_else(|| std::env::var("MEILISEARCH_KEY").ok())
            .filter(|s| !s.is_empty())
    }

    pub fn resolve_vector_store_uri(&self) -> String {
        if let Ok(disabled) = std::env::var("VECTOR_STORE_DISABLED") {
            if disabled == "1" || disabled.eq_ignore_ascii_case("true") {
                return String::new();
            }
        }
        self.vector_store_uri
            .clone()
            .or_else(|| std::env::var("VECTOR_STORE_URI").ok())
            .unwrap_or_else(|| {
                dirs_home_fallback_path(".tin-loom/vectors.lance")
            })
    }

    pub fn resolve_embedding_model_name(&self) -> String {
        self.embedding_model_name
            .clone()
            .or_else(|| std::env::var("EMBEDDING_MODEL_NAME").ok())
            .unwrap_or_else(|| "minishlab/potion-multilingual-128M".to_string())
    }

    pub fn resolve_chunk_size_chars(&self) -> usize {
        self.chunk_size_chars
            .or_else(|| std::env::var("CHUNK_SIZE_CHARS").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(1000)
    }

    pub fn resolve_chunk_min_chars(&self) -> usize {
        self.chunk_min_chars
            .or_else(|| std::env::var("CHUNK_MIN_CHARS").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(50)
    }

    pub fn resolve_max_concurrent_requests(&self) -> usize {
        self.max_concurrent_requests
            .or_else(|| std::env::var("MAX_CONCURRENT_REQUESTS").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(20)
    }

    pub fn resolve_max_connections_per_site(&self) -> usize {
        self.max_connections_per_site
            .or_else(|| std::env::var("MAX_CONNECTIONS_PER_SITE").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(5)
    }

    pub fn resolve_request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
            .or_else(|| std::env::var("REQUEST_TIMEOUT").ok().and_then(|v| v.parse::<f64>().ok()).map(|f| f as u64))
            .unwrap_or(15)
    }

    pub fn resolve_retry_count(&self) -> u32 {
        self.retry_count
            .or_else(|| std::env::var("RETRY_COUNT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(3)
    }

    pub fn resolve_history_limit(&self) -> usize {
        self.history_limit
            .or_else(|| std::env::var("HISTORY_LIMIT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(10)
    }

    pub fn resolve_auto_crawl_months(&self) -> i64 {
        self.auto_crawl_months
            .or_else(|| std::env::var("AUTO_CRAWL_MONTHS").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(6)
    }

    pub fn resolve_topic_concurrency_limit(&self) -> usize {
        self.topic_concurrency_limit
            .or_else(|| std::env::var("TOPIC_CONCURRENCY_LIMIT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(5)
    }

    pub fn resolve_enrichment_batch_size(&self) -> usize {
        self.enrichment_batch_size
            .or_else(|| std::env::var("ENRICHMENT_BATCH_SIZE").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(20)
    }

    pub fn resolve_enrichment_tick_secs(&self) -> u64 {
        self.enrichment_tick_secs
            .or_else(|| std::env::var("ENRICHMENT_TICK_SECS").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(30)
    }

    pub fn resolve_topic_scheduler_tick_mins(&self) -> i64 {
        self.topic_scheduler_tick_mins
            .or_else(|| std::env::var("TOPIC_SCHEDULER_TICK_MINS").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(120)
    }
}

fn dirs_home_fallback_path(rel: &str) -> String {
    dirs::home_dir()
        .map(|h| h.join(rel))
        .and_then(|p| p.to_str().map(|s| s.to_string()))
        .unwrap_or_else(|| format!("./{}", rel))
}

/// Load config from the first candidate path that exists, falling back to
/// environment-only resolution when none is found or the file fails to parse.
pub fn load_config() -> Config {
    let candidates: Vec<PathBuf> = vec![
        std::env::var("TIN_LOOM_CONFIG").ok().map(PathBuf::from),
        Some(PathBuf::from("tin-loom.json")),
        dirs::home_dir().map(|h| h.join(".tin-loom/config.json")),
    ]
    .into_iter()
    .flatten()
    .collect();

    for path in candidates {
        if let Some(cfg) = try_load_from(&path) {
            return cfg;
        }
    }

    info!("config: no tin-loom.json found — resolving entirely from environment/defaults");
    Config::default()
}

fn try_load_from(path: &Path) -> Option<Config> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<Config>(&raw) {
            Ok(cfg) => {
                info!("config: loaded {}", path.display());
                Some(cfg)
            }
            Err(e) => {
                warn!("config: failed to parse {}: {} — falling back to defaults", path.display(), e);
                Some(Config::default())
            }
        },
        Err(e) => {
            warn!("config: failed to read {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_never_embed_a_placeholder_credential_string() {
        let cfg = Config::default();
        assert_eq!(cfg.resolve_mongo_uri(), "mongodb://localhost:27017");
        assert_eq!(cfg.resolve_meilisearch_url(), "http://localhost:7700");
        assert!(cfg.resolve_meilisearch_key().is_none());
    }

    #[test]
    fn json_value_takes_precedence_over_default() {
        let cfg = Config {
            chunk_size_chars: Some(500),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_chunk_size_chars(), 500);
    }
}
