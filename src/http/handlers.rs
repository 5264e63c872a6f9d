//! HTTP handlers (§6) — thin translation layer: extract, delegate to the
//! orchestrator/stores/scheduler, wrap the result in `Json`. Grounded on the
//! teacher's `main.rs` handler conventions (`State<Arc<AppState>>`,
//! `Result<Json<T>, AppError>` return types, `tokio::spawn` for fire-and-forget
//! background kick-offs).

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::app_state::AppState;
use crate::core::error::{AppError, AppResult};
use crate::core::types::{
    AcceptedResponse, CrawlRequest, CrawlResponse, InitTopicsResponse, PagedArticles, RetrieveContextRequest,
    RetrieveContextResponse, ScheduleRequest, SearchSession, StatusResponse, Topic,
};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn start_crawl(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CrawlRequest>,
) -> AppResult<Json<CrawlResponse>> {
    let response = state.search_orchestrator.start_search(req).await?;
    Ok(Json(response))
}

pub async fn stream_status(
    State(state): State<Arc<AppState>>,
    Path(search_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    crate::stream::subscribe(state.document_store.clone(), search_id)
}

pub async fn poll_status(
    State(state): State<Arc<AppState>>,
    Path(search_id): Path<String>,
) -> AppResult<Json<StatusResponse>> {
    let snapshot = crate::stream::poll_once(&state.document_store, &search_id).await?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: String,
}

/// §6 "Newest 10 sessions" — the cap is part of the contract, not a config knob.
const HISTORY_LIST_LIMIT: i64 = 10;

pub async fn list_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<SearchSession>>> {
    let sessions = state
        .document_store
        .list_sessions_for_user(&query.user_id, HISTORY_LIST_LIMIT)
        .await
        .map_err(|e| AppError::Store { store: "document_store", source: e })?;
    Ok(Json(sessions))
}

#[derive(Debug, Deserialize)]
pub struct ArticlesQuery {
    pub user_id: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}
fn default_page_size() -> usize {
    10
}

pub async fn paged_articles(
    State(state): State<Arc<AppState>>,
    Path(search_id): Path<String>,
    Query(query): Query<ArticlesQuery>,
) -> AppResult<Json<PagedArticles>> {
    if let Some(user_id) = &query.user_id {
        let session = state
            .document_store
            .get_search_session(&search_id)
            .await
            .map_err(|e| AppError::Store { store: "document_store", source: e })?
            .ok_or_else(|| AppError::NotFound(format!("no search session for search_id '{search_id}'")))?;
        if &session.user_id != user_id {
            return Err(AppError::NotFound(format!("no search session for search_id '{search_id}'")));
        }
    }
    let result = state
        .search_orchestrator
        .paged_articles(&search_id, query.page, query.page_size)
        .await?;
    Ok(Json(result))
}

pub async fn retrieve_context(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RetrieveContextRequest>,
) -> AppResult<Json<RetrieveContextResponse>> {
    let response = state.search_orchestrator.retrieve_context(req).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct WebsiteQuery {
    pub website: String,
}

pub async fn init_topics_from_html(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebsiteQuery>,
) -> AppResult<Json<InitTopicsResponse>> {
    let adapter = state
        .site_registry
        .get(&query.website)
        .ok_or_else(|| AppError::BadInput(format!("unknown website '{}'", query.website)))?;

    let candidates = adapter
        .discover_topics(&state.http_client)
        .await
        .map_err(AppError::Upstream)?;

    let mut topics = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let topic = Topic {
            url: candidate.url,
            name: candidate.name,
            website: query.website.clone(),
            is_active: true,
            last_crawled_at: None,
        };
        state
            .document_store
            .upsert_topic(&topic)
            .await
            .map_err(|e| AppError::Store { store: "document_store", source: e })?;
        topics.push(topic);
    }

    let website = query.website.clone();
    let scheduler = state.topic_scheduler.clone();
    tokio::spawn(async move {
        if let Err(e) = scheduler.run_once(Some(&website), None).await {
            warn!("topic crawl kick-off for {} failed: {:#}", website, e);
        }
    });

    Ok(Json(InitTopicsResponse {
        website: query.website,
        topics_discovered: topics.len(),
        topics,
    }))
}

pub async fn trigger_auto_crawl(
    State(state): State<Arc<AppState>>,
    Path(website): Path<String>,
) -> AppResult<Json<AcceptedResponse>> {
    if state.site_registry.get(&website).is_none() {
        return Err(AppError::BadInput(format!("unknown website '{website}'")));
    }
    let scheduler = state.topic_scheduler.clone();
    let target = website.clone();
    // An admin-triggered auto-crawl forces a deeper lookback than the routine
    // scheduler tick's §4.8 cutoff, sized by the configured `AUTO_CRAWL_MONTHS`.
    let force_days_back = state.config.resolve_auto_crawl_months() * 30;
    tokio::spawn(async move {
        if let Err(e) = scheduler.run_once(Some(&target), Some(force_days_back)).await {
            warn!("admin auto-crawl for {} failed: {:#}", target, e);
        }
    });
    Ok(Json(AcceptedResponse {
        status: "accepted",
        message: format!("auto-crawl triggered for {website}"),
    }))
}

pub async fn reschedule(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScheduleRequest>,
) -> AppResult<Json<AcceptedResponse>> {
    state.topic_scheduler.reschedule(req.minutes)?;
    Ok(Json(AcceptedResponse {
        status: "ok",
        message: format!("cadence set to {} minutes", req.minutes),
    }))
}
