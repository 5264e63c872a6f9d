//! Progress stream + status store (§4.9) — a pull-driven SSE loop over the
//! SearchSession record, debounced on unchanged snapshots. Grounded on
//! `original_source/crawler/services/status_service.py`'s polling
//! `subscribe`/`get_status` pair (2s tick, compare-and-emit-on-change,
//! terminal `end` event on `completed`), translated into a `futures::stream`
//! built with `stream::unfold` rather than a generator, since nothing else in
//! this codebase pulls in an `async-stream`-style macro crate.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::Utc;
use futures::stream::{self, Stream};
use tracing::warn;

use crate::core::error::{AppError, AppResult};
use crate::core::types::{ProgressEndEvent, ProgressEvent, SearchSessionStatus, StatusResponse};
use crate::stores::document_store::DocumentStore;

/// §4.9: "poll once every ~2s".
const POLL_INTERVAL: Duration = Duration::from_secs(2);

fn status_str(status: SearchSessionStatus) -> &'static str {
    match status {
        SearchSessionStatus::Processing => "processing",
        SearchSessionStatus::Completed => "completed",
    }
}

/// §6 `GET /crawl/status/{search_id}` — the legacy non-streaming snapshot.
pub async fn poll_once(document_store: &DocumentStore, search_id: &str) -> AppResult<StatusResponse> {
    let session = document_store
        .get_search_session(search_id)
        .await
        .map_err(|e| AppError::Store { store: "document_store", source: e })?
        .ok_or_else(|| AppError::NotFound(format!("no search session for search_id '{search_id}'")))?;

    let total_saved = document_store
        .count_by_search_id(search_id)
        .await
        .map(|n| n as usize)
        .unwrap_or(session.total_saved);

    Ok(StatusResponse {
        search_id: session.search_id,
        status: status_str(session.status).to_string(),
        total_saved,
        updated_at: session.updated_at,
    })
}

struct SubscriptionState {
    document_store: Arc<DocumentStore>,
    search_id: String,
    last: Option<(SearchSessionStatus, usize)>,
    first_tick: bool,
    ended: bool,
}

/// §6 `GET /crawl/stream-status/{search_id}` — each yielded `Event` is either
/// an `update` or the terminal `end`; the stream ends right after `end`, or
/// silently if the session disappears (e.g. swept by retention mid-stream).
pub fn subscribe(document_store: Arc<DocumentStore>, search_id: String) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let state = SubscriptionState {
        document_store,
        search_id,
        last: None,
        first_tick: true,
        ended: false,
    };

    let events = stream::unfold(state, |mut st| async move {
        loop {
            if st.ended {
                return None;
            }
            if !st.first_tick {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            st.first_tick = false;

            let session = match st.document_store.get_search_session(&st.search_id).await {
                Ok(Some(session)) => session,
                Ok(None) => {
                    st.ended = true;
                    continue;
                }
                Err(e) => {
                    warn!("progress stream: failed to read session {}: {:#}", st.search_id, e);
                    continue;
                }
            };
            let total_saved = st
                .document_store
                .count_by_search_id(&st.search_id)
                .await
                .map(|n| n as usize)
                .unwrap_or(session.total_saved);

            let snapshot = (session.status, total_saved);
            if st.last == Some(snapshot) {
                continue;
            }
            st.last = Some(snapshot);

            if session.status == SearchSessionStatus::Completed {
                st.ended = true;
                let payload = ProgressEndEvent {
                    search_id: st.search_id.clone(),
                    final_count: total_saved,
                };
                return match Event::default().event("end").json_data(&payload) {
                    Ok(ev) => Some((Ok(ev), st)),
                    Err(e) => {
                        warn!("progress stream: failed to serialize end event: {:#}", e);
                        None
                    }
                };
            }

            let payload = ProgressEvent {
                search_id: st.search_id.clone(),
                status: status_str(session.status).to_string(),
                total_saved,
                timestamp: Utc::now(),
            };
            match Event::default().event("update").json_data(&payload) {
                Ok(ev) => return Some((Ok(ev), st)),
                Err(e) => {
                    warn!("progress stream: failed to serialize update event: {:#}", e);
                    continue;
                }
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
