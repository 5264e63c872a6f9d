//! Topic scheduler (§4.8) — periodically re-scans registered category pages
//! with a per-topic watermark, stopping a topic early once it observes a
//! listed article it has already ingested via this lane. Grounded on
//! `original_source/crawler/services/scheduler_service.py::process_single_topic`
//! + `execute_topic_crawl` (cutoff arithmetic, per decision #5) and
//! `crawl::executor`'s sequential-page / concurrent-detail pattern, reused
//! here at the single-topic granularity instead of per-site.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::{Notify, Semaphore};
use tracing::{info, warn};

use crate::adapters::{ArticleLink, DraftArticle, SiteRegistry};
use crate::core::error::{AppError, AppResult};
use crate::crawl::executor::{build_article, AUTO_TOPIC_KEYWORD};
use crate::core::types::Topic;
use crate::stores::document_store::DocumentStore;
use crate::stores::fanout::{FanoutArticle, StoreFanout};

/// §4.8: "up to 50 pages" — same cap as the crawl executor's per-site limit.
const MAX_PAGES_PER_TOPIC: usize = 50;
/// §4.8: pause between category pages.
const INTER_PAGE_DELAY: Duration = Duration::from_secs(1);
/// §4.8/§7: cadence floor; a reschedule below this is rejected.
const MIN_CADENCE_MINUTES: i64 = 5;
/// §4.8: fallback lookback when a topic has never been crawled.
const DEFAULT_LOOKBACK_DAYS: i64 = 60;
/// §4.8: the margin subtracted from `last_crawled_at` to tolerate listing-page
/// time drift (grounded in the source's concrete `-1 day` constant).
const LAST_CRAWLED_MARGIN_DAYS: i64 = 1;

/// Pure validation shared by [`TopicScheduler::reschedule`] and the HTTP
/// handler so the rejection path is testable without a live scheduler.
pub fn validate_cadence(minutes: i64) -> AppResult<()> {
    if minutes < MIN_CADENCE_MINUTES {
        return Err(AppError::BadInput(format!(
            "schedule cadence must be >= {MIN_CADENCE_MINUTES} minutes, got {minutes}"
        )));
    }
    Ok(())
}

pub struct TopicScheduler {
    http_client: reqwest::Client,
    site_registry: Arc<SiteRegistry>,
    document_store: Arc<DocumentStore>,
    fanout: Arc<StoreFanout>,
    /// Process-wide detail-fetch cap (§5), shared with the crawl executor.
    detail_fetch_limit: Arc<Semaphore>,
    /// Per-tick cap on topics run concurrently (§4.8: default 5).
    topic_concurrency_limit: usize,
    /// Current cadence in minutes; mutated by [`Self::reschedule`].
    tick_minutes: AtomicI64,
    reschedule_notify: Notify,
}

impl TopicScheduler {
    pub fn new(
        http_client: reqwest::Client,
        site_registry: Arc<SiteRegistry>,
        document_store: Arc<DocumentStore>,
        fanout: Arc<StoreFanout>,
        detail_fetch_limit: Arc<Semaphore>,
        topic_concurrency_limit: usize,
    ) -> Self {
        Self {
            http_client,
            site_registry,
            document_store,
            fanout,
            detail_fetch_limit,
            topic_concurrency_limit,
            tick_minutes: AtomicI64::new(120),
            reschedule_notify: Notify::new(),
        }
    }

    pub fn with_initial_cadence(mut self, minutes: i64) -> Self {
        self.tick_minutes = AtomicI64::new(minutes.max(MIN_CADENCE_MINUTES));
        self
    }

    /// §6 `POST /admin/schedule` — rejects a cadence below the 5-minute floor
    /// (§7 "Scheduler misconfiguration") instead of silently clamping it.
    pub fn reschedule(&self, minutes: i64) -> AppResult<()> {
        validate_cadence(minutes)?;
        self.tick_minutes.store(minutes, Ordering::SeqCst);
        self.reschedule_notify.notify_waiters();
        info!("topic scheduler: rescheduled to every {} minutes", minutes);
        Ok(())
    }

    pub fn current_cadence_minutes(&self) -> i64 {
        self.tick_minutes.load(Ordering::SeqCst)
    }

    /// Runs the scheduler loop until the process exits. A reschedule wakes the
    /// sleeping loop immediately rather than waiting out the old interval.
    pub async fn run_forever(self: Arc<Self>) {
        loop {
            let wait = Duration::from_secs((self.current_cadence_minutes().max(1) as u64) * 60);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.reschedule_notify.notified() => continue,
            }
            if let Err(e) = self.run_once(None, None).await {
                warn!("topic scheduler tick failed: {:#}", e);
            }
        }
    }

    /// §6 `POST /admin/auto-crawl/{website}` and the periodic tick both funnel
    /// through here. `force_days_back` overrides the cutoff computation
    /// (§4.8); `website_filter` narrows which topics run this tick.
    pub async fn run_once(&self, website_filter: Option<&str>, force_days_back: Option<i64>) -> AppResult<()> {
        let topics = self
            .document_store
            .list_active_topics(website_filter)
            .await
            .map_err(|e| AppError::Store { store: "document_store", source: e })?;

        if topics.is_empty() {
            return Ok(());
        }
        info!("topic scheduler: running {} active topics", topics.len());

        let limit = self.topic_concurrency_limit.max(1);
        stream::iter(topics)
            .map(|topic| async move {
                if let Err(e) = self.process_topic(&topic, force_days_back).await {
                    warn!("topic scheduler: topic '{}' failed: {:#}", topic.url, e);
                }
            })
            .buffer_unordered(limit)
            .collect::<Vec<()>>()
            .await;

        Ok(())
    }

    fn compute_cutoff(topic: &Topic, force_days_back: Option<i64>, now: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(days) = force_days_back {
            return now - ChronoDuration::days(days);
        }
        if let Some(last) = topic.last_crawled_at {
            let margin_adjusted = last - ChronoDuration::days(LAST_CRAWLED_MARGIN_DAYS);
            let floor = now - ChronoDuration::days(DEFAULT_LOOKBACK_DAYS);
            return margin_adjusted.max(floor);
        }
        now - ChronoDuration::days(DEFAULT_LOOKBACK_DAYS)
    }

    async fn process_topic(&self, topic: &Topic, force_days_back: Option<i64>) -> AppResult<()> {
        let Some(adapter) = self.site_registry.get(&topic.website) else {
            return Err(AppError::BadInput(format!("no adapter registered for website '{}'", topic.website)));
        };

        let now = Utc::now();
        let cutoff = Self::compute_cutoff(topic, force_days_back, now);
        let mut page = 1usize;
        let mut stop_topic = false;

        while page <= MAX_PAGES_PER_TOPIC && !stop_topic {
            let links = adapter
                .fetch_category_page(&self.http_client, &topic.url, page)
                .await
                .map_err(AppError::Upstream)?;
            if links.is_empty() {
                break;
            }

            let mut to_fetch: Vec<ArticleLink> = Vec::new();
            for link in links {
                let already_seen = self
                    .document_store
                    .url_has_search_id(&link.url, "system_auto")
                    .await
                    .unwrap_or(false);

                if let Some(published) = link.publish_date {
                    if published < cutoff && already_seen {
                        stop_topic = true;
                        break;
                    }
                }
                if already_seen {
                    continue;
                }
                to_fetch.push(link);
            }

            if !to_fetch.is_empty() {
                let drafts = self.fetch_details(adapter.as_ref(), to_fetch).await;
                let articles: Vec<FanoutArticle> = drafts
                    .into_iter()
                    .map(|draft| {
                        let article = build_article(draft, Some(AUTO_TOPIC_KEYWORD), "system", "system_auto");
                        FanoutArticle { article, vector_points: None }
                    })
                    .collect();
                if !articles.is_empty() {
                    self.fanout.upsert_articles(&articles).await;
                }
            }

            if stop_topic {
                break;
            }
            page += 1;
            tokio::time::sleep(INTER_PAGE_DELAY).await;
        }

        self.document_store
            .set_topic_last_crawled(&topic.url, now)
            .await
            .map_err(|e| AppError::Store { store: "document_store", source: e })?;
        Ok(())
    }

    async fn fetch_details(&self, adapter: &dyn crate::adapters::SiteAdapter, links: Vec<ArticleLink>) -> Vec<DraftArticle> {
        let client = &self.http_client;
        let limit = &self.detail_fetch_limit;
        stream::iter(links)
            .map(|link| async move {
                let _permit = limit.acquire().await.ok()?;
                match adapter.crawl_detail(client, &link, None).await {
                    Ok(Some(draft)) => Some(draft),
                    Ok(None) => None,
                    Err(e) => {
                        warn!("topic scheduler: detail fetch failed for {}: {:#}", link.url, e);
                        None
                    }
                }
            })
            .buffer_unordered(DETAIL_FETCH_STREAM_WIDTH)
            .filter_map(|r| async move { r })
            .collect()
            .await
    }
}

/// How many detail-fetch futures this stream polls concurrently before the
/// shared semaphore (`detail_fetch_limit`) actually throttles admission; not
/// itself a concurrency cap, just the stream's internal buffer width.
const DETAIL_FETCH_STREAM_WIDTH: usize = 20;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn topic_at(last_crawled: Option<DateTime<Utc>>) -> Topic {
        Topic {
            url: "https://example.com/kinh-te".into(),
            name: "Kinh te".into(),
            website: "example".into(),
            is_active: true,
            last_crawled_at: last_crawled,
        }
    }

    #[test]
    fn cutoff_uses_force_days_back_when_given() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let topic = topic_at(None);
        let cutoff = TopicScheduler::compute_cutoff(&topic, Some(10), now);
        assert_eq!(cutoff, now - ChronoDuration::days(10));
    }

    #[test]
    fn cutoff_defaults_to_sixty_days_with_no_history() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let topic = topic_at(None);
        let cutoff = TopicScheduler::compute_cutoff(&topic, None, now);
        assert_eq!(cutoff, now - ChronoDuration::days(60));
    }

    #[test]
    fn cutoff_uses_recent_last_crawled_minus_margin() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let last = now - ChronoDuration::days(2);
        let topic = topic_at(Some(last));
        let cutoff = TopicScheduler::compute_cutoff(&topic, None, now);
        assert_eq!(cutoff, last - ChronoDuration::days(1));
    }

    #[test]
    fn cutoff_clamps_to_sixty_day_floor_for_stale_topic() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let last = now - ChronoDuration::days(200);
        let topic = topic_at(Some(last));
        let cutoff = TopicScheduler::compute_cutoff(&topic, None, now);
        assert_eq!(cutoff, now - ChronoDuration::days(60));
    }

    #[test]
    fn reschedule_rejects_below_minimum_cadence() {
        let err = validate_cadence(4).unwrap_err();
        assert!(matches!(err, AppError::BadInput(_)));
    }

    #[test]
    fn reschedule_accepts_exactly_the_minimum() {
        assert!(validate_cadence(5).is_ok());
    }
}
