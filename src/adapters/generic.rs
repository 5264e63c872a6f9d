//! Generic, configuration-driven HTML adapter (§4.1 Non-goals: "HTML parsing
//! details per publisher" are explicitly out of scope). Rather than port the
//! source system's bespoke per-outlet scrapers (e.g.
//! `original_source/crawler/crawlers/vnexpress_crawler.py`'s hardcoded CSS
//! selectors and tag-extraction fallbacks), this adapter is driven entirely
//! by a [`SiteProfile`] of selectors supplied at registration time, and falls
//! back to readability + html2md extraction (same pipeline as
//! `scraping/rust_scraper/clean.rs`) when the profile's content selectors
//! come up empty. Language sanity-checking via `whatlang::detect` mirrors
//! `scraping/rust_scraper/metadata.rs::detect_language`.

use anyhow::{anyhow, Context, Result};
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::adapters::site_adapter::{matches_content_filter, ArticleLink, DraftArticle, SiteAdapter, TopicCandidate};

/// Selector/template configuration for one host. All selector fields are
/// plain CSS selector strings, parsed fresh on every call — these pages are
/// fetched at most a few dozen times a minute, so the reparse cost is not
/// worth caching against the complexity of a compiled-selector cache.
///
/// Deserializable so a deployment can hand a list of these in as JSON
/// (`core::sites_config`) instead of a site's selectors being hardcoded
/// anywhere in this crate.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteProfile {
    pub website: String,
    /// `{keyword}`/`{page}`/`{start_ts}`/`{end_ts}` placeholders, substituted
    /// before the request. `None` means this site has no on-demand search
    /// endpoint wired up — only its category/topic pages are crawlable.
    #[serde(default)]
    pub search_url_template: Option<String>,
    pub listing_item_selector: String,
    pub listing_link_selector: String,
    /// Attribute on the link (or an ancestor matched by this same selector)
    /// holding a parseable publish date, if the listing page exposes one.
    #[serde(default)]
    pub listing_date_attr: Option<String>,
    pub detail_title_selector: String,
    /// Tried in order; the first selector yielding non-trivial text wins.
    pub detail_content_selectors: Vec<String>,
    #[serde(default)]
    pub detail_summary_selector: Option<String>,
    #[serde(default)]
    pub detail_category_selector: Option<String>,
    #[serde(default)]
    pub detail_tag_selector: Option<String>,
    /// Navigation/menu page to scan for category links. `None` means this
    /// site has no `/topics/init-from-html` support.
    #[serde(default)]
    pub nav_page_url: Option<String>,
    #[serde(default)]
    pub nav_link_selector: Option<String>,
}

pub struct GenericHtmlAdapter {
    profile: SiteProfile,
    /// §5/§7 `RETRY_COUNT`-style knob: how many backoff attempts `fetch_html`
    /// allows before giving up, expressed as an elapsed-time bound.
    retry_count: u32,
}

impl GenericHtmlAdapter {
    pub fn new(profile: SiteProfile) -> Self {
        Self { profile, retry_count: DEFAULT_RETRY_COUNT }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

#[async_trait::async_trait]
impl SiteAdapter for GenericHtmlAdapter {
    fn website(&self) -> &str {
        &self.profile.website
    }

    async fn fetch_search_page(
        &self,
        client: &Client,
        keyword: &str,
        page: usize,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Vec<ArticleLink>> {
        let Some(template) = &self.profile.search_url_template else {
            debug!("{}: no search_url_template configured, skipping on-demand search", self.profile.website);
            return Ok(vec![]);
        };
        let url = render_search_url(template, keyword, page, start_date, end_date);
        let html = fetch_html(client, &url, self.retry_count).await?;
        let base = Url::parse(&url).context("invalid rendered search url")?;
        Ok(parse_listing_page(&html, &base, &self.profile))
    }

    async fn fetch_category_page(&self, client: &Client, category_url: &str, page: usize) -> Result<Vec<ArticleLink>> {
        let url = paginate_url(category_url, page);
        let html = fetch_html(client, &url, self.retry_count).await?;
        let base = Url::parse(&url).context("invalid category url")?;
        Ok(parse_listing_page(&html, &base, &self.profile))
    }

    async fn crawl_detail(
        &self,
        client: &Client,
        link: &ArticleLink,
        content_filter: Option<&str>,
    ) -> Result<Option<DraftArticle>> {
        let html = fetch_html(client, &link.url, self.retry_count).await?;
        let base = Url::parse(&link.url).context("invalid detail url")?;
        let mut draft = parse_detail_page(&html, &base, &self.profile)?;
        if draft.content.trim().is_empty() && draft.summary.trim().is_empty() {
            return Ok(None);
        }
        if !matches_content_filter(content_filter, &format!("{} {}", draft.content, draft.summary)) {
            return Ok(None);
        }
        if draft.publish_date.is_none() {
            draft.publish_date = link.publish_date;
        }
        draft.website = self.profile.website.clone();
        check_vietnamese_content(&self.profile.website, &draft.content);
        Ok(Some(draft))
    }

    async fn discover_topics(&self, client: &Client) -> Result<Vec<TopicCandidate>> {
        let Some(nav_url) = &self.profile.nav_page_url else {
            debug!("{}: no nav_page_url configured, skipping topic discovery", self.profile.website);
            return Ok(vec![]);
        };
        let Some(link_selector) = &self.profile.nav_link_selector else {
            return Ok(vec![]);
        };
        let html = fetch_html(client, nav_url, self.retry_count).await?;
        let base = Url::parse(nav_url).context("invalid nav_page_url")?;
        Ok(parse_nav_topics(&html, &base, link_selector))
    }
}

/// Parses a navigation page's category links into topic candidates. Pure and
/// independently testable; no network access.
pub fn parse_nav_topics(html: &str, base: &Url, link_selector: &str) -> Vec<TopicCandidate> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(link_selector) else {
        warn!("invalid nav_link_selector: {}", link_selector);
        return vec![];
    };

    document
        .select(&selector)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let resolved = base.join(href).ok()?;
            let name = el.text().collect::<String>().trim().to_string();
            if name.is_empty() {
                return None;
            }
            Some(TopicCandidate { name, url: resolved.to_string() })
        })
        .collect()
}

/// Matches the source's `RETRY_COUNT` default of 3 attempts.
const DEFAULT_RETRY_COUNT: u32 = 3;
/// Upper bound on the max-interval the backoff ever reaches, used to turn
/// `retry_count` into the elapsed-time bound `ExponentialBackoff` expects.
const RETRY_MAX_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

/// Transient network/5xx failures are retried with exponential backoff
/// (matching `tools/scrape.rs`'s `backoff::future::retry` usage); a 4xx is
/// treated as permanent and returned immediately. `retry_count` bounds the
/// number of attempts via an elapsed-time ceiling, since `backoff` has no
/// attempt-count knob of its own.
async fn fetch_html(client: &Client, url: &str, retry_count: u32) -> Result<String> {
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(std::time::Duration::from_millis(200))
        .with_max_interval(RETRY_MAX_INTERVAL)
        .with_max_elapsed_time(Some(RETRY_MAX_INTERVAL * retry_count.max(1)))
        .build();

    let response = retry(backoff, || async {
        match client.get(url).send().await {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => Ok(resp),
                Err(e) if e.status().map(|s| s.is_server_error()).unwrap_or(false) => {
                    Err(backoff::Error::transient(anyhow!("{e}")))
                }
                Err(e) => Err(backoff::Error::permanent(anyhow!("{e}"))),
            },
            Err(e) => Err(backoff::Error::transient(anyhow!("{e}"))),
        }
    })
    .await
    .with_context(|| format!("GET {url} failed"))?;

    response.text().await.with_context(|| format!("failed to read body of {url}"))
}

fn render_search_url(template: &str, keyword: &str, page: usize, start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> String {
    template
        .replace("{keyword}", &url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect::<String>())
        .replace("{page}", &page.to_string())
        .replace("{start_ts}", &start_date.timestamp().to_string())
        .replace("{end_ts}", &end_date.timestamp().to_string())
}

fn paginate_url(base_url: &str, page: usize) -> String {
    if page <= 1 {
        return base_url.to_string();
    }
    if base_url.contains('?') {
        format!("{base_url}&page={page}")
    } else {
        format!("{base_url}?page={page}")
    }
}

/// Parses a listing page into article links. Pure and independently
/// testable; no network access.
pub fn parse_listing_page(html: &str, base: &Url, profile: &SiteProfile) -> Vec<ArticleLink> {
    let document = Html::parse_document(html);
    let Ok(item_selector) = Selector::parse(&profile.listing_item_selector) else {
        warn!("{}: invalid listing_item_selector", profile.website);
        return vec![];
    };
    let Ok(link_selector) = Selector::parse(&profile.listing_link_selector) else {
        warn!("{}: invalid listing_link_selector", profile.website);
        return vec![];
    };

    let mut links = Vec::new();
    for item in document.select(&item_selector) {
        let Some(link_el) = item.select(&link_selector).next() else {
            continue;
        };
        let Some(href) = link_el.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href) else {
            continue;
        };

        let title = non_empty(link_el.text().collect::<String>().trim());
        let publish_date = profile
            .listing_date_attr
            .as_deref()
            .and_then(|attr| item.value().attr(attr).or_else(|| link_el.value().attr(attr)))
            .and_then(parse_flexible_date);

        links.push(ArticleLink {
            url: resolved.to_string(),
            title,
            publish_date,
        });
    }
    links
}

/// Parses a detail page into a [`DraftArticle`] (minus `website`, which the
/// caller stamps). Pure and independently testable.
pub fn parse_detail_page(html: &str, base: &Url, profile: &SiteProfile) -> Result<DraftArticle> {
    let document = Html::parse_document(html);

    let title = select_text(&document, &profile.detail_title_selector).unwrap_or_else(|| extract_fallback_title(&document));

    let summary = profile
        .detail_summary_selector
        .as_deref()
        .and_then(|sel| select_text(&document, sel))
        .or_else(|| extract_meta_description(&document))
        .unwrap_or_default();

    let content = extract_content(html, base, &document, profile);

    let site_categories = profile
        .detail_category_selector
        .as_deref()
        .map(|sel| select_all_text(&document, sel))
        .unwrap_or_default();

    let tags = profile
        .detail_tag_selector
        .as_deref()
        .map(|sel| select_all_text(&document, sel))
        .unwrap_or_default();

    Ok(DraftArticle {
        url: base.to_string(),
        title,
        summary,
        content,
        site_categories,
        tags,
        publish_date: None,
        website: String::new(),
    })
}

fn extract_content(html: &str, base: &Url, document: &Html, profile: &SiteProfile) -> String {
    for selector_str in &profile.detail_content_selectors {
        if let Some(text) = select_joined_text(document, selector_str) {
            if word_count(&text) >= 50 {
                return text;
            }
        }
    }

    match readability::extractor::extract(&mut html.as_bytes(), base) {
        Ok(product) => {
            let text = html2md::parse_html(&product.content);
            if word_count(&text) >= 20 {
                return text;
            }
            text
        }
        Err(e) => {
            debug!("readability extraction failed for {}: {}", base, e);
            for selector_str in &profile.detail_content_selectors {
                if let Some(text) = select_joined_text(document, selector_str) {
                    if !text.trim().is_empty() {
                        return text;
                    }
                }
            }
            String::new()
        }
    }
}

fn select_text(document: &Html, selector_str: &str) -> Option<String> {
    let selector = Selector::parse(selector_str).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn select_joined_text(document: &Html, selector_str: &str) -> Option<String> {
    let selector = Selector::parse(selector_str).ok()?;
    let paragraphs: Vec<String> = document
        .select(&selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if paragraphs.is_empty() {
        None
    } else {
        Some(paragraphs.join("\n\n"))
    }
}

fn select_all_text(document: &Html, selector_str: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(selector_str) else {
        return vec![];
    };
    document
        .select(&selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn extract_fallback_title(document: &Html) -> String {
    select_text(document, "title")
        .or_else(|| select_text(document, "h1"))
        .unwrap_or_default()
}

fn extract_meta_description(document: &Html) -> Option<String> {
    let selector = Selector::parse(r#"meta[name="description"]"#).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_flexible_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(secs) = raw.trim().parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single();
    }
    None
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Logs (does not reject) when extracted content doesn't look Vietnamese —
/// a quality signal only, since the source/profile content is still usable.
fn check_vietnamese_content(website: &str, content: &str) {
    if content.trim().is_empty() {
        return;
    }
    if let Some(info) = whatlang::detect(content) {
        if info.lang() != whatlang::Lang::Vie {
            debug!("{}: extracted content detected as {:?}, not Vietnamese", website, info.lang());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> SiteProfile {
        SiteProfile {
            website: "example".into(),
            search_url_template: Some("https://example.com/search?q={keyword}&p={page}".into()),
            listing_item_selector: "article.item".into(),
            listing_link_selector: "a.title".into(),
            listing_date_attr: Some("data-ts".into()),
            detail_title_selector: "h1.title".into(),
            detail_content_selectors: vec!["article .body p".into()],
            detail_summary_selector: Some("p.sapo".into()),
            detail_category_selector: Some("nav.breadcrumb a".into()),
            detail_tag_selector: Some(".tags a".into()),
            nav_page_url: Some("https://example.com/".into()),
            nav_link_selector: Some("nav.main a".into()),
        }
    }

    #[test]
    fn parses_listing_items_with_date_attr() {
        let html = r#"
            <html><body>
            <article class="item"><a class="title" data-ts="1700000000" href="/bai-1">Tiêu đề 1</a></article>
            <article class="item"><a class="title" href="/bai-2">Tiêu đề 2</a></article>
            </body></html>
        "#;
        let base = Url::parse("https://example.com/muc").unwrap();
        let links = parse_listing_page(html, &base, &profile());
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://example.com/bai-1");
        assert!(links[0].publish_date.is_some());
        assert!(links[1].publish_date.is_none());
    }

    #[test]
    fn parses_detail_page_with_content_and_summary() {
        let html = r#"
            <html><body>
            <h1 class="title">Tiêu đề bài viết</h1>
            <p class="sapo">Tóm tắt ngắn.</p>
            <article><div class="body"><p>Đoạn một rất dài với nhiều từ để vượt qua ngưỡng năm mươi từ trong bài kiểm tra này nhằm đảm bảo selector được chọn đúng cách hoạt động như mong đợi khi áp dụng logic trích xuất nội dung chi tiết từ trang.</p></div></article>
            <nav class="breadcrumb"><a href="#">Thời sự</a></nav>
            <div class="tags"><a href="#">kinh-te</a></div>
            </body></html>
        "#;
        let base = Url::parse("https://example.com/bai-viet").unwrap();
        let draft = parse_detail_page(html, &base, &profile()).unwrap();
        assert_eq!(draft.title, "Tiêu đề bài viết");
        assert_eq!(draft.summary, "Tóm tắt ngắn.");
        assert!(draft.content.contains("Đoạn một"));
        assert_eq!(draft.site_categories, vec!["Thời sự".to_string()]);
        assert_eq!(draft.tags, vec!["kinh-te".to_string()]);
    }

    #[test]
    fn render_search_url_substitutes_all_placeholders() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap();
        let url = render_search_url("https://x/search?kw={keyword}&p={page}&s={start_ts}&e={end_ts}", "kinh tế", 2, start, end);
        assert!(url.contains("kw=kinh+t%E1%BA%BF"));
        assert!(url.contains("p=2"));
    }

    #[test]
    fn parses_nav_topics_from_menu_links() {
        let html = r#"
            <html><body>
            <nav class="main">
                <a href="/kinh-te">Kinh tế</a>
                <a href="/the-thao">Thể thao</a>
                <a href="#"></a>
            </nav>
            </body></html>
        "#;
        let base = Url::parse("https://example.com/").unwrap();
        let topics = parse_nav_topics(html, &base, "nav.main a");
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].name, "Kinh tế");
        assert_eq!(topics[0].url, "https://example.com/kinh-te");
    }

    #[test]
    fn paginate_url_appends_page_param() {
        assert_eq!(paginate_url("https://x/muc", 1), "https://x/muc");
        assert_eq!(paginate_url("https://x/muc", 3), "https://x/muc?page=3");
        assert_eq!(paginate_url("https://x/muc?a=1", 2), "https://x/muc?a=1&page=2");
    }
}
