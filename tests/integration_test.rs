//! Cross-module pipeline test: listing page -> detail page -> built Article
//! -> chunking -> hybrid-search post-filtering, all without touching a live
//! store or the network. Fixtures are small hand-written HTML snippets
//! rather than live pages.

use chrono::{TimeZone, Utc};
use tin_loom::adapters::generic::{parse_detail_page, parse_listing_page, SiteProfile};
use tin_loom::crawl::executor::build_article;
use tin_loom::pipeline::chunking::split_text_into_chunks;
use tin_loom::search::hybrid::{dedup_sort_truncate, post_filter};
use url::Url;

fn profile() -> SiteProfile {
    SiteProfile {
        website: "example-news".to_string(),
        search_url_template: Some("https://example-news.test/search?q={keyword}&page={page}".to_string()),
        listing_item_selector: "div.item".to_string(),
        listing_link_selector: "a.title".to_string(),
        listing_date_attr: Some("data-ts".to_string()),
        detail_title_selector: "h1.headline".to_string(),
        detail_content_selectors: vec!["div.article-body".to_string()],
        detail_summary_selector: Some("p.sapo".to_string()),
        detail_category_selector: Some("a.category".to_string()),
        detail_tag_selector: Some("a.tag".to_string()),
        nav_page_url: None,
        nav_link_selector: None,
    }
}

const LISTING_HTML: &str = r#"
    <html><body>
    <div class="item"><a class="title" data-ts="1719835200" href="/bai-viet-1">Lạm phát tăng cao trong quý III</a></div>
    <div class="item"><a class="title" data-ts="1719921600" href="/bai-viet-2">Ngân hàng giảm lãi suất</a></div>
    </body></html>
"#;

const DETAIL_HTML: &str = r#"
    <html><body>
    <h1 class="headline">Lạm phát tăng cao trong quý III</h1>
    <p class="sapo">Chỉ số giá tiêu dùng tăng mạnh so với cùng kỳ năm trước.</p>
    <div class="article-body">
        <p>Theo báo cáo mới nhất được công bố sáng nay, lạm phát trong quý III đã tăng cao hơn nhiều so với dự báo trước đó của các chuyên gia kinh tế trong và ngoài nước.</p>
        <p>Ngân hàng Nhà nước cho biết sẽ tiếp tục theo dõi sát diễn biến giá cả trong những tháng tới và sẵn sàng can thiệp khi cần thiết để ổn định thị trường.</p>
        <p>Nhiều doanh nghiệp đã phải điều chỉnh giá bán sản phẩm để thích ứng với tình hình chi phí đầu vào tăng cao trong thời gian gần đây.</p>
    </div>
    <a class="category">Kinh tế</a>
    <a class="tag">lạm phát</a>
    <a class="tag">ngân hàng</a>
    </body></html>
"#;

#[test]
fn listing_page_yields_ordered_article_links() {
    let base = Url::parse("https://example-news.test/").unwrap();
    let links = parse_listing_page(LISTING_HTML, &base, &profile());

    assert_eq!(links.len(), 2);
    assert_eq!(links[0].url, "https://example-news.test/bai-viet-1");
    assert!(links[0].title.as_deref().unwrap().contains("Lạm phát"));
    assert_eq!(links[0].publish_date.unwrap(), Utc.timestamp_opt(1719835200, 0).unwrap());
}

#[test]
fn detail_page_extracts_full_draft_article() {
    let base = Url::parse("https://example-news.test/bai-viet-1").unwrap();
    let draft = parse_detail_page(DETAIL_HTML, &base, &profile()).expect("detail page should parse");

    assert_eq!(draft.title, "Lạm phát tăng cao trong quý III");
    assert!(draft.content.contains("Ngân hàng Nhà nước"));
    assert!(draft.site_categories.iter().any(|c| c == "Kinh tế"));
    assert!(draft.tags.iter().any(|t| t == "lạm phát"));
}

#[test]
fn built_article_chunks_and_survives_hybrid_post_filter() {
    let base = Url::parse("https://example-news.test/bai-viet-1").unwrap();
    let draft = parse_detail_page(DETAIL_HTML, &base, &profile()).unwrap();
    let article = build_article(draft, Some("lạm phát"), "user-1", "search-1");

    assert!(!article.article_id.is_empty());
    assert_eq!(article.search_keyword, "lạm phát");

    let chunks = split_text_into_chunks(&article.article_id, &article.content, 80, 20);
    assert!(!chunks.is_empty());
    assert!(chunks.iter().all(|c| c.article_id == article.article_id));

    let kept = post_filter(vec![article.clone()], "lạm phát", None);
    assert_eq!(kept.len(), 1);

    let rejected = post_filter(vec![article], "tăng trưởng GDP", None);
    assert!(rejected.is_empty());
}

#[test]
fn dedup_sort_truncate_collapses_duplicate_urls_across_pages() {
    let base = Url::parse("https://example-news.test/bai-viet-1").unwrap();
    let draft = parse_detail_page(DETAIL_HTML, &base, &profile()).unwrap();
    let first = build_article(draft.clone(), None, "user-1", "search-1");
    let mut second = build_article(draft, None, "user-1", "search-1");
    second.crawled_at = first.crawled_at;

    let kept = dedup_sort_truncate(vec![first, second], 10);
    assert_eq!(kept.len(), 1);
}
