//! Crawl loop tests with an in-memory fetcher
//!
//! These run the full cycle (fetch, process, classify, record, persist)
//! without a network and inspect the files left in a temporary directory.

use crate::support::{create_test_config, read_json, FakeFetcher, LogCapture, TestSink};
use site_harvest::crawler::{CancelFlag, Coordinator, FetchErrorKind, HtmlProcessor};
use site_harvest::output::FsSink;
use site_harvest::state::{CrawlState, TerminationReason};
use site_harvest::{HarvestError, NormalizedUrl, PageClassification};
use tempfile::TempDir;

fn url(s: &str) -> NormalizedUrl {
    NormalizedUrl::parse(s).unwrap()
}

/// `/` links to four children, nothing deeper
fn star_site() -> FakeFetcher {
    FakeFetcher::new()
        .page(
            "https://example.com/",
            r#"<html><body>
                <a href="/p1">1</a><a href="/p2">2</a><a href="/p3">3</a><a href="/p4">4</a>
            </body></html>"#,
        )
        .page("https://example.com/p1", "<p>one</p>")
        .page("https://example.com/p2", "<p>two</p>")
        .page("https://example.com/p3", "<p>three</p>")
        .page("https://example.com/p4", "<p>four</p>")
}

#[tokio::test]
async fn test_crawl_builds_hierarchy_and_skips_external_links() {
    let dir = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new()
        .page("https://example.com/", r#"<a href="/a">A</a>"#)
        .page(
            "https://example.com/a",
            r#"<title>A</title><a href="/b">B</a><a href="https://external.com/c">C</a>"#,
        )
        .page("https://example.com/b", "<p>Leaf</p>");
    let log = fetcher.clone();

    let mut coordinator = Coordinator::new(
        create_test_config(dir.path()),
        "https://example.com",
        fetcher,
        HtmlProcessor::default(),
        FsSink::new(dir.path()).unwrap(),
        CancelFlag::new(),
    )
    .unwrap();
    let outcome = coordinator.run().await.unwrap();

    // Exactly three fetches; the external link is never requested
    assert_eq!(
        log.requests(),
        vec![
            "https://example.com/",
            "https://example.com/a",
            "https://example.com/b"
        ]
    );
    assert_eq!(outcome.state, CrawlState::Completed);
    assert_eq!(outcome.reason, TerminationReason::FrontierExhausted);
    assert_eq!(outcome.stats.pages_visited, 3);
    assert_eq!(outcome.stats.fetch_attempts, 3);
    assert_eq!(outcome.stats.pages_skipped_out_of_domain, 1);

    let tree = read_json(&dir.path().join("site_hierarchy.json"));
    assert_eq!(tree["url"], "https://example.com/");
    assert_eq!(tree["depth"], 0);
    assert_eq!(tree["children"][0]["url"], "https://example.com/a");
    assert_eq!(tree["children"][0]["children"][0]["url"], "https://example.com/b");
    assert_eq!(tree["children"][0]["children"][0]["depth"], 2);
    assert_eq!(tree["children"].as_array().unwrap().len(), 1);

    let info = read_json(&dir.path().join("a/page_info.json"));
    assert_eq!(info["parent"], "https://example.com/");
    assert_eq!(info["metadata"]["title"], "A");
    let links = info["links"].as_array().unwrap();
    assert!(links
        .iter()
        .any(|l| l["url"] == "https://external.com/c" && l["in_scope"] == false));
    assert!(links
        .iter()
        .any(|l| l["url"] == "https://example.com/b" && l["in_scope"] == true));

    let text = std::fs::read_to_string(dir.path().join("b/text/content.txt")).unwrap();
    assert!(text.starts_with("URL: https://example.com/b\nPage Type: content\n\n"));
    assert!(text.ends_with("Leaf"));
}

#[tokio::test]
async fn test_equivalent_links_fetched_once() {
    let dir = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new()
        .page(
            "https://example.com/",
            r#"<a href="/a">1</a>
               <a href="/a/">2</a>
               <a href="/a#section">3</a>
               <a href="HTTPS://EXAMPLE.COM:443/a?utm_source=x">4</a>
               <a href="./b/../a">5</a>
               <a href="/">self</a>
               <a href="ftp://example.com/file">ftp</a>
               <a href="http://[::1">broken</a>"#,
        )
        .page("https://example.com/a", r#"<a href="/">back home</a>"#);
    let log = fetcher.clone();

    let mut coordinator = Coordinator::new(
        create_test_config(dir.path()),
        "https://example.com/",
        fetcher,
        HtmlProcessor::default(),
        FsSink::new(dir.path()).unwrap(),
        CancelFlag::new(),
    )
    .unwrap();
    let outcome = coordinator.run().await.unwrap();

    assert_eq!(
        log.requests(),
        vec!["https://example.com/", "https://example.com/a"]
    );
    assert_eq!(outcome.stats.invalid_links, 2);

    let session = coordinator.session();
    assert_eq!(session.hierarchy.len(), 2);
    assert!(session.frontier.is_empty());
}

#[tokio::test]
async fn test_max_pages_stops_crawl() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    config.crawler.max_pages = Some(2);
    let fetcher = star_site();
    let log = fetcher.clone();

    let mut coordinator = Coordinator::new(
        config,
        "https://example.com/",
        fetcher,
        HtmlProcessor::default(),
        FsSink::new(dir.path()).unwrap(),
        CancelFlag::new(),
    )
    .unwrap();
    let outcome = coordinator.run().await.unwrap();

    assert_eq!(outcome.state, CrawlState::Completed);
    assert_eq!(outcome.reason, TerminationReason::PageLimitReached);
    assert_eq!(log.requests().len(), 2);
    assert_eq!(outcome.listings.total(), 2);

    let checkpoint = read_json(&dir.path().join("crawl_checkpoint.json"));
    assert_eq!(checkpoint["state"], "completed");
    assert_eq!(checkpoint["frontier"]["queue"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_failed_fetch_not_recorded() {
    let dir = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new()
        .page(
            "https://example.com/",
            r#"<a href="/missing">gone</a><a href="/broken">down</a><a href="/ok">ok</a>"#,
        )
        .failure("https://example.com/broken", FetchErrorKind::Http5xx, Some(503))
        .page("https://example.com/ok", "<p>fine</p>");

    let mut coordinator = Coordinator::new(
        create_test_config(dir.path()),
        "https://example.com/",
        fetcher,
        HtmlProcessor::default(),
        FsSink::new(dir.path()).unwrap(),
        CancelFlag::new(),
    )
    .unwrap();
    let outcome = coordinator.run().await.unwrap();

    assert_eq!(outcome.stats.fetch_attempts, 4);
    assert_eq!(outcome.stats.pages_failed, 2);
    assert_eq!(outcome.stats.pages_visited, 2);

    let hierarchy = &coordinator.session().hierarchy;
    assert!(hierarchy.contains(&url("https://example.com/ok")));
    assert!(!hierarchy.contains(&url("https://example.com/missing")));
    assert!(!hierarchy.contains(&url("https://example.com/broken")));
    assert!(!dir.path().join("missing").exists());
}

#[tokio::test]
async fn test_cancellation_leaves_consistent_output() {
    let dir = TempDir::new().unwrap();
    let cancel = CancelFlag::new();
    let fetcher = star_site().cancel_after(2, cancel.clone());

    let mut coordinator = Coordinator::new(
        create_test_config(dir.path()),
        "https://example.com/",
        fetcher,
        HtmlProcessor::default(),
        FsSink::new(dir.path()).unwrap(),
        cancel,
    )
    .unwrap();
    let outcome = coordinator.run().await.unwrap();

    // The page in flight when cancellation arrived is still recorded
    assert_eq!(outcome.state, CrawlState::Aborted);
    assert_eq!(outcome.reason, TerminationReason::Cancelled);
    assert_eq!(outcome.stats.pages_visited, 2);

    let tree = read_json(&dir.path().join("site_hierarchy.json"));
    assert_eq!(tree["url"], "https://example.com/");
    assert_eq!(tree["children"].as_array().unwrap().len(), 1);
    assert_eq!(tree["children"][0]["url"], "https://example.com/p1");

    let listings = read_json(&dir.path().join("page_listings.json"));
    let total: usize = ["product", "category", "content", "other"]
        .iter()
        .map(|key| listings[*key].as_array().unwrap().len())
        .sum();
    assert_eq!(total, 2);

    let checkpoint = read_json(&dir.path().join("crawl_checkpoint.json"));
    assert_eq!(checkpoint["state"], "aborted");
    assert!(!dir.path().join("crawl_checkpoint.json.tmp").exists());
}

#[tokio::test]
async fn test_resume_continues_without_refetching() {
    let dir = TempDir::new().unwrap();
    let cancel = CancelFlag::new();

    let mut first = Coordinator::new(
        create_test_config(dir.path()),
        "https://example.com/",
        star_site().cancel_after(2, cancel.clone()),
        HtmlProcessor::default(),
        FsSink::new(dir.path()).unwrap(),
        cancel,
    )
    .unwrap();
    first.run().await.unwrap();

    let sink = FsSink::new(dir.path()).unwrap();
    let mut session = sink.load_checkpoint().unwrap().unwrap();
    session.reopen(None);
    assert_eq!(session.hierarchy.len(), 2);

    let fetcher = star_site();
    let log = fetcher.clone();
    let mut second = Coordinator::with_session(
        create_test_config(dir.path()),
        session,
        fetcher,
        HtmlProcessor::default(),
        sink,
        CancelFlag::new(),
    );
    let outcome = second.run().await.unwrap();

    assert_eq!(
        log.requests(),
        vec![
            "https://example.com/p2",
            "https://example.com/p3",
            "https://example.com/p4"
        ]
    );
    assert_eq!(outcome.state, CrawlState::Completed);
    assert_eq!(outcome.stats.pages_visited, 5);

    let tree = read_json(&dir.path().join("site_hierarchy.json"));
    assert_eq!(tree["children"].as_array().unwrap().len(), 4);

    // Page directories stay unique across the two runs
    assert!(dir.path().join("p4/page_info.json").exists());
    assert!(!dir.path().join("home-2").exists());
}

#[tokio::test]
async fn test_max_depth_limits_following() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    config.crawler.max_depth = Some(1);
    let fetcher = FakeFetcher::new()
        .page("https://example.com/", r#"<a href="/d1">d1</a>"#)
        .page("https://example.com/d1", r#"<a href="/d2">d2</a>"#)
        .page("https://example.com/d2", r#"<a href="/d3">d3</a>"#);
    let log = fetcher.clone();

    let mut coordinator = Coordinator::new(
        config,
        "https://example.com/",
        fetcher,
        HtmlProcessor::default(),
        FsSink::new(dir.path()).unwrap(),
        CancelFlag::new(),
    )
    .unwrap();
    coordinator.run().await.unwrap();

    assert_eq!(
        log.requests(),
        vec!["https://example.com/", "https://example.com/d1"]
    );

    // Links beyond the limit are still listed on the page
    let info = read_json(&dir.path().join("d1/page_info.json"));
    assert_eq!(info["links"][0]["url"], "https://example.com/d2");
    assert_eq!(info["depth"], 1);
}

#[tokio::test]
async fn test_classification_and_product_info() {
    let dir = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new()
        .page(
            "https://example.com/",
            r#"<a href="/product/shirt">shirt</a><a href="/shop">shop</a><a href="/report.pdf">pdf</a>"#,
        )
        .page(
            "https://example.com/product/shirt",
            r#"<h1>Shirt</h1><p class="price">$10</p><span class="sku">S1</span>"#,
        )
        .page("https://example.com/shop", "<h1>Shop</h1>")
        .response("https://example.com/report.pdf", "application/pdf", b"%PDF-1.4");

    let mut coordinator = Coordinator::new(
        create_test_config(dir.path()),
        "https://example.com/",
        fetcher,
        HtmlProcessor::default(),
        FsSink::new(dir.path()).unwrap(),
        CancelFlag::new(),
    )
    .unwrap();
    let outcome = coordinator.run().await.unwrap();

    assert_eq!(
        outcome.listings.get(PageClassification::Product),
        &[url("https://example.com/product/shirt")]
    );
    assert_eq!(
        outcome.listings.get(PageClassification::Category),
        &[url("https://example.com/shop")]
    );
    assert_eq!(
        outcome.listings.get(PageClassification::Other),
        &[url("https://example.com/report.pdf")]
    );

    let product = read_json(&dir.path().join("product-shirt/page_info.json"));
    assert_eq!(product["classification"], "product");
    assert_eq!(product["metadata"]["product_info"]["price"], "$10");
    assert_eq!(product["metadata"]["product_info"]["sku"], "S1");

    let category = read_json(&dir.path().join("shop/page_info.json"));
    assert!(category["metadata"].get("product_info").is_none());

    let listings = read_json(&dir.path().join("page_listings.json"));
    assert_eq!(listings["other"][0], "https://example.com/report.pdf");
}

#[tokio::test]
async fn test_images_downloaded_into_page_directory() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    config.crawler.download_images = true;
    let fetcher = FakeFetcher::new()
        .page(
            "https://example.com/",
            r#"<img src="/img/Logo.png" alt="Logo"><img src="/img/missing.jpg" alt="Gone">"#,
        )
        .response("https://example.com/img/Logo.png", "image/png", b"\x89PNG\r\n");

    let mut coordinator = Coordinator::new(
        config,
        "https://example.com/",
        fetcher,
        HtmlProcessor::default(),
        FsSink::new(dir.path()).unwrap(),
        CancelFlag::new(),
    )
    .unwrap();
    let outcome = coordinator.run().await.unwrap();

    assert_eq!(outcome.stats.fetch_attempts, 1);
    assert_eq!(outcome.stats.images_found, 2);
    assert_eq!(outcome.stats.images_downloaded, 1);

    let bytes = std::fs::read(dir.path().join("home/images/logo.png")).unwrap();
    assert_eq!(bytes, b"\x89PNG\r\n");

    let info = read_json(&dir.path().join("home/page_info.json"));
    assert_eq!(info["images"][0]["local_path"], "home/images/logo.png");
    assert_eq!(info["images"][0]["alt_text"], "Logo");
    assert_eq!(info["images"][0]["content_type"], "image/png");
    assert_eq!(info["images"][1]["original_url"], "https://example.com/img/missing.jpg");
    assert!(info["images"][1]["local_path"].is_null());
}

#[tokio::test]
async fn test_checkpoint_flushed_every_interval() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    config.crawler.checkpoint_interval = 2;

    let mut coordinator = Coordinator::new(
        config,
        "https://example.com/",
        star_site(),
        HtmlProcessor::default(),
        TestSink::new(dir.path()),
        CancelFlag::new(),
    )
    .unwrap();
    coordinator.run().await.unwrap();

    // Five pages: flushes after pages 2 and 4, plus the final one
    assert_eq!(coordinator.sink().pages_written, 5);
    assert_eq!(coordinator.sink().checkpoints_written, 3);
}

#[tokio::test]
async fn test_persistence_failure_aborts_with_error() {
    let dir = TempDir::new().unwrap();
    let fetcher = star_site();
    let log = fetcher.clone();

    let mut coordinator = Coordinator::new(
        create_test_config(dir.path()),
        "https://example.com/",
        fetcher,
        HtmlProcessor::default(),
        TestSink::failing_after(dir.path(), 1),
        CancelFlag::new(),
    )
    .unwrap();
    let result = coordinator.run().await;

    assert!(matches!(result, Err(HarvestError::Persistence(_))));
    assert_eq!(log.requests().len(), 2);
    assert_eq!(coordinator.session().state, CrawlState::Aborted);

    // Best-effort flush still wrote the checkpoint
    let checkpoint = read_json(&dir.path().join("crawl_checkpoint.json"));
    assert_eq!(checkpoint["state"], "aborted");
}

#[tokio::test]
async fn test_invalid_seed_rejected() {
    let dir = TempDir::new().unwrap();
    let result = Coordinator::new(
        create_test_config(dir.path()),
        "mailto:someone@example.com",
        FakeFetcher::new(),
        HtmlProcessor::default(),
        FsSink::new(dir.path()).unwrap(),
        CancelFlag::new(),
    );

    assert!(matches!(result, Err(HarvestError::InvalidSeed { .. })));
}

#[tokio::test]
async fn test_seed_fetch_failure_leaves_empty_hierarchy() {
    let dir = TempDir::new().unwrap();
    let mut coordinator = Coordinator::new(
        create_test_config(dir.path()),
        "https://example.com/",
        FakeFetcher::new(),
        HtmlProcessor::default(),
        FsSink::new(dir.path()).unwrap(),
        CancelFlag::new(),
    )
    .unwrap();
    let outcome = coordinator.run().await.unwrap();

    assert_eq!(outcome.state, CrawlState::Completed);
    assert_eq!(outcome.stats.pages_failed, 1);
    assert!(read_json(&dir.path().join("site_hierarchy.json")).is_null());
}

#[tokio::test]
async fn test_fetch_failure_logged_once_with_kind() {
    let logs = LogCapture::new();
    let _guard = logs.install();

    let dir = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new()
        .page(
            "https://example.com/",
            r#"<a href="/broken">down</a><a href="/ok">ok</a>"#,
        )
        .page(
            "https://example.com/ok",
            r#"<a href="/broken">still down</a><a href="/broken/">again</a>"#,
        )
        .failure("https://example.com/broken", FetchErrorKind::Http5xx, Some(503));

    let mut coordinator = Coordinator::new(
        create_test_config(dir.path()),
        "https://example.com/",
        fetcher,
        HtmlProcessor::default(),
        FsSink::new(dir.path()).unwrap(),
        CancelFlag::new(),
    )
    .unwrap();
    let outcome = coordinator.run().await.unwrap();
    assert_eq!(outcome.stats.pages_failed, 1);

    let failures = logs.matching("Fetch failed for https://example.com/broken [http-5xx]");
    assert_eq!(failures.len(), 1, "log lines: {:?}", logs.lines());
    assert!(failures[0].contains("ERROR"));
}

#[tokio::test]
async fn test_out_of_domain_counted_once_across_pages() {
    let dir = TempDir::new().unwrap();
    let footer = r#"<a href="https://external.com/about">partner</a>"#;
    let fetcher = FakeFetcher::new()
        .page(
            "https://example.com/",
            &format!(r#"<a href="/a">a</a><a href="/b">b</a>{}"#, footer),
        )
        .page("https://example.com/a", footer)
        .page(
            "https://example.com/b",
            &format!(r#"{}<a href="https://external.com/other">other</a>"#, footer),
        );

    let mut coordinator = Coordinator::new(
        create_test_config(dir.path()),
        "https://example.com/",
        fetcher,
        HtmlProcessor::default(),
        FsSink::new(dir.path()).unwrap(),
        CancelFlag::new(),
    )
    .unwrap();
    let outcome = coordinator.run().await.unwrap();

    assert_eq!(outcome.stats.pages_visited, 3);
    assert_eq!(outcome.stats.pages_skipped_out_of_domain, 2);

    // Every page still lists the link
    let info = read_json(&dir.path().join("a/page_info.json"));
    assert_eq!(info["links"][0]["url"], "https://external.com/about");
    assert_eq!(info["links"][0]["in_scope"], false);
}

#[tokio::test]
async fn test_dot_paths_stay_inside_output_directory() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("website_content");
    let fetcher = FakeFetcher::new()
        .page(
            "https://example.com/",
            r#"<a href="/..%20">dots</a><a href="/.%20">dot</a>"#,
        )
        .page("https://example.com/..%20", "<p>two dots</p>")
        .page("https://example.com/.%20", "<p>one dot</p>");
    let log = fetcher.clone();

    let mut coordinator = Coordinator::new(
        create_test_config(&root),
        "https://example.com/",
        fetcher,
        HtmlProcessor::default(),
        FsSink::new(&root).unwrap(),
        CancelFlag::new(),
    )
    .unwrap();
    let outcome = coordinator.run().await.unwrap();

    assert_eq!(log.requests().len(), 3);
    assert_eq!(outcome.stats.pages_visited, 3);

    // Nothing besides the output directory itself is written to its parent
    let outside: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(outside, vec![std::ffi::OsString::from("website_content")]);

    let info = read_json(&root.join("--/page_info.json"));
    assert_eq!(info["url"], "https://example.com/..%20");
    assert!(root.join("-/text/content.txt").exists());
}

#[tokio::test]
async fn test_long_multibyte_path_does_not_abort_crawl() {
    let dir = TempDir::new().unwrap();
    let slug = "日本語".repeat(30);
    let long = url(&format!("https://example.com/{}", slug));
    let fetcher = FakeFetcher::new()
        .page(
            "https://example.com/",
            &format!(r#"<a href="/{}">long</a>"#, slug),
        )
        .page(long.as_str(), r#"<a href="/after">after</a>"#)
        .page("https://example.com/after", "<p>reached</p>");
    let log = fetcher.clone();

    let mut coordinator = Coordinator::new(
        create_test_config(dir.path()),
        "https://example.com/",
        fetcher,
        HtmlProcessor::default(),
        FsSink::new(dir.path()).unwrap(),
        CancelFlag::new(),
    )
    .unwrap();
    let outcome = coordinator.run().await.unwrap();

    assert_eq!(outcome.state, CrawlState::Completed);
    assert_eq!(outcome.stats.pages_visited, 3);
    assert!(log
        .requests()
        .contains(&"https://example.com/after".to_string()));

    let long_dir = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .find(|name| name.starts_with("日本語"))
        .unwrap();
    assert!(long_dir.len() <= 150);
    assert!(dir.path().join(&long_dir).join("page_info.json").exists());
}
