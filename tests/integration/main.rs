//! Integration tests for Site-Harvest
//!
//! `crawl_tests` drives the crawl loop with an in-memory fetcher; the
//! `http_tests` run the real HTTP fetcher against wiremock servers.

mod crawl_tests;
