//! End-to-end tests driving full crawl sessions against wiremock servers

mod common;
mod crawl_tests;
mod fetch_tests;
mod robots_tests;
