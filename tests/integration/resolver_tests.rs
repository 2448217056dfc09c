//! Integration tests for URL resolution
//!
//! These tests use wiremock to serve redirect chains and check which URL
//! the resolver settles on.

use urlscope::config::ResolverConfig;
use urlscope::{RawUrlRecord, Resolver, UrlLabel};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn resolver(max_redirects: usize, max_body_bytes: usize) -> Resolver {
    Resolver::from_config(&ResolverConfig {
        probe_timeout_secs: 3,
        max_redirects,
        user_agent: "urlscope-test".to_string(),
        max_body_bytes,
    })
    .expect("Failed to build resolver")
}

fn port_of(server: &MockServer) -> u16 {
    server.address().port()
}

async fn redirect(server: &MockServer, from: &str, to: &str) {
    Mock::given(method("GET"))
        .and(path(from))
        .respond_with(ResponseTemplate::new(301).insert_header("location", to))
        .mount(server)
        .await;
}

async fn page(server: &MockServer, at: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .insert_header("server", "wiremock")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_direct_page_resolves_to_itself() {
    let server = MockServer::start().await;
    page(&server, "/home", "<html><body>hi</body></html>").await;

    let raw = format!("{}/home", server.uri());
    let resolved = resolver(10, 1024)
        .resolve(&RawUrlRecord::new(raw.clone(), Some(UrlLabel::Benign)))
        .await;

    assert_eq!(resolved.resolved_url(), raw);
    assert_eq!(resolved.label(), Some(UrlLabel::Benign));
    let probe = resolved.probe().expect("probe should succeed");
    assert_eq!(probe.status, 200);
    assert_eq!(probe.header("server"), Some("wiremock"));
    assert_eq!(probe.encoding.as_deref(), Some("utf-8"));
    assert!(probe.body.contains("hi"));
    assert!(resolved.redirect_history().is_empty());
}

#[tokio::test]
async fn test_single_same_host_redirect_uses_final() {
    let server = MockServer::start().await;
    redirect(&server, "/old", "/new").await;
    page(&server, "/new", "moved").await;

    let raw = format!("{}/old", server.uri());
    let resolved = resolver(10, 1024).resolve(&RawUrlRecord::new(raw, None)).await;

    assert_eq!(resolved.resolved_url(), format!("{}/new", server.uri()));
    assert_eq!(resolved.redirect_history().len(), 1);
    assert_eq!(resolved.redirect_history()[0].status, 301);
}

#[tokio::test]
async fn test_same_host_chain_keeps_raw() {
    let server = MockServer::start().await;
    redirect(&server, "/a", "/b").await;
    redirect(&server, "/b", "/c").await;
    page(&server, "/c", "end").await;

    let raw = format!("{}/a", server.uri());
    let resolved = resolver(10, 1024)
        .resolve(&RawUrlRecord::new(raw.clone(), None))
        .await;

    assert_eq!(resolved.resolved_url(), raw);
    assert_eq!(resolved.redirect_history().len(), 2);
    assert_eq!(
        resolved.probe().map(|p| p.final_url.clone()),
        Some(format!("{}/c", server.uri()))
    );
}

#[tokio::test]
async fn test_cross_host_chain_uses_final() {
    let server = MockServer::start().await;
    let port = port_of(&server);
    let landing = format!("http://127.0.0.1:{}/landing", port);
    redirect(&server, "/start", "/hop").await;
    redirect(&server, "/hop", &landing).await;
    page(&server, "/landing", "landed").await;

    // Same server, but reached under a different host name
    let raw = format!("http://localhost:{}/start", port);
    let resolved = resolver(10, 1024).resolve(&RawUrlRecord::new(raw, None)).await;

    assert_eq!(resolved.redirect_history().len(), 2);
    assert_eq!(resolved.resolved_url(), landing);
    assert_eq!(resolved.components().host, "127.0.0.1");
}

#[tokio::test]
async fn test_schemeless_raw_url_is_probed_over_http() {
    let server = MockServer::start().await;
    page(&server, "/page", "ok").await;

    let raw = format!("127.0.0.1:{}/page", port_of(&server));
    let resolved = resolver(10, 1024)
        .resolve(&RawUrlRecord::new(raw.clone(), None))
        .await;

    assert!(resolved.probe().is_some());
    assert_eq!(resolved.raw_url(), raw);
    assert_eq!(resolved.resolved_url(), format!("http://{}", raw));
}

#[tokio::test]
async fn test_redirect_loop_degrades_to_raw() {
    let server = MockServer::start().await;
    redirect(&server, "/ping", "/pong").await;
    redirect(&server, "/pong", "/ping").await;

    let raw = format!("{}/ping", server.uri());
    let resolved = resolver(10, 1024)
        .resolve(&RawUrlRecord::new(raw.clone(), None))
        .await;

    assert!(resolved.probe().is_none());
    assert_eq!(resolved.resolved_url(), raw);
}

#[tokio::test]
async fn test_too_many_redirects_degrades_to_raw() {
    let server = MockServer::start().await;
    redirect(&server, "/1", "/2").await;
    redirect(&server, "/2", "/3").await;
    page(&server, "/3", "far").await;

    let raw = format!("{}/1", server.uri());
    let resolved = resolver(1, 1024)
        .resolve(&RawUrlRecord::new(raw.clone(), None))
        .await;

    assert!(resolved.probe().is_none());
    assert_eq!(resolved.resolved_url(), raw);
}

#[tokio::test]
async fn test_unreachable_host_degrades_to_raw() {
    let server = MockServer::start().await;
    let raw = format!("{}/gone", server.uri());
    drop(server);

    let resolved = resolver(10, 1024)
        .resolve(&RawUrlRecord::new(raw.clone(), None))
        .await;

    assert!(resolved.probe().is_none());
    assert_eq!(resolved.resolved_url(), raw);
}

#[tokio::test]
async fn test_body_is_truncated() {
    let server = MockServer::start().await;
    page(&server, "/big", &"x".repeat(5000)).await;

    let resolved = resolver(10, 100)
        .resolve(&RawUrlRecord::new(format!("{}/big", server.uri()), None))
        .await;

    assert_eq!(resolved.probe().map(|p| p.body.len()), Some(100));
}

#[tokio::test]
async fn test_resolving_twice_gives_the_same_result() {
    let server = MockServer::start().await;
    redirect(&server, "/promo", "/shop?item=7&ref=mail").await;
    page(&server, "/shop", "same every time").await;

    let subject = resolver(10, 1024);
    let record = RawUrlRecord::new(format!("{}/promo", server.uri()), Some(UrlLabel::Phishing));
    let first = subject.resolve(&record).await;
    let second = subject.resolve(&record).await;

    assert_eq!(first.resolved_url(), second.resolved_url());
    assert_eq!(first.redirect_history(), second.redirect_history());
    assert_eq!(first.components(), second.components());
    assert_eq!(
        first.probe().map(|p| (p.status, p.body.clone())),
        second.probe().map(|p| (p.status, p.body.clone()))
    );
    assert_eq!(first.components().query_params.len(), 2);
}
