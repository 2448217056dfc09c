//! Integration tests for the intel and archive clients
//!
//! wiremock plays both upstream services; the tests check the request shape,
//! the single retry on rate limiting and the CDX table handling.

use serde_json::json;
use urlscope::config::{ArchiveConfig, IntelConfig};
use urlscope::intel::{
    ArchiveError, ArchiveSource, CdxArchive, HostIntelClient, IntelError, IntelSource,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ADDRESS: &str = "93.184.216.34";

fn intel_client(server: &MockServer) -> HostIntelClient {
    HostIntelClient::new(&IntelConfig {
        endpoint: format!("{}/host/", server.uri()),
        api_key: Some("secret".to_string()),
        timeout_secs: 3,
        retry_backoff_ms: 10,
    })
    .expect("Failed to build intel client")
}

fn archive_client(server: &MockServer) -> CdxArchive {
    CdxArchive::new(&ArchiveConfig {
        enabled: true,
        endpoint: format!("{}/cdx/search/cdx", server.uri()),
        timeout_secs: 3,
    })
    .expect("Failed to build archive client")
}

fn host_document() -> serde_json::Value {
    json!({
        "ports": [22, 443],
        "vulns": ["CVE-2023-0001"],
        "org": "Example, Inc.",
        "data": [{"port": 443, "ssl": {"cert": {"issued": "20230101000000Z", "expires": "20240101000000Z"}}}]
    })
}

#[tokio::test]
async fn test_intel_lookup_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/host/{}", ADDRESS)))
        .and(query_param("key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(host_document()))
        .expect(1)
        .mount(&server)
        .await;

    let intel = intel_client(&server).lookup(ADDRESS).await.unwrap();

    assert_eq!(intel.ports, vec![22, 443]);
    assert_eq!(intel.num_vulnerabilities(), 1);
    assert_eq!(intel.attribute("org"), "Example Inc.");
    assert!(intel.certificate().is_some());
}

#[tokio::test]
async fn test_intel_rate_limit_retried_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/host/{}", ADDRESS)))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/host/{}", ADDRESS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(host_document()))
        .expect(1)
        .mount(&server)
        .await;

    let intel = intel_client(&server).lookup(ADDRESS).await;

    assert!(intel.is_ok());
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_intel_gives_up_after_second_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/host/{}", ADDRESS)))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;

    let intel = intel_client(&server).lookup(ADDRESS).await;

    assert!(matches!(intel, Err(IntelError::RateLimited)));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_intel_server_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let intel = intel_client(&server).lookup(ADDRESS).await;

    assert!(matches!(intel, Err(IntelError::Status(503))));
}

#[tokio::test]
async fn test_archive_snapshots() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdx/search/cdx"))
        .and(query_param("url", "http://example.com/"))
        .and(query_param("matchType", "exact"))
        .and(query_param("output", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[["urlkey","timestamp","original","mimetype","statuscode","digest","length"],
                ["com,example)/","20100101000000","http://example.com/","text/html","200","A","10"],
                ["com,example)/","20180101000000","http://example.com/","text/html","404","B","10"]]"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let snapshots = archive_client(&server)
        .snapshots("http://example.com/")
        .await
        .unwrap();

    assert_eq!(snapshots.len(), 2);
    assert!(snapshots[0].is_live());
    assert!(!snapshots[1].is_live());
}

#[tokio::test]
async fn test_archive_without_captures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

    let snapshots = archive_client(&server)
        .snapshots("http://never-archived.test/")
        .await
        .unwrap();

    assert!(snapshots.is_empty());
}

#[tokio::test]
async fn test_archive_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = archive_client(&server).snapshots("http://example.com/").await;

    assert!(matches!(result, Err(ArchiveError::Status(500))));
}
