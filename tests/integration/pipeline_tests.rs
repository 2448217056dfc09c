//! Integration tests for the extraction pipeline
//!
//! A wiremock server stands in for the probed sites; rows land in a
//! file-backed SQLite store inside a temporary directory.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use urlscope::config::ResolverConfig;
use urlscope::features::lexical::extract_lexical;
use urlscope::features::{ContentFeatures, FeatureError, LexicalFeatures};
use urlscope::pipeline::{KEY_FIELD, LABEL_FIELD};
use urlscope::storage::StoreQuery;
use urlscope::{
    FeatureFamily, FeatureRecord, FeatureSet, FeatureStore, FeatureValue, Pipeline, RawUrlRecord,
    ResolvedUrl, Resolver, SqliteStorage, UrlLabel,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Header-family set that always fails
struct Broken;

#[async_trait]
impl FeatureSet for Broken {
    fn family(&self) -> FeatureFamily {
        FeatureFamily::Header
    }

    fn names(&self) -> Vec<&'static str> {
        vec!["hd_first", "hd_second"]
    }

    async fn extract(&self, _resolved: &ResolvedUrl) -> Result<FeatureRecord, FeatureError> {
        Err(FeatureError::Extraction {
            family: FeatureFamily::Header,
            message: "certificate store unavailable".into(),
        })
    }
}

fn resolver() -> Resolver {
    Resolver::from_config(&ResolverConfig {
        probe_timeout_secs: 3,
        max_redirects: 10,
        user_agent: "urlscope-test".to_string(),
        max_body_bytes: 64 * 1024,
    })
    .expect("Failed to build resolver")
}

fn build_pipeline(
    db: &std::path::Path,
    sets: Vec<Arc<dyn FeatureSet>>,
) -> (Pipeline<SqliteStorage>, Arc<Mutex<SqliteStorage>>) {
    let storage = SqliteStorage::new(db).expect("Failed to open database");
    let store = Arc::new(Mutex::new(storage));
    let pipeline = Pipeline::new(resolver(), sets, store.clone())
        .expect("Feature sets should be disjoint")
        .with_workers(2);
    (pipeline, store)
}

async fn mount_page(server: &MockServer, at: &str, expected_hits: u64) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(
                    "<html><head><title>Shop</title></head>\
                     <body><p>Buy now. Limited offer.</p><a href=\"/x\">x</a></body></html>",
                ),
        )
        .expect(expected_hits)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_rows_stored_once_across_runs() {
    let server = MockServer::start().await;
    mount_page(&server, "/shop", 1).await;
    mount_page(&server, "/about", 1).await;

    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("features.db");
    let records = vec![
        RawUrlRecord::new(format!("{}/shop", server.uri()), Some(UrlLabel::Phishing)),
        RawUrlRecord::new(format!("{}/about", server.uri()), Some(UrlLabel::Benign)),
        RawUrlRecord::new(format!("{}/shop", server.uri()), Some(UrlLabel::Phishing)),
    ];

    {
        let (pipeline, _) = build_pipeline(
            &db,
            vec![Arc::new(LexicalFeatures), Arc::new(ContentFeatures)],
        );
        let stats = pipeline.run(records.clone()).await.unwrap();
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.skipped, 1);
    }

    // A second run over the same database performs no probes at all
    let (pipeline, store) = build_pipeline(
        &db,
        vec![Arc::new(LexicalFeatures), Arc::new(ContentFeatures)],
    );
    let stats = pipeline.run(records).await.unwrap();
    assert_eq!(stats.inserted, 0);
    assert_eq!(stats.skipped, 3);

    let storage = store.lock().unwrap();
    assert_eq!(storage.count_records().unwrap(), 2);
    let phishing = storage
        .find(&StoreQuery::new().field(LABEL_FIELD, "phishing"))
        .unwrap();
    assert_eq!(phishing.len(), 1);
    assert_eq!(
        phishing[0].get("ct_status_code"),
        Some(&FeatureValue::Int(200))
    );
}

#[tokio::test]
async fn test_failing_set_yields_nulls_and_others_survive() {
    let server = MockServer::start().await;
    mount_page(&server, "/shop", 1).await;

    let dir = tempfile::tempdir().unwrap();
    let (pipeline, store) = build_pipeline(
        &dir.path().join("features.db"),
        vec![
            Arc::new(LexicalFeatures),
            Arc::new(ContentFeatures),
            Arc::new(Broken),
        ],
    );

    let url = format!("{}/shop", server.uri());
    let stats = pipeline
        .run(vec![RawUrlRecord::new(url.clone(), None)])
        .await
        .unwrap();
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.failed_sets, 1);

    let rows = store.lock().unwrap().find(&StoreQuery::new()).unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.key(), Some(url.as_str()));
    assert_eq!(row.get("hd_first"), Some(&FeatureValue::Null));
    assert_eq!(row.get("hd_second"), Some(&FeatureValue::Null));
    assert_eq!(row.get(LABEL_FIELD), Some(&FeatureValue::Null));
    assert!(row.get("ct_num_words").is_some_and(|v| !v.is_null()));
    assert!(row.get("lx_url_length").is_some_and(|v| !v.is_null()));
}

#[tokio::test]
async fn test_lexical_row_reproducible_from_stored_key() {
    let server = MockServer::start().await;
    mount_page(&server, "/shop", 1).await;

    let dir = tempfile::tempdir().unwrap();
    let (pipeline, store) = build_pipeline(
        &dir.path().join("features.db"),
        vec![Arc::new(LexicalFeatures)],
    );

    let url = format!("{}/shop?id=42&ref=mail", server.uri());
    pipeline
        .run(vec![RawUrlRecord::new(url, Some(UrlLabel::Malware))])
        .await
        .unwrap();

    let rows = store.lock().unwrap().find(&StoreQuery::new()).unwrap();
    let row = &rows[0];
    let raw = row.get(KEY_FIELD).and_then(FeatureValue::as_str).unwrap();

    // No redirect happened, so the raw URL is also the resolved one
    let recomputed = extract_lexical(&ResolvedUrl::offline(raw, Some(UrlLabel::Malware)));
    for (name, value) in recomputed.values() {
        assert_eq!(
            row.get(name).map(FeatureValue::to_json),
            Some(value.to_json()),
            "mismatch on {}",
            name
        );
    }
}

#[tokio::test]
async fn test_unreachable_urls_are_still_stored() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, store) = build_pipeline(
        &dir.path().join("features.db"),
        vec![Arc::new(LexicalFeatures), Arc::new(ContentFeatures)],
    );

    let stats = pipeline
        .run(vec![
            RawUrlRecord::new("http://host.invalid/login", Some(UrlLabel::Phishing)),
            RawUrlRecord::new("shop.host.invalid/cart", Some(UrlLabel::Benign)),
        ])
        .await
        .unwrap();

    assert_eq!(stats.inserted, 2);
    assert_eq!(stats.failed_sets, 0);
    let rows = store.lock().unwrap().find(&StoreQuery::new()).unwrap();
    for row in &rows {
        assert_eq!(row.get("ct_status_code"), Some(&FeatureValue::Null));
    }
}
