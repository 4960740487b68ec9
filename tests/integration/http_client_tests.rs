//! Integration tests for the reqwest-backed Graph client
//!
//! These tests use wiremock to stand in for the Graph API and check what the
//! client and the retry loop make of real HTTP responses.

use fb_pages_crawler::config::{parse_config, Config};
use fb_pages_crawler::graph::{
    classify, ErrorKind, FetchOutcome, GraphClient, HttpGraphClient, OperatorLog,
    RateLimitedFetcher, RetryPolicy, TransportError,
};
use fb_pages_crawler::url::GraphEndpoint;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    parse_config(&format!(
        r#"
        [graph]
        base-url = "{}/v2.3"
        access-token = "tok"
        timeout-secs = 5

        [retry]
        max-attempts = 3
        transient-delay-ms = 0
        throttle-delay-ms = 0

        [storage]
        database-path = ":memory:"
        "#,
        server.uri()
    ))
    .expect("Failed to parse test config")
}

fn fetcher(config: &Config) -> RateLimitedFetcher {
    let client = HttpGraphClient::new(&config.graph).expect("Failed to build client");
    RateLimitedFetcher::new(
        Arc::new(client),
        RetryPolicy::from_config(config),
        OperatorLog::disabled(),
    )
}

#[tokio::test]
async fn test_success_document_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2.3/42/feed"))
        .and(query_param("access_token", "tok"))
        .and(query_param("limit", "500"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "42_1"}]})))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let endpoint = GraphEndpoint::from_config(&config.graph).unwrap();
    let client = HttpGraphClient::new(&config.graph).unwrap();

    let document = client
        .get(&endpoint.feed("42", 500, None, None))
        .await
        .expect("Request failed");

    assert_eq!(document["data"][0]["id"], "42_1");
    assert_eq!(classify(Some(&document)).kind, ErrorKind::Ok);
}

#[tokio::test]
async fn test_error_status_still_yields_provider_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2.3/42"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 190, "message": "Error validating access token"}
        })))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let client = HttpGraphClient::new(&config.graph).unwrap();

    let document = client
        .get(&format!("{}/v2.3/42?access_token=tok", server.uri()))
        .await
        .expect("Request failed");

    let classification = classify(Some(&document));
    assert_eq!(classification.kind, ErrorKind::Fatal);
    assert_eq!(classification.code, Some(190));
}

#[tokio::test]
async fn test_non_json_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>Internal error</html>"))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let client = HttpGraphClient::new(&config.graph).unwrap();

    let result = client.get(&format!("{}/v2.3/42", server.uri())).await;

    match result {
        Err(TransportError::Decode { status, .. }) => assert_eq!(status, 500),
        other => panic!("expected decode error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fetcher_retries_throttled_then_succeeds() {
    let server = MockServer::start().await;
    // Mounted first, so it answers the first request only
    Mock::given(method("GET"))
        .and(path("/v2.3/42/feed"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 4, "message": "Application request limit reached"}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2.3/42/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let endpoint = GraphEndpoint::from_config(&config.graph).unwrap();

    let outcome = fetcher(&config)
        .fetch(&endpoint.feed("42", 500, None, None), Some(500))
        .await;

    assert!(!outcome.is_abandoned());
    assert_eq!(outcome.attempts(), 2);
}

#[tokio::test]
async fn test_fetcher_shrinks_oversized_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2.3/42/feed"))
        .and(query_param("limit", "500"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"code": 1, "message": "Please reduce the amount of data you're asking for"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2.3/42/feed"))
        .and(query_param("limit", "250"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "42_1"}]})))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let endpoint = GraphEndpoint::from_config(&config.graph).unwrap();

    let outcome = fetcher(&config)
        .fetch(&endpoint.feed("42", 500, None, None), Some(500))
        .await;

    match outcome {
        FetchOutcome::Fetched {
            limit, attempts, ..
        } => {
            assert_eq!(limit, Some(250));
            assert_eq!(attempts, 2);
        }
        other => panic!("expected a fetched page, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fetcher_gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .expect(3)
        .mount(&server)
        .await;

    let config = config_for(&server);

    let outcome = fetcher(&config)
        .fetch(&format!("{}/v2.3/42/feed?access_token=tok", server.uri()), None)
        .await;

    match outcome {
        FetchOutcome::Abandoned { kind, attempts, .. } => {
            assert_eq!(kind, ErrorKind::Transient);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected abandonment, got {:?}", other),
    }
}
