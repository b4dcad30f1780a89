use std::sync::Arc;
use std::time::Duration;

use harvester_core::FailureKind;
use harvester_engine::{
    FetchFailure, FetchSettings, Fetcher, HarvestContext, PageRequest, ReqwestFetcher, RequestProfile, RetryPolicy,
};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(url: &str) -> PageRequest {
    PageRequest::new(&Arc::new(RequestProfile::new()), url, &[]).unwrap()
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn fetcher_returns_decoded_text_and_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalogue/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default()).unwrap();
    let url = format!("{}/catalogue/", server.uri());
    let output = fetcher.fetch(&request(&url)).await.expect("fetch ok");

    assert_eq!(output.text, "<html>ok</html>");
    assert_eq!(output.metadata.requested_url, url);
    assert_eq!(output.metadata.status, 200);
    assert_eq!(output.metadata.encoding_label, "UTF-8");
    assert!(output.metadata.content_type.unwrap().starts_with("text/html"));
}

#[tokio::test]
async fn profile_headers_and_query_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v8/categories/F1"))
        .and(header("Appid", "Reactweb"))
        .and(query_param("currentPage", "2"))
        .and(query_param("pageSize", "60"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = HarvestContext::new(
        "shop",
        Arc::new(ReqwestFetcher::new(FetchSettings::default()).unwrap()),
        RequestProfile::new()
            .header("Appid", "Reactweb")
            .query("currentPage", "0")
            .query("pageSize", "60"),
        RetryPolicy::no_retry(),
    );
    let url = format!("{}/api/v8/categories/F1", server.uri());
    let request = ctx.request(&url, &[("currentPage", "2".to_string())]).unwrap();
    ctx.get(&request).await.expect("fetch ok");
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default()).unwrap();
    let url = format!("{}/missing", server.uri());
    let err = fast_retry(3).fetch(&fetcher, &request(&url)).await.unwrap_err();

    assert_eq!(err.kind, FetchFailure::HttpStatus(404));
    assert_eq!(err.failure_kind(), FailureKind::HttpStatus(404));
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{\"ok\":true}", "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default()).unwrap();
    let url = format!("{}/flaky", server.uri());
    let output = fast_retry(3).fetch(&fetcher, &request(&url)).await.expect("third attempt succeeds");
    assert_eq!(output.text, "{\"ok\":true}");
}

#[tokio::test]
async fn retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default()).unwrap();
    let url = format!("{}/down", server.uri());
    let err = fast_retry(2).fetch(&fetcher, &request(&url)).await.unwrap_err();
    assert_eq!(err.failure_kind(), FailureKind::TransientNetwork);
}

#[tokio::test]
async fn unsupported_content_type_is_refused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/image"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8, 1, 2], "image/png"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default()).unwrap();
    let url = format!("{}/image", server.uri());
    let err = fetcher.fetch(&request(&url)).await.unwrap_err();
    assert!(matches!(err.kind, FetchFailure::UnsupportedContentType { .. }));
    assert_eq!(err.failure_kind(), FailureKind::InvalidResponse);
}

#[tokio::test]
async fn oversized_body_is_refused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("x".repeat(64), "text/html"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings {
        max_bytes: 16,
        ..FetchSettings::default()
    })
    .unwrap();
    let url = format!("{}/big", server.uri());
    let err = fetcher.fetch(&request(&url)).await.unwrap_err();
    assert!(matches!(err.kind, FetchFailure::TooLarge { .. }));
}
