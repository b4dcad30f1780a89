use std::sync::Arc;

use harvester_core::{FailureKind, HarvestResult, UnitOfWork};
use harvester_engine::{
    DiscoveryError, EmbeddedJsonProfile, EmbeddedJsonStrategy, ExtractionStrategy, FetchSettings, GridProfile,
    HarvestContext, PaginationDiscovery, ReqwestFetcher, RequestProfile, RetryPolicy, WorkDiscovery,
};
use pretty_assertions::assert_eq;
use serde_json::Value;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VIEW_ITEM_LIST: &str = r#"<html><head>
<script>window.config = {};</script>
<script>
  window.dataLayer = window.dataLayer || [];
  dataLayer.push({
    "event": "view_item_list",
    "ecommerce": {
        item_list_name: "Catalogue",
        items: [
            {
                item_id: "1001",
                item_name: "Milk &amp; Honey",
                price: 7.5,
                discount: None
            },
            {
                item_id: "1002",
                item_name: "Tea &gt; Green",
                price: 12,
                discount: None
            }
        ]
    }
  });
</script></head><body></body></html>"#;

const IMPRESSIONS: &str = r#"<html><head>
<script>
  dataLayer.push({'event': 'impressions', 'ecommerce': {'impressions': [
      {'id': '11', 'brand': 'Al Rawabi',},
      {'id': '22', 'brand': 'Lipton',},
  ]}});
</script></head><body>
<div class="arc-grid">
  <div class="js-product-wrapper product-bx">
    <div class="product-info">
      <p class="product-name"><a href="/p/milk">Fresh Milk</a></p>
      <p class="product-price"><span class="price">AED 7.50</span><span class="quantity">1L</span></p>
    </div>
  </div>
  <div class="js-product-wrapper product-bx">
    <div class="product-info">
      <p class="product-name"><a href="/p/tea">Green Tea</a></p>
      <p class="product-price"><span class="price">AED 12.00</span><span class="quantity">25 bags</span></p>
    </div>
  </div>
</div>
<div class="page-numbers">
  <a href="?page=1"><div class="page-no-bx">1</div></a>
  <a href="?page=2"><div class="page-no-bx">2</div></a>
  <a href="?page=3"><div class="page-no-bx">3</div></a>
  <a href="?page=2">Next</a>
</div>
</body></html>"#;

fn context() -> HarvestContext {
    engine_logging::initialize_for_tests();
    HarvestContext::new(
        "shop",
        Arc::new(ReqwestFetcher::new(FetchSettings::default()).unwrap()),
        RequestProfile::new(),
        RetryPolicy::no_retry(),
    )
}

fn view_item_list_profile(listing_url: String) -> EmbeddedJsonProfile {
    EmbeddedJsonProfile {
        listing_url,
        page_param: "page".to_string(),
        marker: "view_item_list".to_string(),
        anchor: "\"ecommerce\":".to_string(),
        items_path: vec!["items".to_string()],
        grid: None,
        script_key: None,
    }
}

fn impressions_profile(listing_url: String) -> EmbeddedJsonProfile {
    EmbeddedJsonProfile {
        listing_url,
        page_param: "page".to_string(),
        marker: "impressions".to_string(),
        anchor: r"dataLayer\.push\(".to_string(),
        items_path: vec!["ecommerce".to_string(), "impressions".to_string()],
        grid: Some(GridProfile::new(
            "div.arc-grid div.js-product-wrapper.product-bx",
            "div.product-info p.product-name a",
            "p.product-price span.price",
            "p.product-price span.quantity",
        )),
        script_key: None,
    }
}

async fn serve(server: &MockServer, page: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path("/catalogue/"))
        .and(query_param("page", page))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html.to_string(), "text/html; charset=utf-8"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn script_items_are_repaired_and_extracted() {
    let server = MockServer::start().await;
    serve(&server, "4", VIEW_ITEM_LIST).await;

    let strategy =
        EmbeddedJsonStrategy::new(context(), view_item_list_profile(format!("{}/catalogue/", server.uri()))).unwrap();
    let result = strategy.extract(&UnitOfWork::Page(4)).await;

    let HarvestResult::Success(records) = result else {
        panic!("expected success, got {result:?}");
    };
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["item_name"], "Milk & Honey");
    assert_eq!(records[0]["discount"], Value::Null);
    assert_eq!(records[1]["item_name"], "Tea > Green");
}

#[tokio::test]
async fn grid_rows_are_merged_into_script_items() {
    let server = MockServer::start().await;
    serve(&server, "1", IMPRESSIONS).await;

    let strategy =
        EmbeddedJsonStrategy::new(context(), impressions_profile(format!("{}/catalogue/", server.uri()))).unwrap();
    let result = strategy.extract(&UnitOfWork::Page(1)).await;

    let HarvestResult::Success(records) = result else {
        panic!("expected success, got {result:?}");
    };
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["id"], "22");
    assert_eq!(records[1]["brand"], "Lipton");
    assert_eq!(records[1]["item_name"], "Green Tea");
    assert_eq!(records[1]["item_link"], "/p/tea");
    assert_eq!(records[1]["item_quantity"], "25 bags");
}

#[tokio::test]
async fn missing_marker_is_schema_mismatch() {
    let server = MockServer::start().await;
    serve(&server, "1", "<html><script>var x = 1;</script></html>").await;

    let strategy =
        EmbeddedJsonStrategy::new(context(), view_item_list_profile(format!("{}/catalogue/", server.uri()))).unwrap();
    let result = strategy.extract(&UnitOfWork::Page(1)).await;

    let HarvestResult::Failure(failure) = result else {
        panic!("expected failure");
    };
    assert_eq!(failure.kind, FailureKind::SchemaMismatch);
}

#[tokio::test]
async fn unrepairable_fragment_reports_bounded_snippet() {
    let strategy = EmbeddedJsonStrategy::new(context(), view_item_list_profile("http://unused.invalid/".into())).unwrap();
    let filler = "x".repeat(500);
    let html = format!(
        r#"<script>gtag("view_item_list", {{"ecommerce": {{items: [{{name: "{filler}", price: 7 7}}], tail: "{filler}"}}}});</script>"#
    );
    let result = strategy.parse_listing(&UnitOfWork::Page(9), &html);

    let HarvestResult::Failure(failure) = result else {
        panic!("expected failure");
    };
    assert_eq!(failure.kind, FailureKind::JsonRepairFailure);
    let excerpt = failure.context.excerpt.unwrap();
    assert!(excerpt.contains("7 7"));
    assert!(excerpt.chars().count() <= 200);
}

#[tokio::test]
async fn pagination_discovery_is_stable_across_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalogue/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(IMPRESSIONS, "text/html"))
        .expect(2)
        .mount(&server)
        .await;

    let discovery = PaginationDiscovery::new(context(), &format!("{}/catalogue/", server.uri()), "div.page-numbers a");
    let first = discovery.discover().await.unwrap();
    let second = discovery.discover().await.unwrap();

    assert_eq!(first, vec![UnitOfWork::Page(1), UnitOfWork::Page(2), UnitOfWork::Page(3)]);
    assert_eq!(first.len(), second.len());
}

#[tokio::test]
async fn absent_pagination_control_fails_discovery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalogue/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(VIEW_ITEM_LIST, "text/html"))
        .mount(&server)
        .await;

    let discovery = PaginationDiscovery::new(context(), &format!("{}/catalogue/", server.uri()), "div.page-buttons a");
    let err = discovery.discover().await.unwrap_err();
    assert!(matches!(err, DiscoveryError::MissingPagination { .. }));
}
