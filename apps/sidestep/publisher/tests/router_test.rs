//! Router tests for the publisher service
//!
//! The dispatcher runs against in-memory fakes; these tests only check the
//! HTTP contract (status codes, payloads, dedup reporting).

use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain_social_publishing::lock::ManualClock;
use domain_social_publishing::testing::{
    FakeInspector, InMemoryCatalog, RecordingAssetHost, RecordingTransport, TrackingExecutor,
};
use domain_social_publishing::*;
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // For oneshot()

struct Service {
    dispatcher: PublishDispatcher,
    executor: TrackingExecutor,
}

fn service() -> Service {
    let settings = PublisherSettings::default();
    let transport = RecordingTransport::new();
    let inspector: Arc<dyn ImageInspector> = Arc::new(FakeInspector::new());
    let catalog = InMemoryCatalog::new();
    catalog.insert(Product {
        id: 1,
        brand: "Asics".into(),
        name: "Gel-Kayano 14".into(),
        base_price: dec!(7200),
        images: vec![],
        sizes: vec![],
        is_published: false,
        published_at: None,
    });
    let executor = TrackingExecutor::new();

    let dispatcher = PublishDispatcher::new(
        settings.clone(),
        ImageResolver::new(None, "/media/", Arc::new(RecordingAssetHost::new())),
        Arc::new(FacebookPublisher::new(transport.clone(), &settings, inspector.clone())),
        Arc::new(InstagramPublisher::new(transport, &settings, inspector)),
        Arc::new(catalog),
        Arc::new(InMemoryPublishLock::with_clock(ManualClock::new())),
        Arc::new(executor.clone()),
    )
    .unwrap();

    Service {
        dispatcher,
        executor,
    }
}

async fn json_body(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_provider_configuration() {
    let s = service();
    let app = sidestep_publisher::router(s.dispatcher);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["providers"]["facebook"], false);
    assert_eq!(body["providers"]["instagram"], false);
}

#[tokio::test]
async fn test_product_created_is_accepted() {
    let s = service();
    let app = sidestep_publisher::router(s.dispatcher);

    let response = app
        .oneshot(post_json(
            "/events/product-created",
            json!({
                "id": 1,
                "brand": "Asics",
                "name": "Gel-Kayano 14",
                "base_price": "7200",
                "images": [],
                "sizes": [{"size": "US 8", "stock": 2}]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(
        json_body(response.into_body()).await,
        json!({"outcome": "scheduled"})
    );
    s.executor.join_all().await;
    assert_eq!(s.executor.spawned(), 1);
}

#[tokio::test]
async fn test_duplicate_image_event_reports_skip() {
    let s = service();
    let app = sidestep_publisher::router(s.dispatcher);
    let event = json!({
        "product_id": 1,
        "image": {"name": "products/kayano.jpg", "url": "https://cdn.test/kayano.jpg"},
        "order": 0
    });

    let first = app
        .clone()
        .oneshot(post_json("/events/image-added", event.clone()))
        .await
        .unwrap();
    let second = app
        .oneshot(post_json("/events/image-added", event))
        .await
        .unwrap();

    assert_eq!(first.status(), StatusCode::ACCEPTED);
    assert_eq!(second.status(), StatusCode::ACCEPTED);
    assert_eq!(
        json_body(second.into_body()).await,
        json!({"outcome": "skipped_duplicate"})
    );
    s.executor.join_all().await;
    assert_eq!(s.executor.spawned(), 1);
}

#[tokio::test]
async fn test_malformed_event_is_rejected() {
    let s = service();
    let app = sidestep_publisher::router(s.dispatcher);

    let response = app
        .oneshot(post_json("/events/image-added", json!({"order": 1})))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert_eq!(s.executor.spawned(), 0);
}
