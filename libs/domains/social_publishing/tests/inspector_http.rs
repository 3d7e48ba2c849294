//! HttpImageInspector against a local axum server

use axum::Router;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use domain_social_publishing::testing::RecordingAssetHost;
use domain_social_publishing::{HttpImageInspector, ImageInspector, PublishError, UploadSource};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn image_response(bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, HeaderValue::from_static("image/png"))], bytes).into_response()
}

/// HEAD is refused, GET serves the image
async fn get_only(method: Method) -> Response {
    if method == Method::HEAD {
        StatusCode::METHOD_NOT_ALLOWED.into_response()
    } else {
        image_response(png(10, 10))
    }
}

async fn serve() -> SocketAddr {
    let app = Router::new()
        .route("/square.png", get(|| async { image_response(png(400, 400)) }))
        .route("/tall.png", get(|| async { image_response(png(300, 900)) }))
        .route("/page", get(|| async { "<html>not an image</html>" }))
        .route("/get-only.png", any(get_only))
        .route("/moved.png", get(|| async {
            (StatusCode::FOUND, [(header::LOCATION, "/square.png")]).into_response()
        }))
        .route("/broken.png", get(|| async {
            ([(header::CONTENT_TYPE, "image/png")], "garbage").into_response()
        }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn inspector(assets: &RecordingAssetHost) -> HttpImageInspector {
    HttpImageInspector::new(Arc::new(assets.clone()), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_verify_accepts_images() {
    let addr = serve().await;
    let report = inspector(&RecordingAssetHost::new())
        .verify(&format!("http://{}/square.png", addr))
        .await;

    assert!(report.ok, "{report}");
    assert_eq!(report.status, Some(200));
    assert_eq!(report.content_type.as_deref(), Some("image/png"));
}

#[tokio::test]
async fn test_verify_rejects_html() {
    let addr = serve().await;
    let report = inspector(&RecordingAssetHost::new())
        .verify(&format!("http://{}/page", addr))
        .await;

    assert!(!report.ok);
    assert!(report.content_type.unwrap().starts_with("text/plain"));
}

#[tokio::test]
async fn test_verify_falls_back_to_get() {
    let addr = serve().await;
    let report = inspector(&RecordingAssetHost::new())
        .verify(&format!("http://{}/get-only.png", addr))
        .await;

    assert!(report.ok, "{report}");
    assert_eq!(report.status, Some(200));
}

#[tokio::test]
async fn test_verify_follows_redirects() {
    let addr = serve().await;
    let report = inspector(&RecordingAssetHost::new())
        .verify(&format!("http://{}/moved.png", addr))
        .await;

    assert!(report.ok, "{report}");
    assert!(report.final_url.ends_with("/square.png"));
}

#[tokio::test]
async fn test_verify_captures_network_errors() {
    // nothing listens on port 9 of the loopback interface
    let report = inspector(&RecordingAssetHost::new())
        .verify("http://127.0.0.1:9/a.png")
        .await;

    assert!(!report.ok);
    assert!(report.status.is_none());
    assert!(report.error.is_some());
}

#[tokio::test]
async fn test_compliant_image_keeps_its_url() {
    let addr = serve().await;
    let assets = RecordingAssetHost::new();
    let url = format!("http://{}/square.png", addr);

    let fixed = inspector(&assets).ensure_instagram_compatible(&url).await.unwrap();

    assert_eq!(fixed, url);
    assert!(assets.uploads().is_empty());
}

#[tokio::test]
async fn test_tall_image_is_cropped_and_reuploaded() {
    let addr = serve().await;
    let assets = RecordingAssetHost::new();

    let fixed = inspector(&assets)
        .ensure_instagram_compatible(&format!("http://{}/tall.png", addr))
        .await
        .unwrap();

    assert_eq!(fixed, "https://assets.test/products/resized/1.jpg");
    let uploads = assets.uploads();
    assert_eq!(uploads.len(), 1);
    let (source, folder) = &uploads[0];
    assert_eq!(folder, "products/resized");
    match source {
        UploadSource::Bytes { bytes, filename } => {
            assert_eq!(filename, "tall-ig.jpg");
            let cropped = image::load_from_memory(bytes).unwrap();
            assert_eq!((cropped.width(), cropped.height()), (300, 375));
        }
        other => panic!("unexpected upload source: {other:?}"),
    }
}

#[tokio::test]
async fn test_undecodable_image_is_an_error() {
    let addr = serve().await;
    let assets = RecordingAssetHost::new();

    let result = inspector(&assets)
        .ensure_instagram_compatible(&format!("http://{}/broken.png", addr))
        .await;

    assert!(result.is_err());
    assert!(assets.uploads().is_empty());
}

#[tokio::test]
async fn test_oversized_image_is_not_downloaded() {
    let addr = serve().await;
    let assets = RecordingAssetHost::new();
    let url = format!("http://{}/tall.png", addr);

    let err = inspector(&assets)
        .with_max_bytes(64)
        .ensure_instagram_compatible(&url)
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::ImageDecode(ref msg) if msg.contains("64 byte")), "{err}");
    assert!(assets.uploads().is_empty());
}

#[tokio::test]
async fn test_image_within_limit_is_processed() {
    let addr = serve().await;
    let assets = RecordingAssetHost::new();
    let url = format!("http://{}/square.png", addr);
    let size = png(400, 400).len();

    let fixed = inspector(&assets)
        .with_max_bytes(size)
        .ensure_instagram_compatible(&url)
        .await
        .unwrap();

    assert_eq!(fixed, url);
}
