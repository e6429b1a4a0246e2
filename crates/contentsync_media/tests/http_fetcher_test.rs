use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use contentsync_media::{AssetFetcher, HttpAssetFetcher, MediaError, OutboundPolicy};

async fn start_asset_host() -> (String, tokio::task::JoinHandle<()>) {
    let router = Router::new()
        .route(
            "/uploads/a.png",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], b"png-bytes".to_vec()) }),
        )
        .route(
            "/moved.png",
            get(|| async {
                (
                    StatusCode::FOUND,
                    [(header::LOCATION, "http://localhost:1/secret.png")],
                )
                    .into_response()
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    (format!("http://{addr}"), handle)
}

fn trusted_fetcher() -> HttpAssetFetcher {
    let policy = OutboundPolicy::default().with_trusted_host("127.0.0.1");
    HttpAssetFetcher::new(policy, Duration::from_secs(5)).expect("client")
}

#[tokio::test]
async fn downloads_into_temp_file() {
    let (base, _server) = start_asset_host().await;
    let fetcher = trusted_fetcher();

    let asset = fetcher
        .fetch(&format!("{base}/uploads/a.png"))
        .await
        .expect("fetch");

    assert_eq!(asset.size, 9);
    assert_eq!(asset.mime_type().essence_str(), "image/png");
    let bytes = tokio::fs::read(asset.file.path()).await.expect("read");
    assert_eq!(bytes, b"png-bytes");
}

#[tokio::test]
async fn missing_asset_reports_status() {
    let (base, _server) = start_asset_host().await;
    let fetcher = trusted_fetcher();

    let err = fetcher
        .fetch(&format!("{base}/uploads/missing.png"))
        .await
        .expect_err("404");
    assert!(matches!(err, MediaError::HttpStatus { status: 404, .. }));
}

#[tokio::test]
async fn redirect_to_internal_host_is_not_followed() {
    let (base, _server) = start_asset_host().await;
    let fetcher = trusted_fetcher();

    let err = fetcher
        .fetch(&format!("{base}/moved.png"))
        .await
        .expect_err("redirect stopped");
    assert!(matches!(err, MediaError::HttpStatus { status: 302, .. }));
}

#[tokio::test]
async fn loopback_is_refused_without_trust() {
    let (base, _server) = start_asset_host().await;
    let fetcher =
        HttpAssetFetcher::new(OutboundPolicy::default(), Duration::from_secs(5)).expect("client");

    let err = fetcher
        .fetch(&format!("{base}/uploads/a.png"))
        .await
        .expect_err("blocked");
    assert!(matches!(err, MediaError::BlockedHost(_)));
}
