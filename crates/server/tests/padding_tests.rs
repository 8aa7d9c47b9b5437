//! Integration tests for fake-key padding in downloads.

mod common;

use axum::http::StatusCode;
use common::server::TestServer;
use common::{day_interval, decode_export, get, post_json, tek, unzip_bundle};
use serde_json::json;
use std::collections::HashSet;
use time::Duration;

async fn padded_server() -> TestServer {
    TestServer::with_config(|config| {
        config.fake_keys.enabled = true;
        config.fake_keys.amount = 10;
        config.gaen.retention_days = 14;
    })
    .await
}

#[tokio::test]
async fn padding_fills_every_retained_day() {
    let server = padded_server().await;
    server
        .state
        .fake_keys
        .update_fake_keys(server.now())
        .await
        .unwrap();

    // Two buckets later the padding bucket has closed.
    server.advance(Duration::hours(4));
    let (status, _, body) = get(&server.router, "/v2/gaen/exposed").await;
    assert_eq!(status, StatusCode::OK);

    let export = decode_export(&unzip_bundle(&body).0);
    assert_eq!(export.keys.len(), 140);

    // Synthetic data is uncorrelated across days and shaped like real
    // keys.
    let distinct: HashSet<&[u8]> = export
        .keys
        .iter()
        .map(|key| key.key_data.as_deref().unwrap())
        .collect();
    assert_eq!(distinct.len(), 140);
    let days: HashSet<i32> = export
        .keys
        .iter()
        .map(|key| key.rolling_start_interval_number.unwrap())
        .collect();
    assert_eq!(days.len(), 14);
    for key in &export.keys {
        assert_eq!(key.rolling_period, Some(144));
        assert_eq!(key.key_data.as_deref().unwrap().len(), 16);
    }
}

#[tokio::test]
async fn exports_union_real_and_synthetic_keys() {
    let server = padded_server().await;
    server
        .state
        .fake_keys
        .update_fake_keys(server.now())
        .await
        .unwrap();

    server.advance(Duration::hours(4));
    let now = server.now();
    let (status, _) = post_json(
        &server.router,
        "/v2/gaen/exposed",
        json!({ "gaenKeys": [
            tek(1, day_interval(now.minus(Duration::days(2)))),
            tek(2, day_interval(now.minus(Duration::days(3)))),
        ] }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    server.advance(Duration::hours(2));
    let (status, _, body) = get(&server.router, "/v2/gaen/exposed").await;
    assert_eq!(status, StatusCode::OK);

    let export = decode_export(&unzip_bundle(&body).0);
    assert_eq!(export.keys.len(), 142);

    // The artifact is sorted over the union; synthetic keys are not
    // segregated.
    let mut sorted = export.keys.clone();
    sorted.sort_by(|a, b| a.key_data.cmp(&b.key_data));
    assert_eq!(sorted, export.keys);
}

#[tokio::test]
async fn padding_absent_when_disabled() {
    let server = TestServer::new().await;
    server
        .state
        .fake_keys
        .update_fake_keys(server.now())
        .await
        .unwrap();

    server.advance(Duration::hours(4));
    let (status, _, _) = get(&server.router, "/v2/gaen/exposed").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
