//! Integration tests for the batch-release download protocol.

mod common;

use axum::http::StatusCode;
use common::server::TestServer;
use common::{BASE_MS, day_interval, decode_export, get, post_json, tek, unzip_bundle};
use lantern_export::{CuckooFilter, key_hash};
use serde_json::{Value, json};
use time::Duration;

const BUCKET_MS: i64 = 7_200_000;

/// Upload one key per day for `days_back`, e.g. `[0, 1, 2]` uploads keys
/// for today, yesterday and the day before.
async fn upload_days(server: &TestServer, days_back: &[i64]) {
    let now = server.now();
    let keys: Vec<Value> = days_back
        .iter()
        .enumerate()
        .map(|(i, back)| {
            tek(
                i as u8 + 1,
                day_interval(now.minus(Duration::days(*back))),
            )
        })
        .collect();
    let (status, _) = post_json(
        &server.router,
        "/v2/gaen/exposed",
        json!({ "gaenKeys": keys }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn empty_state_returns_204_with_bundle_tag() {
    let server = TestServer::new().await;

    let (status, headers, body) = get(&server.router, "/v2UMA/gaen/exposed").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    // The clock sits at 01:00, so the current bucket started at midnight.
    assert_eq!(
        headers.get("x-key-bundle-tag").unwrap().to_str().unwrap(),
        BASE_MS.to_string()
    );
    assert_eq!(
        headers.get("expires").unwrap().to_str().unwrap(),
        "Thu, 25 Jun 2020 02:00:00 GMT"
    );
}

#[tokio::test]
async fn keys_surface_only_after_their_bucket_closes() {
    let server = TestServer::new().await;
    upload_days(&server, &[1, 2, 3, 4, 5]).await;

    // Same bucket: nothing is published yet.
    let uri = format!("/v2/gaen/exposed?lastKeyBundleTag={}", BASE_MS - BUCKET_MS);
    let (status, _, _) = get(&server.router, &uri).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // One bucket later the upload is out.
    server.advance(Duration::minutes(61));
    let (status, headers, body) = get(&server.router, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get("content-type").unwrap().to_str().unwrap(),
        "application/zip"
    );

    let (bin, sig) = unzip_bundle(&body);
    let export = decode_export(&bin);
    assert_eq!(export.keys.len(), 5);
    assert!(!sig.is_empty());

    // Deterministic artifact: a second download of the same window is
    // byte-identical.
    let (_, _, again) = get(&server.router, &uri).await;
    assert_eq!(body, again);
}

#[tokio::test]
async fn same_day_key_is_held_back_until_the_next_day() {
    let server = TestServer::new().await;
    // Keys for today and the five days before.
    upload_days(&server, &[0, 1, 2, 3, 4, 5]).await;

    // After the upload bucket closes, all but the same-day key are out.
    server.advance(Duration::minutes(61));
    let uri = format!("/v2/gaen/exposed?lastKeyBundleTag={}", BASE_MS - BUCKET_MS);
    let (_, _, body) = get(&server.router, &uri).await;
    let export = decode_export(&unzip_bundle(&body).0);
    assert_eq!(export.keys.len(), 5);

    // 01:00 the next day: the same-day key's window closed at midnight,
    // but its release bucket has not.
    server.advance(Duration::hours(23));
    let (_, _, body) = get(&server.router, &uri).await;
    let export = decode_export(&unzip_bundle(&body).0);
    assert_eq!(export.keys.len(), 5);

    // 04:00 the next day: released.
    server.advance(Duration::hours(3));
    let (_, _, body) = get(&server.router, &uri).await;
    let export = decode_export(&unzip_bundle(&body).0);
    assert_eq!(export.keys.len(), 6);
}

#[tokio::test]
async fn rewound_tag_clamps_to_retention() {
    let server = TestServer::new().await;
    upload_days(&server, &[1, 2]).await;
    server.advance(Duration::minutes(61));

    let thirty_days_ago = server.now().minus(Duration::days(30)).timestamp_millis();
    let uri = format!("/v2/gaen/exposed?lastKeyBundleTag={thirty_days_ago}");
    let (status, _, body) = get(&server.router, &uri).await;
    assert_eq!(status, StatusCode::OK);

    let export = decode_export(&unzip_bundle(&body).0);
    assert_eq!(export.keys.len(), 2);
}

#[tokio::test]
async fn misaligned_or_future_tags_are_not_found() {
    let server = TestServer::new().await;

    let misaligned = format!("/v2/gaen/exposed?lastKeyBundleTag={}", BASE_MS + 1);
    let (status, _, _) = get(&server.router, &misaligned).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let future = format!(
        "/v2/gaen/exposed?lastKeyBundleTag={}",
        BASE_MS + 4 * BUCKET_MS
    );
    let (status, _, _) = get(&server.router, &future).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn successive_tags_never_resend_earlier_buckets() {
    let server = TestServer::new().await;
    upload_days(&server, &[1, 2]).await;
    server.advance(Duration::minutes(61));

    let (_, headers, body) = get(
        &server.router,
        &format!("/v2/gaen/exposed?lastKeyBundleTag={}", BASE_MS - BUCKET_MS),
    )
    .await;
    let first = decode_export(&unzip_bundle(&body).0);
    assert_eq!(first.keys.len(), 2);
    let tag: i64 = headers
        .get("x-key-bundle-tag")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();

    // A later upload lands in a later bucket.
    let now = server.now();
    let (status, _) = post_json(
        &server.router,
        "/v2/gaen/exposed",
        json!({ "gaenKeys": [tek(9, day_interval(now.minus(Duration::days(3))))] }),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    server.advance(Duration::hours(2));

    // Resuming from the first tag returns only the new key.
    let (_, _, body) = get(
        &server.router,
        &format!("/v2/gaen/exposed?lastKeyBundleTag={tag}"),
    )
    .await;
    let second = decode_export(&unzip_bundle(&body).0);
    assert_eq!(second.keys.len(), 1);
    assert_eq!(second.keys[0].key_data.as_deref().unwrap(), [9u8; 16].as_slice());
}

#[tokio::test]
async fn v2uma_bundle_is_a_membership_filter() {
    let server = TestServer::new().await;
    upload_days(&server, &[1, 2, 3]).await;
    server.advance(Duration::minutes(61));

    let (status, _, body) = get(&server.router, "/v2UMA/gaen/exposed").await;
    assert_eq!(status, StatusCode::OK);

    let (bin, sig) = unzip_bundle(&body);
    let filter = CuckooFilter::from_bytes(&bin).unwrap();
    for byte in [1u8, 2, 3] {
        assert!(filter.contains(&key_hash(&[byte; 16])));
    }
    assert!(!filter.contains(&key_hash(&[42u8; 16])));

    use prost::Message;
    let signatures = lantern_export::proto::TekSignatureList::decode(sig.as_slice()).unwrap();
    assert_eq!(signatures.signatures.len(), 1);
    assert!(!signatures.signatures[0].signature.as_deref().unwrap_or_default().is_empty());
}

#[tokio::test]
async fn country_filters_narrow_the_download() {
    let server = TestServer::new().await;
    upload_days(&server, &[1, 2]).await;
    server.advance(Duration::minutes(61));

    // Upload country and stamped origin both default to ES.
    let (status, _, _) =
        get(&server.router, "/v2UMA/gaen/exposed?visitedCountries=ES").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) =
        get(&server.router, "/v2UMA/gaen/exposed?visitedCountries=IT").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = get(
        &server.router,
        "/v2UMA/gaen/exposed?originCountries=ES,%20DE",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) =
        get(&server.router, "/v2UMA/gaen/exposed?originCountries=DE").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn v1_download_serves_exactly_one_closed_bucket() {
    let server = TestServer::new().await;
    upload_days(&server, &[1, 2, 3]).await;
    server.advance(Duration::minutes(61));

    // The upload landed in the [00:00, 02:00) bucket.
    let (status, _, body) =
        get(&server.router, &format!("/v1/gaen/exposed/{BASE_MS}")).await;
    assert_eq!(status, StatusCode::OK);
    let export = decode_export(&unzip_bundle(&body).0);
    assert_eq!(export.keys.len(), 3);

    // The neighboring closed bucket is empty.
    let (status, _, _) = get(
        &server.router,
        &format!("/v1/gaen/exposed/{}", BASE_MS - BUCKET_MS),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Misaligned bucket addresses do not exist.
    let (status, _, _) = get(
        &server.router,
        &format!("/v1/gaen/exposed/{}", BASE_MS + 1),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn hello_endpoints_greet() {
    let server = TestServer::new().await;
    for (uri, expected) in [
        ("/v1/gaen", "V1"),
        ("/v2/gaen", "V2"),
        ("/v2UMA/gaen", "V2-UMA"),
    ] {
        let (status, headers, body) = get(&server.router, uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get("x-hello").unwrap().to_str().unwrap(), "lantern");
        assert!(String::from_utf8(body).unwrap().ends_with(expected));
    }
}
