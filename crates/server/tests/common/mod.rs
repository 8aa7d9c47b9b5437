//! Shared test utilities.

pub mod server;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lantern_core::{TEN_MINUTES_MS, UtcInstant};
use serde_json::{Value, json};
use tower::ServiceExt;

/// 2020-06-25 00:00:00 UTC; aligned to both the day and the 2h bucket.
#[allow(dead_code)]
pub const BASE_MS: i64 = 1_593_043_200_000;

/// The 10-minute interval of the day containing `instant`.
#[allow(dead_code)]
pub fn day_interval(instant: UtcInstant) -> u32 {
    (instant.day_start().timestamp_millis() / TEN_MINUTES_MS) as u32
}

/// JSON body of one full-day key.
#[allow(dead_code)]
pub fn tek(byte: u8, start: u32) -> Value {
    json!({
        "keyData": STANDARD.encode(vec![byte; 16]),
        "rollingStartNumber": start,
        "rollingPeriod": 144,
        "transmissionRiskLevel": 0,
        "fake": 0,
    })
}

/// POST a JSON body, returning status and response bytes.
#[allow(dead_code)]
pub async fn post_json(
    router: &Router,
    uri: &str,
    body: Value,
    bearer: Option<&str>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("User-Agent", "org.example.lantern;1.0;iOS;14.0");
    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, bytes)
}

/// GET a path, returning status, headers and body bytes.
#[allow(dead_code)]
pub async fn get(router: &Router, uri: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .header("User-Agent", "org.example.lantern;1.0;iOS;14.0")
        .body(Body::empty())
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, headers, bytes)
}

/// Unzip an export bundle into (export.bin, export.sig).
#[allow(dead_code)]
pub fn unzip_bundle(bytes: &[u8]) -> (Vec<u8>, Vec<u8>) {
    use std::io::Read;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    let mut bin = Vec::new();
    archive
        .by_name("export.bin")
        .unwrap()
        .read_to_end(&mut bin)
        .unwrap();
    let mut sig = Vec::new();
    archive
        .by_name("export.sig")
        .unwrap()
        .read_to_end(&mut sig)
        .unwrap();
    (bin, sig)
}

/// Decode the protobuf key export out of an `export.bin`.
#[allow(dead_code)]
pub fn decode_export(bin: &[u8]) -> lantern_export::proto::TemporaryExposureKeyExport {
    use prost::Message;
    let header = lantern_export::proto::EXPORT_BIN_HEADER;
    assert!(bin.starts_with(header), "missing export header");
    lantern_export::proto::TemporaryExposureKeyExport::decode(&bin[header.len()..]).unwrap()
}
