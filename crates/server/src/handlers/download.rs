//! Download handlers: the batch-release protocol.
//!
//! Clients page through closed release buckets with an opaque
//! `lastKeyBundleTag`. The server clamps rewound tags to the retention
//! window, refuses misaligned or future tags with 404, answers 204 plus
//! headers when the window is empty, and otherwise returns the signed zip.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES};
use axum::response::{IntoResponse, Response};
use lantern_core::{TemporaryExposureKey, UtcInstant};
use lantern_export::BundleVersion;
use lantern_store::ExposedKeyRepo;
use serde::Deserialize;

const HEADER_X_KEY_BUNDLE_TAG: &str = "x-key-bundle-tag";

/// Query parameters of the incremental download endpoints. Country lists
/// arrive comma-separated ("IT, DE, PT").
#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    #[serde(rename = "lastKeyBundleTag")]
    pub last_key_bundle_tag: Option<i64>,
    #[serde(rename = "visitedCountries")]
    pub visited_countries: Option<String>,
    #[serde(rename = "originCountries")]
    pub origin_countries: Option<String>,
}

fn split_countries(raw: Option<&str>) -> Vec<String> {
    raw.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// GET /v2/gaen/exposed?lastKeyBundleTag=T
pub async fn exposed_v2(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    batch_release(&state, BundleVersion::V2, &query).await
}

/// GET /v2UMA/gaen/exposed?lastKeyBundleTag=T&visitedCountries=…&originCountries=…
pub async fn exposed_v2_uma(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    batch_release(&state, BundleVersion::V2Uma, &query).await
}

/// GET /v1/gaen/exposed/{batchReleaseTime}
///
/// Serves exactly the one closed bucket starting at `batchReleaseTime`.
pub async fn exposed_v1(
    State(state): State<AppState>,
    Path(batch_release_time): Path<i64>,
) -> ApiResult<Response> {
    let now = state.clock.now();
    let bucket = state.config.gaen.release_bucket();
    let since = UtcInstant::from_epoch_millis(batch_release_time);

    if !state.validation.is_valid_batch_release_time(since, now) {
        return Err(ApiError::NotFound(format!(
            "invalid batch release time {batch_release_time}"
        )));
    }

    // Cap the window at the bucket's end so exactly one bucket is served;
    // an unclosed bucket yields an empty set.
    let window_now = now.min(since.plus(bucket));
    let keys = collect_keys(&state, since, window_now, &[], &[]).await?;

    respond(&state, BundleVersion::V1, keys, since, now)
}

async fn batch_release(
    state: &AppState,
    version: BundleVersion,
    query: &DownloadQuery,
) -> ApiResult<Response> {
    let now = state.clock.now();
    let bucket = state.config.gaen.release_bucket();

    // Rewinds beyond retention clamp to the oldest full bucket.
    let min_tag = now
        .minus(state.config.gaen.retention())
        .bucket_start(bucket);
    let since = match query.last_key_bundle_tag {
        Some(tag) if tag >= min_tag.timestamp_millis() => UtcInstant::from_epoch_millis(tag),
        _ => min_tag,
    };

    if !state.validation.is_valid_batch_release_time(since, now) {
        return Err(ApiError::NotFound(format!(
            "invalid key bundle tag {since}"
        )));
    }

    let visited = split_countries(query.visited_countries.as_deref());
    let origins = split_countries(query.origin_countries.as_deref());
    let keys = collect_keys(state, since, now, &visited, &origins).await?;

    respond(state, version, keys, since, now)
}

/// Union of real and synthetic keys in the window; the artifact makes no
/// distinction.
async fn collect_keys(
    state: &AppState,
    since: UtcInstant,
    now: UtcInstant,
    visited: &[String],
    origins: &[String],
) -> ApiResult<Vec<TemporaryExposureKey>> {
    let mut keys = state
        .store
        .get_sorted_exposed_since(since, now, visited, origins)
        .await?;
    keys.extend(
        state
            .fake_keys
            .exposed_since(since, now, visited, origins)
            .await?,
    );
    Ok(keys)
}

fn respond(
    state: &AppState,
    version: BundleVersion,
    keys: Vec<TemporaryExposureKey>,
    since: UtcInstant,
    now: UtcInstant,
) -> ApiResult<Response> {
    let bucket = state.config.gaen.release_bucket();
    let key_bundle_tag = now.bucket_start(bucket);
    let expires = now.next_bucket(bucket);

    if keys.is_empty() {
        return Ok((
            StatusCode::NO_CONTENT,
            [
                (HEADER_X_KEY_BUNDLE_TAG, key_bundle_tag.to_string()),
                (EXPIRES.as_str(), expires.to_rfc1123()),
            ],
        )
            .into_response());
    }

    let zip = state.bundler.assemble(&keys, version, since, key_bundle_tag)?;
    let max_age = state.config.gaen.exposed_list_cache_control().whole_seconds();

    Ok((
        StatusCode::OK,
        [
            (HEADER_X_KEY_BUNDLE_TAG, key_bundle_tag.to_string()),
            (EXPIRES.as_str(), expires.to_rfc1123()),
            (CACHE_CONTROL.as_str(), format!("public, max-age={max_age}")),
            (CONTENT_TYPE.as_str(), "application/zip".to_string()),
        ],
        Body::from(zip),
    )
        .into_response())
}
