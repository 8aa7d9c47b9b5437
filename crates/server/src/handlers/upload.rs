//! Upload handlers.
//!
//! All variants share the same shape: authenticate the bearer JWT, run the
//! intake pipeline, then sleep until `arrival + requestTime` so a dummy
//! upload is indistinguishable from a real one on the wire. The delay
//! applies to the success path only; failures return immediately.

use crate::auth::{SCOPE_EXPOSED, SCOPE_EXPOSED_NEXT_DAY, issue_next_day_jwt};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use axum::response::{IntoResponse, Response};
use lantern_core::{GaenRequest, GaenSecondDay, GaenV2UploadKeysRequest, UtcInstant};
use serde::Serialize;
use tokio::time::Instant;

/// Response body of a V1 upload: the token authorizing tomorrow's
/// delayed-key upload.
#[derive(Debug, Serialize)]
pub struct NextDayTokenResponse {
    pub token: String,
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Park until `arrival + request_time` has passed, flattening observable
/// upload timing.
async fn level_request_time(arrival: Instant, request_time: std::time::Duration) {
    tokio::time::sleep_until(arrival + request_time).await;
}

/// POST /v1/gaen/exposed
///
/// V1 body: keys plus `delayedKeyDate`. The client's same-day key is NOT
/// uploaded now; the response carries a JWT authorizing exactly that key
/// on the following day.
pub async fn exposed_v1(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GaenRequest>,
) -> ApiResult<Response> {
    let arrival = Instant::now();
    let now = state.clock.now();

    let principal = state.validator.validate(&headers, SCOPE_EXPOSED).await?;

    // The delayed day must be today give or take one day, otherwise the
    // request is stale or from a badly skewed clock.
    let delayed_day = UtcInstant::from_ten_minute_interval(request.delayed_key_date);
    let distance = (delayed_day.timestamp_millis() - now.day_start().timestamp_millis()).abs();
    if distance > time::Duration::days(1).whole_milliseconds() as i64 {
        return Err(ApiError::InvalidDate(format!(
            "delayedKeyDate {} is out of range",
            request.delayed_key_date
        )));
    }

    state
        .insert_exposed
        .insert_into_database(request.gaen_keys, &user_agent(&headers), &principal, now)
        .await?;

    let token = issue_next_day_jwt(
        &state.next_day_jwt_key,
        request.delayed_key_date,
        principal.is_fake(),
    )?;

    level_request_time(arrival, state.config.gaen.request_time()).await;
    Ok(Json(NextDayTokenResponse { token }).into_response())
}

/// POST /v1/gaen/exposednextday
///
/// Accepts exactly one key whose day matches the `delayedKeyDate` claim of
/// the JWT issued by the V1 upload.
pub async fn exposed_next_day(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GaenSecondDay>,
) -> ApiResult<Response> {
    let arrival = Instant::now();
    let now = state.clock.now();

    let principal = state
        .validator
        .validate(&headers, SCOPE_EXPOSED_NEXT_DAY)
        .await?;

    state
        .insert_next_day
        .insert_into_database(
            vec![request.delayed_key],
            &user_agent(&headers),
            &principal,
            now,
        )
        .await?;

    level_request_time(arrival, state.config.gaen.request_time()).await;
    Ok("OK".into_response())
}

/// POST /v2/gaen/exposed and /v2UMA/gaen/exposed
///
/// V2 body: keys only. Same-day keys go through the normal pipeline and
/// surface once their release bucket closes.
pub async fn exposed_v2(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GaenV2UploadKeysRequest>,
) -> ApiResult<Response> {
    let arrival = Instant::now();
    let now = state.clock.now();

    let principal = state.validator.validate(&headers, SCOPE_EXPOSED).await?;

    state
        .insert_exposed
        .insert_into_database(request.gaen_keys, &user_agent(&headers), &principal, now)
        .await?;

    level_request_time(arrival, state.config.gaen.request_time()).await;
    Ok("OK".into_response())
}
