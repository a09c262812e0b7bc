use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    api::{error::ApiError, response::ApiResponse},
    config::EngineConfig,
    domain::{Reading, Source},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct PowerQuery {
    /// Defaults to now.
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct IntervalQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Sampling step in minutes for integration.
    pub interval: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CarbonSupport {
    pub supported: bool,
}

/// The requested step, else the configured default when it fits in the
/// interval, widened so the request stays within the sample limit. An
/// explicit step is passed through unchecked so the engine can reject it.
fn sampling_minutes(q: &IntervalQuery, engine: &EngineConfig) -> Option<i64> {
    q.interval.or_else(|| {
        let span = q.end - q.start;
        let per_sample = 60 * (i64::try_from(engine.max_samples).ok()?.max(2) - 1);
        let narrowest = (span.num_seconds() + per_sample - 1) / per_sample;
        engine
            .default_sampling_minutes
            .filter(|m| *m > 0)
            .map(|m| m.max(narrowest))
            .filter(|m| *m <= span.num_minutes())
    })
}

fn timed(reading: Reading, started: Instant) -> Json<ApiResponse<Reading>> {
    Json(ApiResponse::success(reading).with_duration(started.elapsed().as_millis() as u64))
}

/// GET /api/v1/sources/:name/latest
pub async fn latest(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<Reading>>, ApiError> {
    let started = Instant::now();
    Ok(timed(state.engine.latest(&name).await?, started))
}

/// GET /api/v1/sources/:name/power?timestamp
pub async fn power(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<PowerQuery>,
) -> Result<Json<ApiResponse<Reading>>, ApiError> {
    let started = Instant::now();
    let at = q.timestamp.unwrap_or_else(Utc::now);
    Ok(timed(state.engine.power(&name, at).await?, started))
}

/// GET /api/v1/sources/:name/energy?start&end&interval
pub async fn energy(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<IntervalQuery>,
) -> Result<Json<ApiResponse<Reading>>, ApiError> {
    let started = Instant::now();
    let sampling = sampling_minutes(&q, &state.cfg.engine);
    let reading = state.engine.energy(&name, q.start, q.end, sampling).await?;
    Ok(timed(reading, started))
}

/// GET /api/v1/sources/:name/carbon?start&end&interval
pub async fn carbon(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<IntervalQuery>,
) -> Result<Json<ApiResponse<Reading>>, ApiError> {
    let started = Instant::now();
    let sampling = sampling_minutes(&q, &state.cfg.engine);
    let reading = state.engine.carbon(&name, q.start, q.end, sampling).await?;
    Ok(timed(reading, started))
}

/// GET /api/v1/sources/:name/carbon/supported
pub async fn carbon_supported(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<CarbonSupport>>, ApiError> {
    let supported = state.engine.supports_carbon(&name).await?;
    Ok(Json(ApiResponse::success(CarbonSupport { supported })))
}

/// GET /api/v1/sources/:name/descendants
pub async fn descendants(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<Vec<Source>>>, ApiError> {
    let leaves = state.engine.descendants(&name).await?;
    let total = leaves.len();
    Ok(Json(ApiResponse::success(leaves).with_count(total)))
}
