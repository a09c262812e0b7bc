use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    api::{error::ApiError, response::ApiResponse},
    domain::{Properties, Reading, Source},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct StoreQuery {
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteReadingsQuery {
    /// Delete only the reading at this instant instead of all of them.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Body of `POST /sources/:name/readings`. The source comes from the path.
#[derive(Debug, Deserialize)]
pub struct NewReading {
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Deleted {
    pub deleted: u64,
}

async fn require_source(state: &AppState, name: &str) -> Result<Source, ApiError> {
    state
        .repo
        .get_source(name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("source {name}")))
}

/// GET /api/v1/sources
pub async fn list_sources(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Source>>>, ApiError> {
    let sources = state.repo.get_sources().await?;
    let total = sources.len();
    Ok(Json(ApiResponse::success(sources).with_count(total)))
}

/// GET /api/v1/sources/:name
pub async fn get_source(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<Source>>, ApiError> {
    Ok(Json(ApiResponse::success(require_source(&state, &name).await?)))
}

/// PUT /api/v1/sources/:name
pub async fn put_source(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<StoreQuery>,
    Json(source): Json<Source>,
) -> Result<(StatusCode, Json<ApiResponse<Source>>), ApiError> {
    if source.name != name {
        return Err(ApiError::BadRequest(format!(
            "body names source {} but path names {}",
            source.name, name
        )));
    }

    state.repo.store_source(&source, q.overwrite).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(source))))
}

/// DELETE /api/v1/sources/:name
pub async fn delete_source(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.repo.delete_source(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/sources/:name/readings?start&end
pub async fn list_readings(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(range): Query<RangeQuery>,
) -> Result<Json<ApiResponse<Vec<Reading>>>, ApiError> {
    require_source(&state, &name).await?;
    let readings = state.repo.get_readings(&name, range.start, range.end).await?;
    let total = readings.len();
    Ok(Json(ApiResponse::success(readings).with_count(total)))
}

/// POST /api/v1/sources/:name/readings
pub async fn post_reading(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<NewReading>,
) -> Result<(StatusCode, Json<ApiResponse<Reading>>), ApiError> {
    let reading = Reading {
        properties: body.properties,
        ..Reading::new(name, body.timestamp, body.tool)
    };
    state.repo.store_reading(&reading).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(reading))))
}

/// DELETE /api/v1/sources/:name/readings[?timestamp]
pub async fn delete_readings(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<DeleteReadingsQuery>,
) -> Result<Json<ApiResponse<Deleted>>, ApiError> {
    let deleted = match q.timestamp {
        Some(timestamp) => {
            state.repo.delete_reading(&name, timestamp).await?;
            1
        }
        None => state.repo.delete_readings(&name).await?,
    };
    info!(source = %name, deleted, "readings deleted");
    Ok(Json(ApiResponse::success(Deleted { deleted })))
}
