use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::{
    api::{error::ApiError, response::ApiResponse, sources::StoreQuery},
    domain::User,
    state::AppState,
};

/// GET /api/v1/users
pub async fn list_users(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<User>>>, ApiError> {
    let users = state.repo.get_users().await?;
    let total = users.len();
    Ok(Json(ApiResponse::success(users).with_count(total)))
}

/// GET /api/v1/users/:username
pub async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = state
        .repo
        .get_user(&username)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {username}")))?;
    Ok(Json(ApiResponse::success(user)))
}

/// PUT /api/v1/users/:username
pub async fn put_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(q): Query<StoreQuery>,
    Json(user): Json<User>,
) -> Result<(StatusCode, Json<ApiResponse<User>>), ApiError> {
    if user.username != username {
        return Err(ApiError::BadRequest(format!(
            "body names user {} but path names {}",
            user.username, username
        )));
    }
    state.repo.store_user(&user, q.overwrite).await?;
    info!(user = %username, "user stored");
    Ok((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

/// DELETE /api/v1/users/:username
pub async fn delete_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.repo.delete_user(&username).await?;
    info!(user = %username, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
