//! Share history routes

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use libsharecast::{Database, ShareRecord};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::extract::UserId;
use crate::AppState;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

fn history(state: &AppState) -> ApiResult<&Database> {
    state
        .history
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Share history is not enabled".to_string()))
}

/// GET /api/social/shares?limit=N
pub async fn list_shares(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<Vec<ShareRecord>>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let shares = history(&state)?.list_shares(&user_id, limit).await?;
    Ok(Json(shares))
}

/// GET /api/social/shares/:id
///
/// Shares of other users are reported as missing.
pub async fn get_share(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(share_id): Path<String>,
) -> ApiResult<Json<ShareRecord>> {
    history(&state)?
        .get_share(&share_id)
        .await?
        .filter(|share| share.user_id == user_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Share {} not found", share_id)))
}

pub fn history_routes() -> Router<AppState> {
    Router::new()
        .route("/api/social/shares", get(list_shares))
        .route("/api/social/shares/:id", get(get_share))
}
