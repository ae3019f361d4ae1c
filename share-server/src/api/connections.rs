//! OAuth connect/callback and connection management routes
//!
//! The connect route starts an authorization for the calling user and
//! remembers it under a random `state`. The vendor redirects the browser to
//! the callback with that `state`, which is how the callback finds the user
//! again: it carries no `x-user-id` header of its own.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use libsharecast::oauth::{generate_state, AuthorizationGrant, PendingAuthorization, PkcePair};
use libsharecast::types::ConnectionSummary;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{configured_platform, parse_platform};
use crate::error::{ApiError, ApiResult};
use crate::extract::UserId;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub authorization_url: String,
    pub state: String,
}

/// Query string the vendor appends to the redirect URI
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /api/social/connect/:platform
pub async fn connect(
    State(app): State<AppState>,
    UserId(user_id): UserId,
    Path(name): Path<String>,
) -> ApiResult<Json<ConnectResponse>> {
    let kind = parse_platform(&name)?;
    let platform = configured_platform(&app, kind)?;

    let state = generate_state();
    let pkce = platform.requires_pkce().then(PkcePair::generate);
    let authorization_url =
        platform.authorization_url(&state, pkce.as_ref().map(|pair| pair.challenge.as_str()))?;

    app.pending
        .insert(
            state.clone(),
            PendingAuthorization {
                user_id,
                platform: kind,
                code_verifier: pkce.map(|pair| pair.verifier),
                created_at: Utc::now(),
            },
        )
        .await;

    Ok(Json(ConnectResponse {
        authorization_url,
        state,
    }))
}

/// GET /api/social/callback/:platform?code&state
pub async fn callback(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<CallbackParams>,
) -> ApiResult<Json<ConnectionSummary>> {
    let kind = parse_platform(&name)?;

    if let Some(error) = params.error {
        let detail = params.error_description.unwrap_or(error);
        return Err(ApiError::Unauthorized(format!(
            "{} authorization was denied: {}",
            kind.display_name(),
            detail
        )));
    }

    let code = params
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing authorization code".to_string()))?;
    let state = params
        .state
        .filter(|state| !state.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing state".to_string()))?;

    let platform = configured_platform(&app, kind)?;
    let pending = app.pending.take(&state, kind).await?;

    let grant = match pending.code_verifier {
        Some(verifier) => AuthorizationGrant::new(code).with_verifier(verifier),
        None => AuthorizationGrant::new(code),
    };
    let connection = platform.exchange_token(&grant).await?;
    app.store().save_connection(&pending.user_id, &connection).await?;

    info!(
        "Connected {} account '{}' for user {}",
        kind, connection.username, pending.user_id
    );
    Ok(Json(connection.summary(Utc::now())))
}

/// GET /api/social/connections
pub async fn list_connections(
    State(app): State<AppState>,
    UserId(user_id): UserId,
) -> ApiResult<Json<Vec<ConnectionSummary>>> {
    let now = Utc::now();
    let mut summaries: Vec<ConnectionSummary> = app
        .store()
        .user_connections(&user_id)
        .await?
        .values()
        .map(|connection| connection.summary(now))
        .collect();
    summaries.sort_by_key(|summary| summary.platform);

    Ok(Json(summaries))
}

/// DELETE /api/social/connections/:platform
pub async fn disconnect(
    State(app): State<AppState>,
    UserId(user_id): UserId,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    let kind = parse_platform(&name)?;

    if app.store().delete_connection(&user_id, kind).await? {
        info!("Disconnected {} for user {}", kind, user_id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "No {} connection for this user",
            kind.display_name()
        )))
    }
}

/// POST /api/social/connections/:platform/refresh
pub async fn refresh(
    State(app): State<AppState>,
    UserId(user_id): UserId,
    Path(name): Path<String>,
) -> ApiResult<Json<ConnectionSummary>> {
    let kind = parse_platform(&name)?;

    let connections = app.store().user_connections(&user_id).await?;
    let current = connections.get(&kind).ok_or_else(|| {
        ApiError::NotFound(format!("No {} connection for this user", kind.display_name()))
    })?;
    let platform = configured_platform(&app, kind)?;

    let refreshed = platform.refresh_connection(current).await?;
    app.store().save_connection(&user_id, &refreshed).await?;

    info!("Refreshed {} connection for user {}", kind, user_id);
    Ok(Json(refreshed.summary(Utc::now())))
}

pub fn connection_routes() -> Router<AppState> {
    Router::new()
        .route("/api/social/connect/:platform", get(connect))
        .route("/api/social/callback/:platform", get(callback))
        .route("/api/social/connections", get(list_connections))
        .route("/api/social/connections/:platform", delete(disconnect))
        .route("/api/social/connections/:platform/refresh", post(refresh))
}
