//! POST /api/social/share

use axum::extract::{Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use libsharecast::form::ShareFields;
use libsharecast::{PlatformSelection, ShareReport};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ApiResult;
use crate::extract::UserId;
use crate::AppState;

/// Share outcome returned to the client
///
/// `success` reports that the share was dispatched; per-platform failures
/// are in `results`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: ShareReport,
}

/// Read the multipart form into share fields
///
/// `file` and `thumbnail` are binary parts; every other part is text.
async fn read_form(mut multipart: Multipart) -> ApiResult<ShareFields> {
    let mut fields = ShareFields::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                fields.file_name = field.file_name().map(str::to_string);
                fields.file_content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?;
                debug!("Received file part: {} bytes", data.len());
                fields.file = Some(data);
            }
            "thumbnail" => {
                fields.thumbnail_content_type = field.content_type().map(str::to_string);
                fields.thumbnail = Some(field.bytes().await?);
            }
            _ => {
                let value = field.text().await?;
                fields.set_text(&name, value);
            }
        }
    }

    Ok(fields)
}

pub async fn share(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    multipart: Multipart,
) -> ApiResult<Json<ShareResponse>> {
    let fields = read_form(multipart).await?;
    let (request, selection) = fields.into_request(state.defaults.visibility)?;
    let selection = selection.unwrap_or_else(|| {
        state
            .defaults
            .platforms
            .iter()
            .copied()
            .collect::<PlatformSelection>()
    });

    let report = state.dispatcher.share(&user_id, &request, &selection).await?;
    info!(
        share_id = %report.share_id,
        succeeded = report.succeeded(),
        failed = report.failed(),
        "Share finished"
    );

    Ok(Json(ShareResponse {
        success: true,
        report,
    }))
}

pub fn share_routes() -> Router<AppState> {
    Router::new().route("/api/social/share", post(share))
}
