//! Facebook platform implementation
//!
//! Facebook Login for the exchange and the Graph API resumable video upload:
//! `upload_phase=start` opens a session, each chunk is sent as a multipart
//! `transfer` with its `start_offset`, and `finish` attaches the post
//! metadata (including a scheduled publish time).

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, info};

use crate::chunking::split_chunks;
use crate::config::PlatformConfig;
use crate::error::{PlatformError, Result};
use crate::http;
use crate::oauth::{expires_at_from, AuthorizationGrant, TokenResponse};
use crate::platforms::{client_configured, url_with_params, EndpointDefaults, Endpoints, Platform};
use crate::types::{MediaKind, PlatformConnection, PlatformKind, UploadRequest, UploadResult};

const GRAPH_VERSION: &str = "v19.0";

const DEFAULTS: EndpointDefaults = EndpointDefaults {
    api: "https://graph.facebook.com",
    oauth: "https://graph.facebook.com",
    upload: "https://graph-video.facebook.com",
    authorize: "https://www.facebook.com",
};

const DEFAULT_SCOPES: &[&str] = &[
    "public_profile",
    "pages_show_list",
    "pages_manage_posts",
    "publish_video",
];

#[derive(Debug, Deserialize)]
struct Me {
    id: String,
    name: String,
    picture: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StartPhase {
    upload_session_id: String,
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct FinishPhase {
    #[serde(default)]
    success: bool,
}

pub struct FacebookPlatform {
    config: PlatformConfig,
    client: reqwest::Client,
    endpoints: Endpoints,
    chunk_size: usize,
}

impl FacebookPlatform {
    pub fn new(config: PlatformConfig, client: reqwest::Client, chunk_size: usize) -> Self {
        let endpoints = Endpoints::resolve(&config, &DEFAULTS);
        Self {
            config,
            client,
            endpoints,
            chunk_size,
        }
    }

    fn graph(&self, path: &str) -> String {
        http::join_url(&self.endpoints.api, &format!("/{}/{}", GRAPH_VERSION, path.trim_start_matches('/')))
    }

    fn videos_url(&self, connection: &PlatformConnection) -> String {
        http::join_url(
            &self.endpoints.upload,
            &format!("/{}/{}/videos", GRAPH_VERSION, connection.account_or_me()),
        )
    }

    async fn fetch_me(&self, access_token: &str) -> Result<Me> {
        let request = self
            .client
            .get(self.graph("/me"))
            .query(&[("fields", "id,name,picture"), ("access_token", access_token)]);
        http::send_json(request, PlatformKind::Facebook, "profile").await
    }

    /// Form fields for the `finish` phase
    fn finish_fields(request: &UploadRequest) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("title", request.title.trim().to_string()),
            ("description", request.caption()),
        ];
        if let Some(at) = request.scheduled_time {
            fields.push(("published", "false".to_string()));
            fields.push(("scheduled_publish_time", at.timestamp().to_string()));
        }
        fields
    }
}

#[async_trait]
impl Platform for FacebookPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Facebook
    }

    fn is_configured(&self) -> bool {
        client_configured(&self.config)
    }

    fn supported_media(&self) -> &[MediaKind] {
        &[MediaKind::Video]
    }

    fn supports_scheduling(&self) -> bool {
        true
    }

    fn authorization_url(&self, state: &str, _code_challenge: Option<&str>) -> Result<String> {
        let scope = self.config.scopes_or(DEFAULT_SCOPES).join(",");
        url_with_params(
            PlatformKind::Facebook,
            &self.endpoints.authorize,
            &format!("/{}/dialog/oauth", GRAPH_VERSION),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("state", state),
                ("scope", scope.as_str()),
                ("response_type", "code"),
            ],
        )
    }

    async fn exchange_token(&self, grant: &AuthorizationGrant) -> Result<PlatformConnection> {
        let request = self
            .client
            .get(http::join_url(
                &self.endpoints.oauth,
                &format!("/{}/oauth/access_token", GRAPH_VERSION),
            ))
            .query(&[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
                ("code", grant.code.as_str()),
            ]);
        let token: TokenResponse = http::send_json(request, PlatformKind::Facebook, "token").await?;
        let access_token = token.require_access_token(PlatformKind::Facebook)?;
        let me = self.fetch_me(&access_token).await?;

        let picture = me
            .picture
            .as_ref()
            .and_then(|p| p.pointer("/data/url"))
            .and_then(|url| url.as_str())
            .map(str::to_string);

        let mut connection = PlatformConnection::new(PlatformKind::Facebook, access_token, me.name);
        connection.expires_at = expires_at_from(token.expires_in, chrono::Utc::now());
        connection.account_id = Some(me.id);
        connection.profile_picture_url = picture;
        connection.scopes = token.scopes();

        info!("Connected Facebook account");
        Ok(connection)
    }

    async fn upload(&self, connection: &PlatformConnection, request: &UploadRequest) -> Result<UploadResult> {
        self.validate_request(request)?;

        let chunks = split_chunks(&request.file, self.chunk_size)?;
        let token = connection.access_token.expose_secret();
        let url = self.videos_url(connection);

        let start = self.client.post(&url).form(&[
            ("upload_phase", "start"),
            ("file_size", request.size().to_string().as_str()),
            ("access_token", token),
        ]);
        let session: StartPhase = http::send_json(start, PlatformKind::Facebook, "start upload").await?;

        info!(
            video_id = %session.video_id,
            chunks = chunks.len(),
            bytes = request.size(),
            "Facebook upload session started"
        );

        for chunk in &chunks {
            debug!(index = chunk.index, offset = chunk.offset, "Uploading Facebook chunk");

            let part = Part::stream_with_length(chunk.data.clone(), chunk.len() as u64)
                .file_name(request.file_name.clone().unwrap_or_else(|| "video".to_string()));
            let form = Form::new()
                .text("upload_phase", "transfer")
                .text("upload_session_id", session.upload_session_id.clone())
                .text("start_offset", chunk.offset.to_string())
                .text("access_token", token.to_string())
                .part("video_file_chunk", part);

            let transfer = self.client.post(&url).multipart(form);
            http::send(transfer, PlatformKind::Facebook, &format!("transfer chunk {}", chunk.index)).await?;
        }

        let mut finish_form = vec![
            ("upload_phase", "finish".to_string()),
            ("upload_session_id", session.upload_session_id.clone()),
            ("access_token", token.to_string()),
        ];
        finish_form.extend(Self::finish_fields(request));

        let finish = self.client.post(&url).form(&finish_form);
        let finished: FinishPhase = http::send_json(finish, PlatformKind::Facebook, "finish upload").await?;

        if !finished.success {
            return Err(PlatformError::Api(
                "Facebook API error (finish upload): upload was not accepted".to_string(),
            )
            .into());
        }

        Ok(UploadResult {
            post_url: format!("https://www.facebook.com/watch/?v={}", session.video_id),
            post_id: session.video_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn platform() -> FacebookPlatform {
        FacebookPlatform::new(
            PlatformConfig::new("fb-id", "fb-secret", "https://app.example.com/cb/facebook"),
            reqwest::Client::new(),
            1024,
        )
    }

    #[test]
    fn test_authorization_url_is_versioned() {
        let url = platform().authorization_url("s", None).unwrap();
        assert!(url.starts_with("https://www.facebook.com/v19.0/dialog/oauth?client_id=fb-id"));
        assert!(url.contains("publish_video"));
    }

    #[test]
    fn test_finish_fields_unscheduled() {
        let mut request = UploadRequest::new(vec![1u8], "video/mp4", "Title");
        request.description = "Body".to_string();

        let fields = FacebookPlatform::finish_fields(&request);
        assert_eq!(
            fields,
            vec![
                ("title", "Title".to_string()),
                ("description", "Title\n\nBody".to_string()),
            ]
        );
    }

    #[test]
    fn test_finish_fields_scheduled() {
        let mut request = UploadRequest::new(vec![1u8], "video/mp4", "Title");
        request.scheduled_time = Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());

        let fields = FacebookPlatform::finish_fields(&request);
        assert!(fields.contains(&("published", "false".to_string())));
        assert!(fields.contains(&("scheduled_publish_time", "1893456000".to_string())));
    }

    #[test]
    fn test_videos_url_uses_account() {
        let platform = platform();
        let mut connection = PlatformConnection::new(PlatformKind::Facebook, "t", "Page");
        assert_eq!(
            platform.videos_url(&connection),
            "https://graph-video.facebook.com/v19.0/me/videos"
        );

        connection.account_id = Some("1234".to_string());
        assert_eq!(
            platform.videos_url(&connection),
            "https://graph-video.facebook.com/v19.0/1234/videos"
        );
    }

    #[test]
    fn test_rejects_images() {
        let request = UploadRequest::new(vec![1u8], "image/png", "Photo");
        assert!(platform().validate_request(&request).unwrap_err().is_validation());
    }
}
