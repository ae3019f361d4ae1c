//! YouTube platform implementation
//!
//! Google OAuth for the exchange; the Data API v3 resumable upload protocol
//! for videos. The metadata request opens an upload session whose URL comes
//! back in `Location`, and the file is then streamed to that URL in one
//! `PUT` built from the chunk plan.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures::stream;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::chunking::split_chunks;
use crate::config::PlatformConfig;
use crate::error::{PlatformError, Result};
use crate::http;
use crate::oauth::{expires_at_from, AuthorizationGrant, TokenResponse};
use crate::platforms::{
    check_length, check_request, client_configured, url_with_params, EndpointDefaults, Endpoints,
    Platform,
};
use crate::types::{MediaKind, PlatformConnection, PlatformKind, UploadRequest, UploadResult, Visibility};

const DEFAULTS: EndpointDefaults = EndpointDefaults {
    api: "https://www.googleapis.com",
    oauth: "https://oauth2.googleapis.com",
    upload: "https://www.googleapis.com",
    authorize: "https://accounts.google.com",
};

const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube.readonly",
];

pub const YOUTUBE_TITLE_LIMIT: usize = 100;
pub const YOUTUBE_DESCRIPTION_LIMIT: usize = 5000;

/// "People & Blogs"
const DEFAULT_CATEGORY_ID: &str = "22";

#[derive(Debug, Deserialize)]
struct ChannelList {
    #[serde(default)]
    items: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    snippet: ChannelSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelSnippet {
    title: String,
    custom_url: Option<String>,
    thumbnails: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Video {
    id: String,
}

pub struct YouTubePlatform {
    config: PlatformConfig,
    client: reqwest::Client,
    endpoints: Endpoints,
    chunk_size: usize,
}

impl YouTubePlatform {
    pub fn new(config: PlatformConfig, client: reqwest::Client, chunk_size: usize) -> Self {
        let endpoints = Endpoints::resolve(&config, &DEFAULTS);
        Self {
            config,
            client,
            endpoints,
            chunk_size,
        }
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let request = self
            .client
            .post(http::join_url(&self.endpoints.oauth, "/token"))
            .form(form);
        http::send_json(request, PlatformKind::YouTube, "token").await
    }

    async fn fetch_channel(&self, access_token: &str) -> Result<Channel> {
        let request = self
            .client
            .get(http::join_url(&self.endpoints.api, "/youtube/v3/channels"))
            .bearer_auth(access_token)
            .query(&[("part", "snippet"), ("mine", "true")]);

        let channels: ChannelList = http::send_json(request, PlatformKind::YouTube, "channel lookup").await?;
        channels.items.into_iter().next().ok_or_else(|| {
            PlatformError::Authentication(
                "No YouTube channel found for this Google account".to_string(),
            )
            .into()
        })
    }

    /// `status.privacyStatus` plus `publishAt` for scheduled uploads
    fn status_json(request: &UploadRequest) -> serde_json::Value {
        match request.scheduled_time {
            Some(at) => json!({
                "privacyStatus": "private",
                "publishAt": at.to_rfc3339_opts(SecondsFormat::Secs, true),
                "selfDeclaredMadeForKids": false,
            }),
            None => json!({
                "privacyStatus": match request.visibility {
                    Visibility::Public => "public",
                    Visibility::Unlisted => "unlisted",
                    Visibility::Private | Visibility::Friends => "private",
                },
                "selfDeclaredMadeForKids": false,
            }),
        }
    }

    fn snippet_json(request: &UploadRequest) -> serde_json::Value {
        json!({
            "title": request.title.trim(),
            "description": request.description,
            "tags": request.tags,
            "categoryId": DEFAULT_CATEGORY_ID,
        })
    }

    async fn start_session(&self, connection: &PlatformConnection, request: &UploadRequest) -> Result<String> {
        let metadata = json!({
            "snippet": Self::snippet_json(request),
            "status": Self::status_json(request),
        });

        let start = self
            .client
            .post(http::join_url(&self.endpoints.upload, "/upload/youtube/v3/videos"))
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header(reqwest::header::AUTHORIZATION, connection.bearer())
            .header("X-Upload-Content-Type", request.mime_type.as_str())
            .header("X-Upload-Content-Length", request.size().to_string())
            .json(&metadata);

        let response = http::send(start, PlatformKind::YouTube, "start upload session").await?;

        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                PlatformError::Api(
                    "YouTube API error (start upload session): no upload URL in Location header"
                        .to_string(),
                )
                .into()
            })
    }

    async fn set_thumbnail(&self, connection: &PlatformConnection, video_id: &str, request: &UploadRequest) -> Result<()> {
        let Some(thumbnail) = &request.thumbnail else {
            return Ok(());
        };

        let upload = self
            .client
            .post(http::join_url(&self.endpoints.upload, "/upload/youtube/v3/thumbnails/set"))
            .query(&[("videoId", video_id)])
            .header(reqwest::header::AUTHORIZATION, connection.bearer())
            .header(reqwest::header::CONTENT_TYPE, thumbnail.mime_type.as_str())
            .body(thumbnail.data.clone());

        http::send(upload, PlatformKind::YouTube, "set thumbnail").await?;
        debug!(video_id, "YouTube thumbnail set");
        Ok(())
    }
}

#[async_trait]
impl Platform for YouTubePlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::YouTube
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
        let scope = self.config.scopes_or(DEFAULT_SCOPES).join(" ");
        url_with_params(
            PlatformKind::YouTube,
            &self.endpoints.authorize,
            "/o/oauth2/v2/auth",
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("include_granted_scopes", "true"),
                ("state", state),
            ],
        )
    }

    async fn exchange_token(&self, grant: &AuthorizationGrant) -> Result<PlatformConnection> {
        let token = self
            .request_token(&[
                ("code", grant.code.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .await?;
        let access_token = token.require_access_token(PlatformKind::YouTube)?;
        let channel = self.fetch_channel(&access_token).await?;

        let picture = channel
            .snippet
            .thumbnails
            .as_ref()
            .and_then(|thumbs| thumbs.pointer("/default/url"))
            .and_then(|url| url.as_str())
            .map(str::to_string);

        let mut connection = PlatformConnection::new(
            PlatformKind::YouTube,
            access_token,
            channel.snippet.custom_url.unwrap_or(channel.snippet.title),
        );
        connection.refresh_token = token.refresh_token.clone().map(Into::into);
        connection.expires_at = expires_at_from(token.expires_in, Utc::now());
        connection.account_id = Some(channel.id);
        connection.profile_picture_url = picture;
        connection.scopes = token.scopes();

        info!("Connected YouTube channel");
        Ok(connection)
    }

    async fn refresh_connection(&self, connection: &PlatformConnection) -> Result<PlatformConnection> {
        let refresh_token = connection.refresh_token.as_ref().ok_or_else(|| {
            PlatformError::Authentication(
                "YouTube connection has no refresh token. Suggestion: Reconnect your YouTube account."
                    .to_string(),
            )
        })?;

        let token = self
            .request_token(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
                ("refresh_token", refresh_token.expose_secret()),
                ("grant_type", "refresh_token"),
            ])
            .await?;
        let access_token = token.require_access_token(PlatformKind::YouTube)?;

        // Google only returns a new refresh token when it rotates one
        let mut refreshed = connection.clone();
        refreshed.access_token = access_token.into();
        if let Some(rotated) = token.refresh_token.clone() {
            refreshed.refresh_token = Some(rotated.into());
        }
        refreshed.expires_at = expires_at_from(token.expires_in, Utc::now());
        Ok(refreshed)
    }

    fn validate_request(&self, request: &UploadRequest) -> Result<()> {
        check_request(self, request)?;
        check_length(PlatformKind::YouTube, "title", request.title.trim(), YOUTUBE_TITLE_LIMIT)?;
        check_length(
            PlatformKind::YouTube,
            "description",
            &request.description,
            YOUTUBE_DESCRIPTION_LIMIT,
        )?;

        if let Some(thumbnail) = &request.thumbnail {
            if MediaKind::from_mime(&thumbnail.mime_type) != Some(MediaKind::Image) {
                return Err(PlatformError::Validation(format!(
                    "YouTube thumbnail must be an image, got '{}'",
                    thumbnail.mime_type
                ))
                .into());
            }
        }

        Ok(())
    }

    async fn upload(&self, connection: &PlatformConnection, request: &UploadRequest) -> Result<UploadResult> {
        self.validate_request(request)?;

        let chunks = split_chunks(&request.file, self.chunk_size)?;
        let session_url = self.start_session(connection, request).await?;
        info!(chunks = chunks.len(), bytes = request.size(), "YouTube upload session opened");

        let body = reqwest::Body::wrap_stream(stream::iter(
            chunks
                .into_iter()
                .map(|chunk| Ok::<_, std::io::Error>(chunk.data)),
        ));

        let put = self
            .client
            .put(&session_url)
            .header(reqwest::header::AUTHORIZATION, connection.bearer())
            .header(reqwest::header::CONTENT_TYPE, request.mime_type.as_str())
            .header(reqwest::header::CONTENT_LENGTH, request.size().to_string())
            .body(body);

        let video: Video = http::send_json(put, PlatformKind::YouTube, "upload video").await?;

        self.set_thumbnail(connection, &video.id, request).await?;

        Ok(UploadResult {
            post_url: format!("https://www.youtube.com/watch?v={}", video.id),
            post_id: video.id,
        })
    }
}
