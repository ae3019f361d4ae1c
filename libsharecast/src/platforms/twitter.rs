//! Twitter (X) platform implementation
//!
//! OAuth 2.0 authorization code flow with PKCE, chunked media upload
//! (`INIT`, `APPEND` per segment, `FINALIZE`) and a v2 tweet carrying the
//! media id.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::chunking::split_chunks;
use crate::config::PlatformConfig;
use crate::error::{PlatformError, Result};
use crate::http;
use crate::oauth::{expires_at_from, AuthorizationGrant, TokenResponse};
use crate::platforms::{
    check_length, check_request, url_with_params, EndpointDefaults, Endpoints, Platform,
};
use crate::types::{MediaKind, PlatformConnection, PlatformKind, UploadRequest, UploadResult};

const DEFAULTS: EndpointDefaults = EndpointDefaults {
    api: "https://api.twitter.com",
    oauth: "https://api.twitter.com",
    upload: "https://upload.twitter.com",
    authorize: "https://twitter.com",
};

const DEFAULT_SCOPES: &[&str] = &[
    "tweet.read",
    "tweet.write",
    "users.read",
    "media.write",
    "offline.access",
];

pub const TWITTER_CAPTION_LIMIT: usize = 280;

/// Upper bound on `STATUS` checks while media is processing
const MAX_STATUS_CHECKS: usize = 20;

/// Longest wait honoured from `check_after_secs`
const MAX_STATUS_WAIT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    data: TwitterUser,
}

#[derive(Debug, Deserialize)]
struct TwitterUser {
    id: String,
    username: String,
    profile_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaInit {
    media_id_string: String,
}

#[derive(Debug, Deserialize)]
struct MediaStatus {
    processing_info: Option<ProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct ProcessingInfo {
    state: String,
    check_after_secs: Option<u64>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TweetEnvelope {
    data: Tweet,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
}

pub struct TwitterPlatform {
    config: PlatformConfig,
    client: reqwest::Client,
    endpoints: Endpoints,
    chunk_size: usize,
}

impl TwitterPlatform {
    pub fn new(config: PlatformConfig, client: reqwest::Client, chunk_size: usize) -> Self {
        let endpoints = Endpoints::resolve(&config, &DEFAULTS);
        Self {
            config,
            client,
            endpoints,
            chunk_size,
        }
    }

    fn media_url(&self) -> String {
        http::join_url(&self.endpoints.upload, "/1.1/media/upload.json")
    }

    /// Token request with HTTP basic client auth when a secret is configured
    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let mut request = self
            .client
            .post(http::join_url(&self.endpoints.oauth, "/2/oauth2/token"))
            .form(form);
        if self.config.has_secret() {
            request = request.basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            );
        }
        http::send_json(request, PlatformKind::Twitter, "token").await
    }

    async fn fetch_user(&self, access_token: &str) -> Result<TwitterUser> {
        let request = self
            .client
            .get(http::join_url(&self.endpoints.api, "/2/users/me"))
            .bearer_auth(access_token)
            .query(&[("user.fields", "profile_image_url")]);
        let envelope: UserEnvelope = http::send_json(request, PlatformKind::Twitter, "profile").await?;
        Ok(envelope.data)
    }

    fn media_category(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::Video => "tweet_video",
            MediaKind::Image => "tweet_image",
        }
    }

    /// Wait for server-side processing to finish, if FINALIZE reported any
    async fn await_processing(
        &self,
        connection: &PlatformConnection,
        media_id: &str,
        mut info: Option<ProcessingInfo>,
    ) -> Result<()> {
        for _ in 0..MAX_STATUS_CHECKS {
            let Some(current) = info.take() else {
                return Ok(());
            };

            match current.state.as_str() {
                "succeeded" => return Ok(()),
                "failed" => {
                    let reason = current
                        .error
                        .as_ref()
                        .map(|e| http::vendor_message(&e.to_string()))
                        .unwrap_or_else(|| "media processing failed".to_string());
                    return Err(PlatformError::Api(format!("Twitter media processing failed: {}", reason)).into());
                }
                _ => {
                    let wait = current.check_after_secs.unwrap_or(1).min(MAX_STATUS_WAIT_SECS);
                    debug!(media_id, state = %current.state, wait, "Twitter media still processing");
                    sleep(Duration::from_secs(wait)).await;

                    let status = self
                        .client
                        .get(self.media_url())
                        .header(reqwest::header::AUTHORIZATION, connection.bearer())
                        .query(&[("command", "STATUS"), ("media_id", media_id)]);
                    let status: MediaStatus =
                        http::send_json(status, PlatformKind::Twitter, "media status").await?;
                    info = status.processing_info;
                }
            }
        }

        Err(PlatformError::Api("Twitter media processing did not finish in time".to_string()).into())
    }
}

#[async_trait]
impl Platform for TwitterPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Twitter
    }

    /// Public clients have no secret, so only id and redirect are required
    fn is_configured(&self) -> bool {
        self.config.enabled && self.config.is_complete()
    }

    fn supported_media(&self) -> &[MediaKind] {
        &[MediaKind::Image, MediaKind::Video]
    }

    fn requires_pkce(&self) -> bool {
        true
    }

    fn authorization_url(&self, state: &str, code_challenge: Option<&str>) -> Result<String> {
        let challenge = code_challenge.ok_or_else(|| {
            PlatformError::Validation("Twitter authorization requires a PKCE code challenge".to_string())
        })?;
        let scope = self.config.scopes_or(DEFAULT_SCOPES).join(" ");

        url_with_params(
            PlatformKind::Twitter,
            &self.endpoints.authorize,
            "/i/oauth2/authorize",
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
                ("code_challenge", challenge),
                ("code_challenge_method", "S256"),
            ],
        )
    }

    async fn exchange_token(&self, grant: &AuthorizationGrant) -> Result<PlatformConnection> {
        let verifier = grant.code_verifier.as_deref().ok_or_else(|| {
            PlatformError::Validation("Twitter token exchange requires the PKCE code verifier".to_string())
        })?;

        let token = self
            .request_token(&[
                ("code", grant.code.as_str()),
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code_verifier", verifier),
            ])
            .await?;
        let access_token = token.require_access_token(PlatformKind::Twitter)?;
        let user = self.fetch_user(&access_token).await?;

        let mut connection = PlatformConnection::new(PlatformKind::Twitter, access_token, user.username);
        connection.refresh_token = token.refresh_token.clone().map(Into::into);
        connection.expires_at = expires_at_from(token.expires_in, Utc::now());
        connection.account_id = Some(user.id);
        connection.profile_picture_url = user.profile_image_url;
        connection.scopes = token.scopes();

        info!("Connected Twitter account");
        Ok(connection)
    }

    async fn refresh_connection(&self, connection: &PlatformConnection) -> Result<PlatformConnection> {
        let refresh_token = connection.refresh_token.as_ref().ok_or_else(|| {
            PlatformError::Authentication(
                "Twitter connection has no refresh token. Suggestion: Reconnect your Twitter account."
                    .to_string(),
            )
        })?;

        let token = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
                ("client_id", self.config.client_id.as_str()),
            ])
            .await?;
        let access_token = token.require_access_token(PlatformKind::Twitter)?;

        let mut refreshed = connection.clone();
        refreshed.access_token = access_token.into();
        refreshed.refresh_token = token.refresh_token.clone().map(Into::into).or(refreshed.refresh_token);
        refreshed.expires_at = expires_at_from(token.expires_in, Utc::now());
        Ok(refreshed)
    }

    fn validate_request(&self, request: &UploadRequest) -> Result<()> {
        check_request(self, request)?;
        check_length(PlatformKind::Twitter, "caption", &request.caption(), TWITTER_CAPTION_LIMIT)
    }

    async fn upload(&self, connection: &PlatformConnection, request: &UploadRequest) -> Result<UploadResult> {
        self.validate_request(request)?;

        let chunks = split_chunks(&request.file, self.chunk_size)?;
        let total = request.size().to_string();

        let init = self
            .client
            .post(self.media_url())
            .header(reqwest::header::AUTHORIZATION, connection.bearer())
            .form(&[
                ("command", "INIT"),
                ("total_bytes", total.as_str()),
                ("media_type", request.mime_type.as_str()),
                ("media_category", Self::media_category(request.media_kind)),
            ]);
        let media: MediaInit = http::send_json(init, PlatformKind::Twitter, "media init").await?;
        let media_id = media.media_id_string;

        info!(media_id = %media_id, chunks = chunks.len(), "Twitter media upload started");

        for chunk in &chunks {
            debug!(segment = chunk.index, "Appending Twitter media segment");
            let form = Form::new()
                .text("command", "APPEND")
                .text("media_id", media_id.clone())
                .text("segment_index", chunk.index.to_string())
                .part(
                    "media",
                    Part::stream_with_length(chunk.data.clone(), chunk.len() as u64).file_name("media"),
                );

            let append = self
                .client
                .post(self.media_url())
                .header(reqwest::header::AUTHORIZATION, connection.bearer())
                .multipart(form);
            http::send(append, PlatformKind::Twitter, &format!("append segment {}", chunk.index)).await?;
        }

        let finalize = self
            .client
            .post(self.media_url())
            .header(reqwest::header::AUTHORIZATION, connection.bearer())
            .form(&[("command", "FINALIZE"), ("media_id", media_id.as_str())]);
        let finalized: MediaStatus = http::send_json(finalize, PlatformKind::Twitter, "media finalize").await?;

        self.await_processing(connection, &media_id, finalized.processing_info)
            .await?;

        let tweet = self
            .client
            .post(http::join_url(&self.endpoints.api, "/2/tweets"))
            .header(reqwest::header::AUTHORIZATION, connection.bearer())
            .json(&json!({
                "text": request.caption(),
                "media": { "media_ids": [media_id] },
            }));
        let tweet: TweetEnvelope = http::send_json(tweet, PlatformKind::Twitter, "create tweet").await?;

        Ok(UploadResult {
            post_url: format!("https://x.com/{}/status/{}", connection.username, tweet.data.id),
            post_id: tweet.data.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::PkcePair;

    fn platform() -> TwitterPlatform {
        TwitterPlatform::new(
            PlatformConfig::new("tw-id", "", "https://app.example.com/cb/twitter"),
            reqwest::Client::new(),
            1024,
        )
    }

    #[test]
    fn test_public_client_is_configured() {
        assert!(platform().is_configured());
        assert!(platform().requires_pkce());
    }

    #[test]
    fn test_authorization_url_requires_challenge() {
        let platform = platform();
        assert!(platform.authorization_url("s", None).unwrap_err().is_validation());

        let pkce = PkcePair::generate();
        let url = platform.authorization_url("s", Some(pkce.challenge.as_str())).unwrap();
        assert!(url.starts_with("https://twitter.com/i/oauth2/authorize?response_type=code"));
        assert!(url.contains(&format!("code_challenge={}", pkce.challenge)));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("offline.access"));
    }

    #[tokio::test]
    async fn test_exchange_without_verifier_fails_before_network() {
        let err = platform()
            .exchange_token(&AuthorizationGrant::new("code"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_caption_limit() {
        let platform = platform();
        let ok = UploadRequest::new(vec![1u8], "image/png", "a".repeat(TWITTER_CAPTION_LIMIT));
        assert!(platform.validate_request(&ok).is_ok());

        let mut long = ok.clone();
        long.tags = vec!["overflow".to_string()];
        assert!(platform.validate_request(&long).unwrap_err().is_validation());
    }

    #[test]
    fn test_media_category() {
        assert_eq!(TwitterPlatform::media_category(MediaKind::Video), "tweet_video");
        assert_eq!(TwitterPlatform::media_category(MediaKind::Image), "tweet_image");
    }
}
