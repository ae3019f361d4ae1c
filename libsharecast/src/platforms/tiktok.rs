//! TikTok platform implementation
//!
//! Login Kit for the OAuth exchange and the Content Posting API for uploads.
//! Videos go up as a chunked transfer: `init` creates a publish session and
//! returns an upload URL, each chunk is `PUT` there with a `Content-Range`
//! header, and a final status fetch reports the outcome.

use async_trait::async_trait;
use chrono::Utc;
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
    api: "https://open.tiktokapis.com",
    oauth: "https://open.tiktokapis.com",
    upload: "https://open-upload.tiktokapis.com",
    authorize: "https://www.tiktok.com",
};

const DEFAULT_SCOPES: &[&str] = &["user.info.basic", "video.publish", "video.upload"];

/// Caption limit for direct posts
pub const TIKTOK_CAPTION_LIMIT: usize = 2200;

const USER_FIELDS: &str = "open_id,avatar_url,display_name,username";

/// Envelope used by every TikTok v2 endpoint except the token endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<EnvelopeError>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    code: String,
    #[serde(default)]
    message: String,
}

impl<T> Envelope<T> {
    /// `data`, unless the envelope carries a non-`ok` error code
    fn into_data(self, context: &str) -> Result<T> {
        if let Some(error) = &self.error {
            if error.code != "ok" {
                return Err(PlatformError::Api(format!(
                    "TikTok API error ({}): {}: {}",
                    context, error.code, error.message
                ))
                .into());
            }
        }

        self.data.ok_or_else(|| {
            PlatformError::Api(format!("TikTok API error ({}): response had no data", context)).into()
        })
    }
}

/// Token endpoint reply; errors arrive with a 200 status
#[derive(Debug, Deserialize)]
struct TikTokToken {
    #[serde(flatten)]
    token: TokenResponse,
    open_id: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    user: TikTokUser,
}

#[derive(Debug, Deserialize)]
struct TikTokUser {
    open_id: Option<String>,
    avatar_url: Option<String>,
    display_name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InitData {
    publish_id: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    status: String,
    fail_reason: Option<String>,
    // Field name as spelled by the API
    #[serde(default)]
    publicaly_available_post_id: Vec<serde_json::Value>,
}

pub struct TikTokPlatform {
    config: PlatformConfig,
    client: reqwest::Client,
    endpoints: Endpoints,
    chunk_size: usize,
}

impl TikTokPlatform {
    pub fn new(config: PlatformConfig, client: reqwest::Client, chunk_size: usize) -> Self {
        let endpoints = Endpoints::resolve(&config, &DEFAULTS);
        Self {
            config,
            client,
            endpoints,
            chunk_size,
        }
    }

    fn token_url(&self) -> String {
        http::join_url(&self.endpoints.oauth, "/v2/oauth/token/")
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let request = self.client.post(self.token_url()).form(form);
        let reply: TikTokToken = http::send_json(request, PlatformKind::TikTok, "token").await?;

        if let Some(error) = reply.error.filter(|e| !e.is_empty()) {
            return Err(PlatformError::Authentication(format!(
                "TikTok token exchange failed: {}: {}",
                error,
                reply.error_description.unwrap_or_default()
            ))
            .into());
        }

        debug!(open_id = ?reply.open_id, "TikTok token issued");
        Ok(reply.token)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<TikTokUser> {
        let request = self
            .client
            .get(http::join_url(&self.endpoints.api, "/v2/user/info/"))
            .bearer_auth(access_token)
            .query(&[("fields", USER_FIELDS)]);

        let envelope: Envelope<UserData> =
            http::send_json(request, PlatformKind::TikTok, "user info").await?;
        Ok(envelope.into_data("user info")?.user)
    }

    fn connection_from(&self, token: TokenResponse, access_token: String, user: TikTokUser) -> PlatformConnection {
        let username = user
            .username
            .or(user.display_name)
            .unwrap_or_else(|| "tiktok user".to_string());

        let mut connection = PlatformConnection::new(PlatformKind::TikTok, access_token, username);
        connection.refresh_token = token.refresh_token.clone().map(Into::into);
        connection.expires_at = expires_at_from(token.expires_in, Utc::now());
        connection.account_id = user.open_id;
        connection.profile_picture_url = user.avatar_url;
        connection.scopes = token.scopes();
        connection
    }

    fn privacy_level(visibility: Visibility) -> &'static str {
        match visibility {
            Visibility::Public => "PUBLIC_TO_EVERYONE",
            Visibility::Friends => "MUTUAL_FOLLOW_FRIENDS",
            Visibility::Private | Visibility::Unlisted => "SELF_ONLY",
        }
    }
}

#[async_trait]
impl Platform for TikTokPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::TikTok
    }

    fn is_configured(&self) -> bool {
        client_configured(&self.config)
    }

    fn supported_media(&self) -> &[MediaKind] {
        &[MediaKind::Video]
    }

    fn authorization_url(&self, state: &str, code_challenge: Option<&str>) -> Result<String> {
        let scope = self.config.scopes_or(DEFAULT_SCOPES).join(",");
        let mut params = vec![
            ("client_key", self.config.client_id.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("state", state),
        ];
        if let Some(challenge) = code_challenge {
            params.push(("code_challenge", challenge));
            params.push(("code_challenge_method", "S256"));
        }

        url_with_params(PlatformKind::TikTok, &self.endpoints.authorize, "/v2/auth/authorize/", &params)
    }

    async fn exchange_token(&self, grant: &AuthorizationGrant) -> Result<PlatformConnection> {
        let mut form = vec![
            ("client_key", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("code", grant.code.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        if let Some(verifier) = grant.code_verifier.as_deref() {
            form.push(("code_verifier", verifier));
        }

        let token = self.request_token(&form).await?;
        let access_token = token.require_access_token(PlatformKind::TikTok)?;
        let user = self.fetch_user(&access_token).await?;

        info!("Connected TikTok account");
        Ok(self.connection_from(token, access_token, user))
    }

    async fn refresh_connection(&self, connection: &PlatformConnection) -> Result<PlatformConnection> {
        let refresh_token = connection.refresh_token.as_ref().ok_or_else(|| {
            PlatformError::Authentication(
                "TikTok connection has no refresh token. Suggestion: Reconnect your TikTok account."
                    .to_string(),
            )
        })?;

        let form = [
            ("client_key", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose_secret()),
        ];

        let token = self.request_token(&form).await?;
        let access_token = token.require_access_token(PlatformKind::TikTok)?;

        let mut refreshed = connection.clone();
        refreshed.access_token = access_token.into();
        if let Some(new_refresh) = token.refresh_token.clone() {
            refreshed.refresh_token = Some(new_refresh.into());
        }
        refreshed.expires_at = expires_at_from(token.expires_in, Utc::now());
        let scopes = token.scopes();
        if !scopes.is_empty() {
            refreshed.scopes = scopes;
        }
        Ok(refreshed)
    }

    fn validate_request(&self, request: &UploadRequest) -> Result<()> {
        check_request(self, request)?;
        check_length(PlatformKind::TikTok, "caption", &request.caption(), TIKTOK_CAPTION_LIMIT)
    }

    async fn upload(&self, connection: &PlatformConnection, request: &UploadRequest) -> Result<UploadResult> {
        self.validate_request(request)?;

        let chunks = split_chunks(&request.file, self.chunk_size)?;
        let total = request.size();

        let body = json!({
            "post_info": {
                "title": request.caption(),
                "privacy_level": Self::privacy_level(request.visibility),
                "disable_duet": false,
                "disable_comment": false,
                "disable_stitch": false,
            },
            "source_info": {
                "source": "FILE_UPLOAD",
                "video_size": total,
                "chunk_size": (self.chunk_size as u64).min(total),
                "total_chunk_count": chunks.len(),
            }
        });

        let init_request = self
            .client
            .post(http::join_url(&self.endpoints.api, "/v2/post/publish/video/init/"))
            .header(reqwest::header::AUTHORIZATION, connection.bearer())
            .json(&body);
        let init: Envelope<InitData> =
            http::send_json(init_request, PlatformKind::TikTok, "init upload").await?;
        let init = init.into_data("init upload")?;

        info!(
            publish_id = %init.publish_id,
            chunks = chunks.len(),
            bytes = total,
            "TikTok upload session created"
        );

        for chunk in &chunks {
            debug!(index = chunk.index, range = %chunk.content_range(total), "Uploading TikTok chunk");
            let put = self
                .client
                .put(&init.upload_url)
                .header(reqwest::header::CONTENT_TYPE, request.mime_type.as_str())
                .header(reqwest::header::CONTENT_RANGE, chunk.content_range(total))
                .body(chunk.data.clone());
            http::send(put, PlatformKind::TikTok, &format!("upload chunk {}", chunk.index)).await?;
        }

        let status_request = self
            .client
            .post(http::join_url(&self.endpoints.api, "/v2/post/publish/status/fetch/"))
            .header(reqwest::header::AUTHORIZATION, connection.bearer())
            .json(&json!({ "publish_id": init.publish_id }));
        let status: Envelope<StatusData> =
            http::send_json(status_request, PlatformKind::TikTok, "publish status").await?;
        let status = status.into_data("publish status")?;

        if status.status == "FAILED" {
            return Err(PlatformError::Api(format!(
                "TikTok publish failed: {}",
                status.fail_reason.unwrap_or_else(|| "unknown reason".to_string())
            ))
            .into());
        }

        let post_id = status
            .publicaly_available_post_id
            .first()
            .map(|id| match id {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            });

        let post_url = match &post_id {
            Some(id) => format!("https://www.tiktok.com/@{}/video/{}", connection.username, id),
            None => format!("https://www.tiktok.com/@{}", connection.username),
        };

        Ok(UploadResult {
            post_id: post_id.unwrap_or(init.publish_id),
            post_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn platform() -> TikTokPlatform {
        TikTokPlatform::new(
            PlatformConfig::new("tt-key", "tt-secret", "https://app.example.com/cb/tiktok"),
            reqwest::Client::new(),
            1024,
        )
    }

    #[test]
    fn test_authorization_url() {
        let url = platform().authorization_url("st4te", None).unwrap();
        assert!(url.starts_with("https://www.tiktok.com/v2/auth/authorize/?client_key=tt-key"));
        assert!(url.contains("scope=user.info.basic%2Cvideo.publish%2Cvideo.upload"));
        assert!(url.contains("state=st4te"));
        assert!(!url.contains("code_challenge"));
    }

    #[test]
    fn test_rejects_images_and_schedules() {
        let platform = platform();
        let image = UploadRequest::new(vec![1u8], "image/jpeg", "Photo");
        assert!(platform.validate_request(&image).unwrap_err().is_validation());

        let mut scheduled = UploadRequest::new(vec![1u8], "video/mp4", "Later");
        scheduled.scheduled_time = Some(Utc::now() + Duration::hours(3));
        assert!(platform
            .validate_request(&scheduled)
            .unwrap_err()
            .to_string()
            .contains("scheduled"));
    }

    #[test]
    fn test_caption_limit() {
        let mut request = UploadRequest::new(vec![1u8], "video/mp4", "t");
        request.description = "x".repeat(TIKTOK_CAPTION_LIMIT);
        assert!(platform().validate_request(&request).is_err());
    }

    #[test]
    fn test_privacy_levels() {
        assert_eq!(TikTokPlatform::privacy_level(Visibility::Public), "PUBLIC_TO_EVERYONE");
        assert_eq!(TikTokPlatform::privacy_level(Visibility::Friends), "MUTUAL_FOLLOW_FRIENDS");
        assert_eq!(TikTokPlatform::privacy_level(Visibility::Unlisted), "SELF_ONLY");
    }

    #[test]
    fn test_envelope_error_code() {
        let envelope: Envelope<serde_json::Value> = serde_json::from_str(
            r#"{"data":{},"error":{"code":"spam_risk_too_many_posts","message":"daily cap"}}"#,
        )
        .unwrap();

        let err = envelope.into_data("init upload").unwrap_err();
        assert!(err.to_string().contains("spam_risk_too_many_posts: daily cap"));
    }

    #[test]
    fn test_envelope_ok_code() {
        let envelope: Envelope<serde_json::Value> = serde_json::from_str(
            r#"{"data":{"publish_id":"p1"},"error":{"code":"ok","message":""}}"#,
        )
        .unwrap();

        assert_eq!(envelope.into_data("init upload").unwrap()["publish_id"], "p1");
    }
}
