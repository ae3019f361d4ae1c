//! Instagram platform implementation
//!
//! Instagram API with Instagram Login. Publishing is the two-step container
//! flow: create a media container pointing at a URL the Graph API can
//! fetch, then publish it. A failed publish leaves the container behind.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::PlatformConfig;
use crate::error::{PlatformError, Result};
use crate::http;
use crate::oauth::{expires_at_from, AuthorizationGrant, TokenResponse};
use crate::platforms::{
    check_length, check_request, client_configured, url_with_params, EndpointDefaults, Endpoints,
    Platform,
};
use crate::types::{MediaKind, PlatformConnection, PlatformKind, UploadRequest, UploadResult};

const DEFAULTS: EndpointDefaults = EndpointDefaults {
    api: "https://graph.instagram.com",
    oauth: "https://api.instagram.com",
    upload: "https://graph.instagram.com",
    authorize: "https://www.instagram.com",
};

const DEFAULT_SCOPES: &[&str] = &["instagram_business_basic", "instagram_business_content_publish"];

pub const INSTAGRAM_CAPTION_LIMIT: usize = 2200;

/// Short-lived token reply; `user_id` is a number in practice
#[derive(Debug, Deserialize)]
struct ShortLivedToken {
    access_token: Option<String>,
    user_id: Option<serde_json::Value>,
    #[serde(default)]
    permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    user_id: Option<serde_json::Value>,
    id: Option<String>,
    username: String,
    profile_picture_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Permalink {
    permalink: Option<String>,
}

fn id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct InstagramPlatform {
    config: PlatformConfig,
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl InstagramPlatform {
    pub fn new(config: PlatformConfig, client: reqwest::Client) -> Self {
        let endpoints = Endpoints::resolve(&config, &DEFAULTS);
        Self {
            config,
            client,
            endpoints,
        }
    }

    /// URL the Graph API pulls the media from
    ///
    /// A caller-supplied public URL wins; otherwise the file is inlined as a
    /// base64 `data:` URI.
    fn media_url(request: &UploadRequest) -> String {
        match request.source_url.as_deref().filter(|url| !url.trim().is_empty()) {
            Some(url) => url.to_string(),
            None => format!("data:{};base64,{}", request.mime_type, STANDARD.encode(&request.file)),
        }
    }

    fn graph(&self, path: &str) -> String {
        http::join_url(&self.endpoints.api, path)
    }

    async fn long_lived_token(&self, short_lived: &str) -> Result<TokenResponse> {
        let request = self.client.get(self.graph("/access_token")).query(&[
            ("grant_type", "ig_exchange_token"),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("access_token", short_lived),
        ]);
        http::send_json(request, PlatformKind::Instagram, "long-lived token").await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile> {
        let request = self.client.get(self.graph("/me")).query(&[
            ("fields", "user_id,username,profile_picture_url"),
            ("access_token", access_token),
        ]);
        http::send_json(request, PlatformKind::Instagram, "profile").await
    }

    async fn create_container(&self, connection: &PlatformConnection, request: &UploadRequest) -> Result<String> {
        let caption = request.caption();
        let media_url = Self::media_url(request);
        let token = connection.access_token.expose_secret();

        let mut form = vec![("caption", caption.as_str()), ("access_token", token)];
        match request.media_kind {
            MediaKind::Image => form.push(("image_url", media_url.as_str())),
            MediaKind::Video => {
                form.push(("media_type", "REELS"));
                form.push(("video_url", media_url.as_str()));
            }
        }
        if let Some(location) = request.location.as_deref() {
            form.push(("location_id", location));
        }

        let create = self
            .client
            .post(self.graph(&format!("/{}/media", connection.account_or_me())))
            .form(&form);
        let container: Created = http::send_json(create, PlatformKind::Instagram, "create container").await?;
        Ok(container.id)
    }

    async fn publish_container(&self, connection: &PlatformConnection, container_id: &str) -> Result<String> {
        let publish = self
            .client
            .post(self.graph(&format!("/{}/media_publish", connection.account_or_me())))
            .form(&[
                ("creation_id", container_id),
                ("access_token", connection.access_token.expose_secret()),
            ]);
        let media: Created = http::send_json(publish, PlatformKind::Instagram, "publish container").await?;
        Ok(media.id)
    }

    async fn permalink(&self, connection: &PlatformConnection, media_id: &str) -> Result<Option<String>> {
        let request = self.client.get(self.graph(&format!("/{}", media_id))).query(&[
            ("fields", "permalink"),
            ("access_token", connection.access_token.expose_secret()),
        ]);
        let link: Permalink = http::send_json(request, PlatformKind::Instagram, "permalink").await?;
        Ok(link.permalink)
    }
}

#[async_trait]
impl Platform for InstagramPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Instagram
    }

    fn is_configured(&self) -> bool {
        client_configured(&self.config)
    }

    fn supported_media(&self) -> &[MediaKind] {
        &[MediaKind::Image, MediaKind::Video]
    }

    fn authorization_url(&self, state: &str, _code_challenge: Option<&str>) -> Result<String> {
        let scope = self.config.scopes_or(DEFAULT_SCOPES).join(",");
        url_with_params(
            PlatformKind::Instagram,
            &self.endpoints.authorize,
            "/oauth/authorize",
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
    }

    async fn exchange_token(&self, grant: &AuthorizationGrant) -> Result<PlatformConnection> {
        let request = self
            .client
            .post(http::join_url(&self.endpoints.oauth, "/oauth/access_token"))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code", grant.code.as_str()),
            ]);
        let short: ShortLivedToken = http::send_json(request, PlatformKind::Instagram, "token").await?;

        let short_token = short.access_token.filter(|t| !t.is_empty()).ok_or_else(|| {
            PlatformError::Authentication(
                "Instagram token response did not include an access token".to_string(),
            )
        })?;

        let long = self.long_lived_token(&short_token).await?;
        let access_token = long.require_access_token(PlatformKind::Instagram)?;
        let profile = self.fetch_profile(&access_token).await?;

        let account_id = profile
            .user_id
            .as_ref()
            .map(id_string)
            .or(profile.id)
            .or_else(|| short.user_id.as_ref().map(id_string));

        let mut connection = PlatformConnection::new(PlatformKind::Instagram, access_token, profile.username);
        connection.expires_at = expires_at_from(long.expires_in, Utc::now());
        connection.account_id = account_id;
        connection.profile_picture_url = profile.profile_picture_url;
        connection.scopes = short.permissions;

        info!("Connected Instagram account");
        Ok(connection)
    }

    fn validate_request(&self, request: &UploadRequest) -> Result<()> {
        check_request(self, request)?;
        check_length(
            PlatformKind::Instagram,
            "caption",
            &request.caption(),
            INSTAGRAM_CAPTION_LIMIT,
        )
    }

    async fn upload(&self, connection: &PlatformConnection, request: &UploadRequest) -> Result<UploadResult> {
        self.validate_request(request)?;

        let container_id = self.create_container(connection, request).await?;
        info!(container_id = %container_id, "Instagram container created");

        let media_id = self.publish_container(connection, &container_id).await?;

        let post_url = match self.permalink(connection, &media_id).await {
            Ok(Some(link)) => link,
            Ok(None) => format!("https://www.instagram.com/{}/", connection.username),
            Err(e) => {
                warn!("Instagram permalink lookup failed, using profile URL: {}", e);
                format!("https://www.instagram.com/{}/", connection.username)
            }
        };

        Ok(UploadResult {
            post_id: media_id,
            post_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> InstagramPlatform {
        InstagramPlatform::new(
            PlatformConfig::new("ig-id", "ig-secret", "https://app.example.com/cb/instagram"),
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_media_url_prefers_source_url() {
        let mut request = UploadRequest::new(vec![1u8, 2, 3], "image/jpeg", "Pic");
        request.source_url = Some("https://cdn.example.com/pic.jpg".to_string());
        assert_eq!(InstagramPlatform::media_url(&request), "https://cdn.example.com/pic.jpg");
    }

    #[test]
    fn test_media_url_data_uri() {
        let request = UploadRequest::new(vec![1u8, 2, 3], "image/jpeg", "Pic");
        assert_eq!(InstagramPlatform::media_url(&request), "data:image/jpeg;base64,AQID");
    }

    #[test]
    fn test_authorization_url() {
        let url = platform().authorization_url("s1", None).unwrap();
        assert!(url.starts_with("https://www.instagram.com/oauth/authorize?client_id=ig-id"));
        assert!(url.contains("instagram_business_content_publish"));
    }

    #[test]
    fn test_accepts_images_and_videos_but_no_schedule() {
        let platform = platform();
        assert!(platform
            .validate_request(&UploadRequest::new(vec![1u8], "image/png", "p"))
            .is_ok());
        assert!(platform
            .validate_request(&UploadRequest::new(vec![1u8], "video/mp4", "v"))
            .is_ok());

        let mut scheduled = UploadRequest::new(vec![1u8], "image/png", "p");
        scheduled.scheduled_time = Some(Utc::now() + chrono::Duration::hours(1));
        assert!(platform.validate_request(&scheduled).is_err());
    }

    #[test]
    fn test_id_string() {
        assert_eq!(id_string(&serde_json::json!(17841400000000000u64)), "17841400000000000");
        assert_eq!(id_string(&serde_json::json!("abc")), "abc");
    }
}
