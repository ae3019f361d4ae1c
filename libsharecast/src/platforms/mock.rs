//! Mock platform implementation for testing
//!
//! A configurable stand-in for a real platform that can succeed, fail or
//! stall without touching the network. Used by the dispatch tests and by the
//! server and CLI integration tests.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::oauth::AuthorizationGrant;
use crate::platforms::Platform;
use crate::types::{MediaKind, PlatformConnection, PlatformKind, UploadRequest, UploadResult};

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform this mock stands in for
    pub kind: PlatformKind,

    pub upload_succeeds: bool,

    /// Error to return on upload failure
    pub upload_error: Option<String>,

    pub exchange_succeeds: bool,

    pub supports_refresh: bool,

    /// Delay before completing uploads (simulates network latency)
    pub delay: Duration,

    pub is_configured: bool,

    pub supported_media: Vec<MediaKind>,

    pub supports_scheduling: bool,

    /// Exchanges without a PKCE verifier are rejected
    pub requires_pkce: bool,

    /// Shared with clones so a test can keep a handle after boxing the mock
    pub upload_call_count: Arc<AtomicUsize>,

    pub exchange_call_count: Arc<AtomicUsize>,

    /// Titles of requests that reached `upload`
    pub uploaded_titles: Arc<Mutex<Vec<String>>>,
}

impl MockConfig {
    pub fn new(kind: PlatformKind) -> Self {
        Self {
            kind,
            upload_succeeds: true,
            upload_error: None,
            exchange_succeeds: true,
            supports_refresh: true,
            delay: Duration::from_millis(0),
            is_configured: true,
            supported_media: vec![MediaKind::Video, MediaKind::Image],
            supports_scheduling: true,
            requires_pkce: false,
            upload_call_count: Arc::new(AtomicUsize::new(0)),
            exchange_call_count: Arc::new(AtomicUsize::new(0)),
            uploaded_titles: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform for testing
#[derive(Debug, Clone)]
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// A mock whose uploads always succeed
    pub fn success(kind: PlatformKind) -> Self {
        Self::new(MockConfig::new(kind))
    }

    /// A mock whose uploads fail with an API error
    pub fn upload_failure(kind: PlatformKind, error: &str) -> Self {
        Self::new(MockConfig {
            upload_succeeds: false,
            upload_error: Some(error.to_string()),
            ..MockConfig::new(kind)
        })
    }

    /// A mock whose code exchange is rejected
    pub fn exchange_failure(kind: PlatformKind) -> Self {
        Self::new(MockConfig {
            exchange_succeeds: false,
            ..MockConfig::new(kind)
        })
    }

    pub fn with_delay(kind: PlatformKind, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(kind)
        })
    }

    pub fn not_configured(kind: PlatformKind) -> Self {
        Self::new(MockConfig {
            is_configured: false,
            ..MockConfig::new(kind)
        })
    }

    pub fn with_media(mut self, media: &[MediaKind]) -> Self {
        self.config.supported_media = media.to_vec();
        self
    }

    pub fn with_scheduling(mut self, supported: bool) -> Self {
        self.config.supports_scheduling = supported;
        self
    }

    pub fn without_refresh(mut self) -> Self {
        self.config.supports_refresh = false;
        self
    }

    pub fn with_pkce(mut self) -> Self {
        self.config.requires_pkce = true;
        self
    }

    pub fn upload_call_count(&self) -> usize {
        self.config.upload_call_count.load(Ordering::SeqCst)
    }

    pub fn exchange_call_count(&self) -> usize {
        self.config.exchange_call_count.load(Ordering::SeqCst)
    }

    pub fn uploaded_titles(&self) -> Vec<String> {
        self.config
            .uploaded_titles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn connection(&self, token: String) -> PlatformConnection {
        let kind = self.config.kind;
        let mut connection = PlatformConnection::new(kind, token, format!("mock-{}-user", kind));
        connection.refresh_token = Some(format!("mock-{}-refresh", kind).into());
        connection.expires_at = Some(Utc::now() + ChronoDuration::hours(1));
        connection.account_id = Some(format!("{}-account", kind));
        connection
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn kind(&self) -> PlatformKind {
        self.config.kind
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured
    }

    fn supported_media(&self) -> &[MediaKind] {
        &self.config.supported_media
    }

    fn supports_scheduling(&self) -> bool {
        self.config.supports_scheduling
    }

    fn requires_pkce(&self) -> bool {
        self.config.requires_pkce
    }

    fn authorization_url(&self, state: &str, code_challenge: Option<&str>) -> Result<String> {
        let mut url = format!(
            "https://{}.example.com/oauth/authorize?state={}",
            self.config.kind, state
        );
        if let Some(challenge) = code_challenge {
            url.push_str(&format!("&code_challenge={}&code_challenge_method=S256", challenge));
        }
        Ok(url)
    }

    async fn exchange_token(&self, grant: &AuthorizationGrant) -> Result<PlatformConnection> {
        self.config.exchange_call_count.fetch_add(1, Ordering::SeqCst);

        if !self.config.exchange_succeeds {
            return Err(PlatformError::Authentication(format!(
                "Mock {} rejected the authorization code",
                self.config.kind
            ))
            .into());
        }

        if self.config.requires_pkce && grant.code_verifier.is_none() {
            return Err(PlatformError::Authentication(format!(
                "Mock {} requires a PKCE code verifier",
                self.config.kind
            ))
            .into());
        }

        Ok(self.connection(format!("mock-token-{}", grant.code)))
    }

    async fn refresh_connection(&self, connection: &PlatformConnection) -> Result<PlatformConnection> {
        if !self.config.supports_refresh {
            return Err(PlatformError::Authentication(format!(
                "Mock {} cannot refresh connections",
                self.config.kind
            ))
            .into());
        }

        let mut refreshed = self.connection(format!("mock-refreshed-{}", self.config.kind));
        refreshed.username = connection.username.clone();
        Ok(refreshed)
    }

    async fn upload(&self, _connection: &PlatformConnection, request: &UploadRequest) -> Result<UploadResult> {
        self.validate_request(request)?;

        let call = self.config.upload_call_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.config
            .uploaded_titles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.title.clone());

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if !self.config.upload_succeeds {
            let message = self
                .config
                .upload_error
                .clone()
                .unwrap_or_else(|| "Mock upload failed".to_string());
            return Err(PlatformError::Api(message).into());
        }

        let post_id = format!("mock-{}-{}", self.config.kind, call);
        Ok(UploadResult {
            post_url: format!("https://{}.example.com/posts/{}", self.config.kind, post_id),
            post_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> UploadRequest {
        UploadRequest::new(vec![1u8, 2, 3], "video/mp4", "Mock clip")
    }

    fn connection(kind: PlatformKind) -> PlatformConnection {
        PlatformConnection::new(kind, "token", "user")
    }

    #[tokio::test]
    async fn test_mock_success() {
        let platform = MockPlatform::success(PlatformKind::YouTube);
        let result = platform
            .upload(&connection(PlatformKind::YouTube), &request())
            .await
            .unwrap();

        assert_eq!(result.post_id, "mock-youtube-1");
        assert_eq!(result.post_url, "https://youtube.example.com/posts/mock-youtube-1");
        assert_eq!(platform.upload_call_count(), 1);
        assert_eq!(platform.uploaded_titles(), vec!["Mock clip".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_upload_failure() {
        let platform = MockPlatform::upload_failure(PlatformKind::TikTok, "spam_risk");
        let err = platform
            .upload(&connection(PlatformKind::TikTok), &request())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("spam_risk"));
        assert_eq!(platform.upload_call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_invalid_request_not_counted() {
        let platform = MockPlatform::success(PlatformKind::Instagram);
        let mut invalid = request();
        invalid.file = bytes::Bytes::new();

        let err = platform
            .upload(&connection(PlatformKind::Instagram), &invalid)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(platform.upload_call_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_with_delay() {
        let platform = MockPlatform::with_delay(PlatformKind::Facebook, Duration::from_millis(50));
        let start = std::time::Instant::now();
        platform
            .upload(&connection(PlatformKind::Facebook), &request())
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_mock_exchange_and_refresh() {
        let platform = MockPlatform::success(PlatformKind::Twitter);
        let connection = platform
            .exchange_token(&AuthorizationGrant::new("abc"))
            .await
            .unwrap();

        assert_eq!(connection.username, "mock-twitter-user");
        assert!(connection.refresh_token.is_some());
        assert_eq!(platform.exchange_call_count(), 1);

        let refreshed = platform.refresh_connection(&connection).await.unwrap();
        assert_eq!(refreshed.username, connection.username);

        let no_refresh = MockPlatform::success(PlatformKind::Twitter).without_refresh();
        assert!(no_refresh.refresh_connection(&connection).await.unwrap_err().is_authentication());
    }

    #[tokio::test]
    async fn test_mock_exchange_failure() {
        let platform = MockPlatform::exchange_failure(PlatformKind::Facebook);
        let err = platform
            .exchange_token(&AuthorizationGrant::new("abc"))
            .await
            .unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn test_mock_not_configured() {
        assert!(!MockPlatform::not_configured(PlatformKind::TikTok).is_configured());
    }

    #[test]
    fn test_mock_authorization_url() {
        let platform = MockPlatform::success(PlatformKind::Twitter);
        let url = platform.authorization_url("xyz", Some("challenge")).unwrap();
        assert!(url.contains("state=xyz"));
        assert!(url.contains("code_challenge=challenge"));
    }
}
