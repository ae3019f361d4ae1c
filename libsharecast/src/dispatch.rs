//! Multi-platform share orchestration
//!
//! A share action runs in three steps: validate the request once, plan which
//! selected platforms have a usable connection, then upload to every planned
//! platform concurrently. A failure on one platform is recorded in the
//! result map and never cancels its siblings.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{ConnectionStore, Database, ShareRecord};
use crate::error::{PlatformError, Result, SharecastError};
use crate::http::build_client;
use crate::platforms::{
    facebook::FacebookPlatform, instagram::InstagramPlatform, tiktok::TikTokPlatform,
    twitter::TwitterPlatform, youtube::YouTubePlatform, Platform,
};
use crate::types::{PlatformConnection, PlatformKind, PlatformOutcome, ShareResults, UploadRequest};

/// Which platforms a share goes to, as sent by the client
///
/// Wire form is a JSON object of booleans, e.g.
/// `{"instagram": true, "tiktok": false, "youtube": true}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformSelection(BTreeMap<String, bool>);

impl PlatformSelection {
    /// Parse the JSON map form
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            SharecastError::InvalidInput(format!(
                "platforms must be a JSON object of booleans: {}",
                e
            ))
        })
    }

    pub fn set(&mut self, platform: PlatformKind, selected: bool) {
        self.0.insert(platform.as_str().to_string(), selected);
    }

    /// Platforms mapped to `true`, in canonical order
    ///
    /// Every key must name a known platform, whatever its value.
    pub fn enabled(&self) -> Result<Vec<PlatformKind>> {
        let mut enabled = Vec::new();
        for (name, selected) in &self.0 {
            let kind: PlatformKind = name.parse()?;
            if *selected && !enabled.contains(&kind) {
                enabled.push(kind);
            }
        }
        enabled.sort();
        Ok(enabled)
    }
}

impl FromIterator<PlatformKind> for PlatformSelection {
    fn from_iter<I: IntoIterator<Item = PlatformKind>>(iter: I) -> Self {
        let mut selection = PlatformSelection::default();
        for kind in iter {
            selection.set(kind, true);
        }
        selection
    }
}

/// Why a selected platform was left out of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No client for this platform on this server
    NotConfigured,
    /// The user has no stored connection
    NotConnected,
    /// The stored connection's token has expired
    Expired,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SkipReason::NotConfigured => "not configured",
            SkipReason::NotConnected => "not connected",
            SkipReason::Expired => "connection expired",
        };
        f.write_str(text)
    }
}

/// Outcome of planning: who gets the upload, who is skipped and why
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchPlan {
    pub targets: Vec<PlatformKind>,
    pub skipped: BTreeMap<PlatformKind, SkipReason>,
}

/// What a share action returns to its caller
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareReport {
    pub share_id: String,
    pub results: ShareResults,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub skipped: BTreeMap<PlatformKind, SkipReason>,
}

impl ShareReport {
    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|outcome| outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Upload one request to every target concurrently
///
/// Returns exactly one outcome per target. Each platform sees the same
/// request; `Bytes` makes the shared buffer cheap to hand around.
pub async fn dispatch(
    targets: &[(Arc<dyn Platform>, PlatformConnection)],
    request: &UploadRequest,
) -> ShareResults {
    let futures: Vec<_> = targets
        .iter()
        .map(|(platform, connection)| async move {
            let kind = platform.kind();
            info!("Uploading to platform: {}", kind);

            let result = platform.upload(connection, request).await;
            match &result {
                Ok(upload) => info!(platform = %kind, post_id = %upload.post_id, "Upload succeeded"),
                Err(e) => warn!("Failed to upload to {}: {}", kind, e),
            }

            (kind, PlatformOutcome::from(result))
        })
        .collect();

    join_all(futures).await.into_iter().collect()
}

/// Runs share actions for users against a fixed set of platform clients
#[derive(Clone)]
pub struct Dispatcher {
    platforms: HashMap<PlatformKind, Arc<dyn Platform>>,
    store: Arc<dyn ConnectionStore>,
    history: Option<Database>,
}

impl Dispatcher {
    pub fn new(platforms: Vec<Arc<dyn Platform>>, store: Arc<dyn ConnectionStore>) -> Self {
        Self {
            platforms: platforms.into_iter().map(|p| (p.kind(), p)).collect(),
            store,
            history: None,
        }
    }

    /// Record every share and its outcomes in `db`
    pub fn with_history(mut self, db: Database) -> Self {
        self.history = Some(db);
        self
    }

    pub fn platform(&self, kind: PlatformKind) -> Option<&Arc<dyn Platform>> {
        self.platforms.get(&kind)
    }

    /// Platforms this dispatcher has clients for, in canonical order
    pub fn platform_kinds(&self) -> Vec<PlatformKind> {
        let mut kinds: Vec<_> = self.platforms.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn store(&self) -> &Arc<dyn ConnectionStore> {
        &self.store
    }

    /// Decide which selected platforms are dispatched
    ///
    /// A platform is a target only when it is selected, has a configured
    /// client and the user holds a non-expired connection for it.
    pub fn plan(
        &self,
        selection: &PlatformSelection,
        connections: &HashMap<PlatformKind, PlatformConnection>,
        now: DateTime<Utc>,
    ) -> Result<DispatchPlan> {
        let mut plan = DispatchPlan::default();

        for kind in selection.enabled()? {
            let configured = self.platforms.get(&kind).is_some_and(|p| p.is_configured());
            let reason = match connections.get(&kind) {
                _ if !configured => Some(SkipReason::NotConfigured),
                None => Some(SkipReason::NotConnected),
                Some(connection) if connection.is_expired(now) => Some(SkipReason::Expired),
                Some(_) => None,
            };

            match reason {
                Some(reason) => {
                    info!("Skipping {}: {}", kind, reason);
                    plan.skipped.insert(kind, reason);
                }
                None => plan.targets.push(kind),
            }
        }

        Ok(plan)
    }

    /// Share `request` to the user's selected platforms
    ///
    /// Fails only before dispatch: invalid request, unknown platform name,
    /// nothing to dispatch to, or a connection store error. Once uploads
    /// start, per-platform failures are reported in the result map.
    pub async fn share(
        &self,
        user_id: &str,
        request: &UploadRequest,
        selection: &PlatformSelection,
    ) -> Result<ShareReport> {
        self.share_at(user_id, request, selection, Utc::now()).await
    }

    pub async fn share_at(
        &self,
        user_id: &str,
        request: &UploadRequest,
        selection: &PlatformSelection,
        now: DateTime<Utc>,
    ) -> Result<ShareReport> {
        request.validate_at(now)?;

        let mut connections = self.store.user_connections(user_id).await?;
        let plan = self.plan(selection, &connections, now)?;

        if plan.targets.is_empty() {
            let detail = if plan.skipped.is_empty() {
                "no platforms selected".to_string()
            } else {
                plan.skipped
                    .iter()
                    .map(|(kind, reason)| format!("{} ({})", kind, reason))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            return Err(PlatformError::Validation(format!(
                "No connected platforms to share to: {}",
                detail
            ))
            .into());
        }

        let targets: Vec<(Arc<dyn Platform>, PlatformConnection)> = plan
            .targets
            .iter()
            .filter_map(|kind| {
                let platform = self.platforms.get(kind)?;
                let connection = connections.remove(kind)?;
                Some((Arc::clone(platform), connection))
            })
            .collect();

        let share_id = uuid::Uuid::new_v4().to_string();
        info!(
            share_id = %share_id,
            platforms = targets.len(),
            bytes = request.size(),
            "Dispatching share"
        );

        let results = dispatch(&targets, request).await;

        if let Some(db) = &self.history {
            let record = ShareRecord {
                id: share_id.clone(),
                user_id: user_id.to_string(),
                title: request.title.trim().to_string(),
                media_kind: request.media_kind,
                created_at: now,
                results: results.clone(),
            };
            if let Err(e) = db.record_share(&record).await {
                warn!("Failed to record share {} in history: {}", share_id, e);
            }
        }

        Ok(ShareReport {
            share_id,
            results,
            skipped: plan.skipped,
        })
    }
}

/// Create platform clients for every enabled platform in `config`
///
/// All clients share one HTTP connection pool.
///
/// # Examples
///
/// ```no_run
/// use libsharecast::config::Config;
/// use libsharecast::dispatch::create_platforms;
///
/// # fn example() -> libsharecast::error::Result<()> {
/// let config = Config::load()?;
/// let platforms = create_platforms(&config)?;
/// println!("Created {} platform clients", platforms.len());
/// # Ok(())
/// # }
/// ```
pub fn create_platforms(config: &Config) -> Result<Vec<Arc<dyn Platform>>> {
    let client = build_client(&config.http)?;
    let chunk_size = config.upload.chunk_size;
    let mut platforms: Vec<Arc<dyn Platform>> = Vec::new();

    for kind in config.enabled_platforms() {
        let Some(platform_config) = config.platform(kind).cloned() else {
            continue;
        };
        let http = client.clone();

        let platform: Arc<dyn Platform> = match kind {
            PlatformKind::TikTok => Arc::new(TikTokPlatform::new(platform_config, http, chunk_size)),
            PlatformKind::YouTube => Arc::new(YouTubePlatform::new(platform_config, http, chunk_size)),
            PlatformKind::Instagram => Arc::new(InstagramPlatform::new(platform_config, http)),
            PlatformKind::Facebook => Arc::new(FacebookPlatform::new(platform_config, http, chunk_size)),
            PlatformKind::Twitter => Arc::new(TwitterPlatform::new(platform_config, http, chunk_size)),
        };

        if !platform.is_configured() {
            warn!("{} is enabled but missing client credentials", kind.display_name());
        }
        platforms.push(platform);
    }

    Ok(platforms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformConfig;
    use crate::platforms::mock::MockPlatform;
    use chrono::Duration;

    fn connected(kinds: &[PlatformKind]) -> HashMap<PlatformKind, PlatformConnection> {
        kinds
            .iter()
            .map(|kind| (*kind, PlatformConnection::new(*kind, "token", "user")))
            .collect()
    }

    async fn dispatcher_with(
        platforms: Vec<Arc<dyn Platform>>,
        connections: &[PlatformKind],
    ) -> (Dispatcher, Database) {
        let db = Database::in_memory().await.unwrap();
        for (_, connection) in connected(connections) {
            db.save_connection("alice", &connection).await.unwrap();
        }
        let dispatcher = Dispatcher::new(platforms, Arc::new(db.clone())).with_history(db.clone());
        (dispatcher, db)
    }

    fn all_mocks() -> Vec<Arc<dyn Platform>> {
        PlatformKind::ALL
            .into_iter()
            .map(|kind| Arc::new(MockPlatform::success(kind)) as Arc<dyn Platform>)
            .collect()
    }

    fn request() -> UploadRequest {
        UploadRequest::new(vec![7u8; 64], "video/mp4", "Launch day")
    }

    #[test]
    fn test_selection_parse_and_enabled() {
        let selection =
            PlatformSelection::parse(r#"{"youtube": true, "tiktok": false, "instagram": true}"#).unwrap();
        assert_eq!(
            selection.enabled().unwrap(),
            vec![PlatformKind::YouTube, PlatformKind::Instagram]
        );
    }

    #[test]
    fn test_selection_rejects_unknown_platform() {
        let selection = PlatformSelection::parse(r#"{"myspace": false}"#).unwrap();
        let err = selection.enabled().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("myspace"));
    }

    #[test]
    fn test_selection_rejects_non_boolean_map() {
        assert!(PlatformSelection::parse(r#"["youtube"]"#).unwrap_err().is_validation());
        assert!(PlatformSelection::parse(r#"{"youtube": "yes"}"#).is_err());
    }

    #[test]
    fn test_selection_from_iter_dedups_aliases() {
        let selection = PlatformSelection::parse(r#"{"x": true, "twitter": true}"#).unwrap();
        assert_eq!(selection.enabled().unwrap(), vec![PlatformKind::Twitter]);

        let selection: PlatformSelection = [PlatformKind::Facebook].into_iter().collect();
        assert_eq!(selection.enabled().unwrap(), vec![PlatformKind::Facebook]);
    }

    #[tokio::test]
    async fn test_plan_selects_exactly_connected_and_enabled() {
        let (dispatcher, _db) = dispatcher_with(all_mocks(), &[]).await;
        let selection =
            PlatformSelection::parse(r#"{"instagram": true, "tiktok": false, "youtube": true}"#).unwrap();
        let connections = connected(&[PlatformKind::Instagram, PlatformKind::YouTube]);

        let plan = dispatcher.plan(&selection, &connections, Utc::now()).unwrap();
        assert_eq!(plan.targets, vec![PlatformKind::YouTube, PlatformKind::Instagram]);
        assert!(plan.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_plan_skips_unconnected_expired_and_unconfigured() {
        let platforms: Vec<Arc<dyn Platform>> = vec![
            Arc::new(MockPlatform::success(PlatformKind::TikTok)),
            Arc::new(MockPlatform::success(PlatformKind::YouTube)),
            Arc::new(MockPlatform::not_configured(PlatformKind::Facebook)),
        ];
        let (dispatcher, _db) = dispatcher_with(platforms, &[]).await;

        let now = Utc::now();
        let mut connections = connected(&[PlatformKind::YouTube, PlatformKind::Facebook, PlatformKind::Twitter]);
        if let Some(youtube) = connections.get_mut(&PlatformKind::YouTube) {
            youtube.expires_at = Some(now - Duration::minutes(1));
        }

        let selection: PlatformSelection = PlatformKind::ALL.into_iter().collect();
        let plan = dispatcher.plan(&selection, &connections, now).unwrap();

        assert!(plan.targets.is_empty());
        assert_eq!(plan.skipped[&PlatformKind::TikTok], SkipReason::NotConnected);
        assert_eq!(plan.skipped[&PlatformKind::YouTube], SkipReason::Expired);
        assert_eq!(plan.skipped[&PlatformKind::Facebook], SkipReason::NotConfigured);
        assert_eq!(plan.skipped[&PlatformKind::Twitter], SkipReason::NotConfigured);
        assert!(!plan.skipped.contains_key(&PlatformKind::Instagram));
    }

    #[tokio::test]
    async fn test_dispatch_n_results_m_successes() {
        let platforms: Vec<Arc<dyn Platform>> = vec![
            Arc::new(MockPlatform::success(PlatformKind::TikTok)),
            Arc::new(MockPlatform::upload_failure(PlatformKind::YouTube, "quotaExceeded")),
            Arc::new(MockPlatform::success(PlatformKind::Instagram)),
            Arc::new(MockPlatform::upload_failure(PlatformKind::Facebook, "HTTP 500")),
        ];
        let targets: Vec<_> = platforms
            .into_iter()
            .map(|p| {
                let connection = PlatformConnection::new(p.kind(), "token", "user");
                (p, connection)
            })
            .collect();

        let results = dispatch(&targets, &request()).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results.values().filter(|o| o.is_success()).count(), 2);
        assert!(results[&PlatformKind::YouTube].error().unwrap().contains("quotaExceeded"));
        assert!(results[&PlatformKind::Facebook].error().unwrap().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn test_dispatch_runs_concurrently() {
        let delay = std::time::Duration::from_millis(200);
        let targets: Vec<(Arc<dyn Platform>, PlatformConnection)> = PlatformKind::ALL
            .into_iter()
            .map(|kind| {
                let platform: Arc<dyn Platform> = Arc::new(MockPlatform::with_delay(kind, delay));
                (platform, PlatformConnection::new(kind, "token", "user"))
            })
            .collect();

        let started = std::time::Instant::now();
        let results = dispatch(&targets, &request()).await;

        assert_eq!(results.len(), 5);
        assert!(started.elapsed() < delay * 3);
    }

    #[tokio::test]
    async fn test_share_only_uploads_to_connected_targets() {
        let tiktok = MockPlatform::success(PlatformKind::TikTok);
        let youtube = MockPlatform::success(PlatformKind::YouTube);
        let instagram = MockPlatform::success(PlatformKind::Instagram);
        let platforms: Vec<Arc<dyn Platform>> = vec![
            Arc::new(tiktok.clone()),
            Arc::new(youtube.clone()),
            Arc::new(instagram.clone()),
        ];
        let (dispatcher, db) =
            dispatcher_with(platforms, &[PlatformKind::Instagram, PlatformKind::YouTube]).await;

        let selection =
            PlatformSelection::parse(r#"{"instagram": true, "tiktok": true, "youtube": true}"#).unwrap();
        let report = dispatcher.share("alice", &request(), &selection).await.unwrap();

        assert_eq!(
            report.results.keys().copied().collect::<Vec<_>>(),
            vec![PlatformKind::YouTube, PlatformKind::Instagram]
        );
        assert_eq!(report.skipped[&PlatformKind::TikTok], SkipReason::NotConnected);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(tiktok.upload_call_count(), 0);
        assert_eq!(youtube.upload_call_count(), 1);
        assert_eq!(instagram.upload_call_count(), 1);

        let history = db.list_shares("alice", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, report.share_id);
        assert_eq!(history[0].results, report.results);
    }

    #[tokio::test]
    async fn test_share_isolates_failures() {
        let platforms: Vec<Arc<dyn Platform>> = vec![
            Arc::new(MockPlatform::success(PlatformKind::TikTok)),
            Arc::new(MockPlatform::upload_failure(PlatformKind::YouTube, "boom")),
        ];
        let (dispatcher, _db) =
            dispatcher_with(platforms, &[PlatformKind::TikTok, PlatformKind::YouTube]).await;

        let selection: PlatformSelection = [PlatformKind::TikTok, PlatformKind::YouTube].into_iter().collect();
        let report = dispatcher.share("alice", &request(), &selection).await.unwrap();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.results[&PlatformKind::TikTok].is_success());
    }

    #[tokio::test]
    async fn test_share_invalid_request_makes_no_calls() {
        let youtube = MockPlatform::success(PlatformKind::YouTube);
        let platforms: Vec<Arc<dyn Platform>> = vec![Arc::new(youtube.clone())];
        let (dispatcher, _db) = dispatcher_with(platforms, &[PlatformKind::YouTube]).await;

        let mut invalid = request();
        invalid.file = bytes::Bytes::new();

        let selection: PlatformSelection = [PlatformKind::YouTube].into_iter().collect();
        let err = dispatcher.share("alice", &invalid, &selection).await.unwrap_err();

        assert!(err.is_validation());
        assert_eq!(youtube.upload_call_count(), 0);
    }

    #[tokio::test]
    async fn test_share_with_nothing_to_dispatch_is_validation_error() {
        let (dispatcher, db) = dispatcher_with(all_mocks(), &[]).await;

        let selection: PlatformSelection = [PlatformKind::TikTok].into_iter().collect();
        let err = dispatcher.share("alice", &request(), &selection).await.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("tiktok (not connected)"));

        let err = dispatcher
            .share("alice", &request(), &PlatformSelection::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no platforms selected"));

        assert!(db.list_shares("alice", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_share_report_serialization() {
        let (dispatcher, _db) = dispatcher_with(all_mocks(), &[PlatformKind::Twitter]).await;

        let selection: PlatformSelection = [PlatformKind::Twitter, PlatformKind::TikTok].into_iter().collect();
        let report = dispatcher.share("alice", &request(), &selection).await.unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["results"]["twitter"]["postId"], "mock-twitter-1");
        assert_eq!(json["skipped"]["tiktok"], "not_connected");
        assert!(json["shareId"].as_str().is_some());
    }

    #[test]
    fn test_create_platforms_skips_disabled() {
        let mut config = Config::default_config();
        config.set_platform(
            PlatformKind::TikTok,
            Some(PlatformConfig::new("key", "secret", "https://app.example.com/cb")),
        );
        let mut disabled = PlatformConfig::new("id", "secret", "https://app.example.com/cb");
        disabled.enabled = false;
        config.set_platform(PlatformKind::YouTube, Some(disabled));

        let platforms = create_platforms(&config).unwrap();
        let kinds: Vec<_> = platforms.iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, vec![PlatformKind::TikTok]);
        assert!(platforms[0].is_configured());
    }

    #[test]
    fn test_create_platforms_empty_config() {
        assert!(create_platforms(&Config::default_config()).unwrap().is_empty());
    }
}
