//! share-server - HTTP front end for Sharecast
//!
//! Exposes the share endpoint (multipart upload fanned out to every selected
//! platform) and the OAuth connect/callback routes that populate the
//! connection store. The router is built from an [`AppState`] so tests can
//! drive it in-process with mock platforms.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use libsharecast::oauth::PendingAuthorizations;
use libsharecast::{Config, ConnectionStore, Database, Dispatcher, PlatformKind, Result, Visibility};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod extract;

/// Share settings applied when a form leaves them out
#[derive(Debug, Clone, Default)]
pub struct ShareDefaults {
    pub visibility: Visibility,
    /// Targets used when the form has no `platforms` field
    pub platforms: Vec<PlatformKind>,
}

impl ShareDefaults {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            visibility: config.defaults.visibility,
            platforms: config.default_platforms()?,
        })
    }
}

/// Shared state for all route handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    /// Share history, when the server records one
    pub history: Option<Database>,
    pub pending: PendingAuthorizations,
    pub defaults: ShareDefaults,
    pub max_upload_bytes: usize,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, config: &Config) -> Result<Self> {
        Ok(Self {
            dispatcher,
            history: None,
            pending: PendingAuthorizations::new(),
            defaults: ShareDefaults::from_config(config)?,
            max_upload_bytes: config.server.max_upload_bytes,
            startup_time: Utc::now(),
        })
    }

    pub fn with_history(mut self, db: Database) -> Self {
        self.history = Some(db);
        self
    }

    pub fn store(&self) -> &Arc<dyn ConnectionStore> {
        self.dispatcher.store()
    }
}

/// Build the application router with all routes
///
/// Multipart bodies are capped at `max_upload_bytes` instead of axum's
/// default 2 MB extractor limit.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes;

    Router::new()
        .merge(api::health_routes())
        .merge(api::share_routes())
        .merge(api::connection_routes())
        .merge(api::history_routes())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
