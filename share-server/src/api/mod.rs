//! Route handlers

mod connections;
mod health;
mod history;
mod share;

pub use connections::{connection_routes, CallbackParams, ConnectResponse};
pub use health::{health_routes, HealthResponse};
pub use history::history_routes;
pub use share::{share_routes, ShareResponse};

use std::sync::Arc;

use libsharecast::{Platform, PlatformKind};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Platform named in a path segment; unknown names are a bad request
fn parse_platform(name: &str) -> ApiResult<PlatformKind> {
    name.parse::<PlatformKind>().map_err(ApiError::from)
}

/// Client for a platform that is present and configured
fn configured_platform(state: &AppState, kind: PlatformKind) -> ApiResult<Arc<dyn Platform>> {
    state
        .dispatcher
        .platform(kind)
        .filter(|platform| platform.is_configured())
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("{} is not configured", kind.display_name())))
}
