//! Sharecast - publish one piece of media to many platforms
//!
//! This library provides the OAuth token exchange, chunked media upload and
//! concurrent dispatch shared by the `share-server` service and the
//! `share-post` / `share-creds` command line tools.

pub mod chunking;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod form;
pub mod http;
pub mod logging;
pub mod oauth;
pub mod platforms;
pub mod types;

// Re-export commonly used types
pub use config::{Config, PlatformConfig};
pub use db::{ConnectionStore, Database, ShareRecord};
pub use dispatch::{create_platforms, Dispatcher, PlatformSelection, ShareReport, SkipReason};
pub use error::{PlatformError, Result, SharecastError};
pub use platforms::Platform;
pub use types::{
    MediaKind, PlatformConnection, PlatformKind, PlatformOutcome, ShareResults, UploadRequest,
    UploadResult, Visibility,
};
