//! CLI integration tests for share-post
//!
//! Vendor APIs are served by a wiremock server; the config file written for
//! each test points every platform's base URLs at it.

use assert_cmd::Command;
use libsharecast::{ConnectionStore, Database, PlatformConnection, PlatformKind};
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestEnv {
    dir: TempDir,
    config_path: PathBuf,
    db_path: PathBuf,
}

impl TestEnv {
    fn media(&self, name: &str, size: usize) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, vec![b'v'; size]).unwrap();
        path
    }

    async fn connect(&self, kinds: &[PlatformKind]) {
        let db = Database::new(self.db_path.to_str().unwrap()).await.unwrap();
        for kind in kinds {
            db.save_connection("local", &PlatformConnection::new(*kind, "token", "creator"))
                .await
                .unwrap();
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("share-post").unwrap();
        cmd.arg("--config").arg(&self.config_path);
        cmd
    }
}

/// Escape a path for a TOML basic string (Windows backslashes)
fn toml_path(path: &std::path::Path) -> String {
    path.to_string_lossy().replace('\\', "\\\\")
}

fn setup(base: &str) -> TestEnv {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    let db_path = dir.path().join("sharecast.db");

    let config = format!(
        r#"
[database]
path = "{db}"

[upload]
chunk_size = 1024

[tiktok]
client_id = "tt-key"
client_secret = "tt-secret"
redirect_uri = "https://app.example.com/callback/tiktok"
api_base = "{base}"
oauth_base = "{base}"
upload_base = "{base}"

[youtube]
client_id = "yt-id"
client_secret = "yt-secret"
redirect_uri = "https://app.example.com/callback/youtube"
api_base = "{base}"
oauth_base = "{base}"
upload_base = "{base}"
"#,
        db = toml_path(&db_path),
    );
    fs::write(&config_path, config).unwrap();

    TestEnv {
        dir,
        config_path,
        db_path,
    }
}

async fn mount_youtube_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Location", format!("{}/upload/session/yt", server.uri()).as_str()),
        )
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/yt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "vid42"})))
        .mount(server)
        .await;
}

#[test]
fn test_help_flag_output() {
    Command::cargo_bin("share-post")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Share a video or image"))
        .stdout(predicate::str::contains("--platform"))
        .stdout(predicate::str::contains("--title"))
        .stdout(predicate::str::contains("--format"))
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_version_flag_output() {
    Command::cargo_bin("share-post")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("share-post"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_file_is_invalid_input() {
    let server = MockServer::start().await;
    let env = setup(&server.uri());

    env.command()
        .arg(env.dir.path().join("nope.mp4"))
        .args(["--platform", "youtube"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Failed to read"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_platform_is_invalid_input() {
    let server = MockServer::start().await;
    let env = setup(&server.uri());
    let file = env.media("clip.mp4", 100);

    env.command()
        .arg(&file)
        .args(["--platform", "youtube,myspace"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("myspace"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_connected_platform_is_invalid_input() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    let env = setup(&server.uri());
    let file = env.media("clip.mp4", 100);

    env.command()
        .arg(&file)
        .args(["--platform", "tiktok"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("No connected platforms"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_share_prints_post_urls() {
    let server = MockServer::start().await;
    mount_youtube_success(&server).await;
    let env = setup(&server.uri());
    env.connect(&[PlatformKind::YouTube]).await;
    let file = env.media("launch-day.mp4", 600);

    env.command()
        .arg(&file)
        .args(["--platform", "youtube", "--tags", "rust,launch"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "youtube: https://www.youtube.com/watch?v=vid42",
        ));

    let db = Database::new(env.db_path.to_str().unwrap()).await.unwrap();
    let history = db.list_shares("local", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].title, "launch-day");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_partial_failure_exits_one_with_json_report() {
    let server = MockServer::start().await;
    mount_youtube_success(&server).await;
    Mock::given(method("POST"))
        .and(path("/v2/post/publish/video/init/"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"code": "internal_error", "message": "Something went wrong"}
        })))
        .mount(&server)
        .await;
    let env = setup(&server.uri());
    env.connect(&[PlatformKind::TikTok, PlatformKind::YouTube]).await;
    let file = env.media("clip.mp4", 600);

    let output = env
        .command()
        .arg(&file)
        .args(["--title", "Launch day", "--platform", "tiktok,youtube", "--format", "json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["results"]["youtube"]["postId"], "vid42");
    let error = report["results"]["tiktok"]["error"].as_str().unwrap();
    assert!(error.contains("Something went wrong"), "{}", error);
}
