//! share-post - Share a local media file to several platforms at once

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use libsharecast::form::ShareFields;
use libsharecast::logging::{LogFormat, LoggingConfig};
use libsharecast::{
    create_platforms, Config, Database, Dispatcher, PlatformKind, PlatformOutcome, PlatformSelection,
    Result, SharecastError, ShareReport,
};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "share-post")]
#[command(version)]
#[command(about = "Share a video or image to several platforms at once")]
#[command(long_about = "\
share-post - Share a video or image to several platforms at once

DESCRIPTION:
    Uploads FILE to every selected platform the user has connected, all
    platforms in parallel. One platform failing does not stop the others.
    Connect accounts first with share-creds.

EXAMPLES:
    share-post clip.mp4 --title \"Launch day\" --platform tiktok,youtube
    share-post photo.jpg --title \"Hello\" --platform instagram --format json

OUTPUT:
    text: one 'platform: url' line per published post on stdout; failures
          and skipped platforms on stderr
    json: the share report ({shareId, results, skipped})

EXIT CODES:
    0 - Published everywhere
    1 - At least one platform failed, or a runtime error
    2 - Authentication error
    3 - Invalid input
")]
struct Cli {
    /// Media file to share
    file: PathBuf,

    /// Post title (defaults to the file name without extension)
    #[arg(short, long)]
    title: Option<String>,

    /// Post description / caption body
    #[arg(short, long)]
    description: Option<String>,

    /// Target platform(s), comma-separated (defaults to [defaults] platforms)
    #[arg(short, long, value_delimiter = ',')]
    platform: Vec<String>,

    /// Tags, comma-separated
    #[arg(long)]
    tags: Option<String>,

    /// public, private, unlisted or friends
    #[arg(long)]
    visibility: Option<String>,

    /// Publish time for platforms that support scheduling (RFC 3339)
    #[arg(long, value_name = "TIME")]
    schedule: Option<String>,

    /// Media type: video, short, reel, image or photo (detected when omitted)
    #[arg(long = "type", value_name = "TYPE")]
    media_type: Option<String>,

    /// Cover image for platforms that accept one
    #[arg(long, value_name = "PATH")]
    thumbnail: Option<PathBuf>,

    /// Location / place id passed to platforms that support it
    #[arg(long)]
    location: Option<String>,

    /// Public URL of the media, for platforms that fetch by URL
    #[arg(long, value_name = "URL")]
    source_url: Option<String>,

    /// User whose connections are used (defaults to [defaults] user)
    #[arg(short, long)]
    user: Option<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH", env = "SHARECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(LogFormat::Text, "error", cli.verbose).init();

    match run(cli).await {
        Ok(report) if report.failed() == 0 => {}
        Ok(_) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<ShareReport> {
    let output = OutputFormat::parse(&cli.format)?;
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let fields = share_fields(&cli).await?;
    let (request, selection) = fields.into_request(config.defaults.visibility)?;
    let selection = match selection {
        Some(selection) => selection,
        None => config.default_platforms()?.into_iter().collect(),
    };
    let user = cli.user.as_deref().unwrap_or(&config.defaults.user);

    let db = Database::new(&config.database_path()?).await?;
    let dispatcher = Dispatcher::new(create_platforms(&config)?, Arc::new(db.clone())).with_history(db);

    debug!("Sharing {} as user {}", cli.file.display(), user);
    let report = dispatcher.share(user, &request, &selection).await?;

    print_report(&report, output)?;
    Ok(report)
}

async fn read_file(path: &Path) -> Result<Bytes> {
    tokio::fs::read(path).await.map(Bytes::from).map_err(|e| {
        SharecastError::InvalidInput(format!("Failed to read {}: {}", path.display(), e))
    })
}

/// Collect command line flags the same way the server collects form parts
async fn share_fields(cli: &Cli) -> Result<ShareFields> {
    let title = cli.title.clone().or_else(|| {
        cli.file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
    });

    let mut fields = ShareFields {
        file: Some(read_file(&cli.file).await?),
        file_name: cli
            .file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        file_content_type: mime_guess::from_path(&cli.file)
            .first_raw()
            .map(str::to_string),
        title,
        description: cli.description.clone(),
        media_type: cli.media_type.clone(),
        platforms: selection_json(&cli.platform)?,
        tags: cli.tags.clone(),
        visibility: cli.visibility.clone(),
        scheduled_time: cli.schedule.clone(),
        location: cli.location.clone(),
        source_url: cli.source_url.clone(),
        ..Default::default()
    };

    if let Some(path) = &cli.thumbnail {
        fields.thumbnail = Some(read_file(path).await?);
        fields.thumbnail_content_type = mime_guess::from_path(path).first_raw().map(str::to_string);
    }

    Ok(fields)
}

/// `--platform a,b` as the JSON selection map the form parser expects
fn selection_json(names: &[String]) -> Result<Option<String>> {
    let names: Vec<&str> = names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .collect();
    if names.is_empty() {
        return Ok(None);
    }

    let selection = names
        .into_iter()
        .map(|name| name.parse::<PlatformKind>())
        .collect::<Result<PlatformSelection>>()?;

    serde_json::to_string(&selection)
        .map(Some)
        .map_err(|e| SharecastError::InvalidInput(format!("Failed to encode platforms: {}", e)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(SharecastError::InvalidInput(format!(
                "Invalid format: '{}'. Valid options: text, json",
                other
            ))),
        }
    }
}

fn print_report(report: &ShareReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report).map_err(|e| {
                SharecastError::InvalidInput(format!("Failed to encode report: {}", e))
            })?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            for (platform, outcome) in &report.results {
                match outcome {
                    PlatformOutcome::Posted { post_url, .. } => println!("{}: {}", platform, post_url),
                    PlatformOutcome::Failed { error } => eprintln!("{}: failed: {}", platform, error),
                }
            }
            for (platform, reason) in &report.skipped {
                eprintln!("{}: skipped ({})", platform, reason);
            }
        }
    }
    Ok(())
}
