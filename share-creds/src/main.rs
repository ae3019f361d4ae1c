//! share-creds - Connection management tool for Sharecast
//!
//! Runs the OAuth flow from a terminal: print the consent URL, then exchange
//! the code the platform redirected back with. Stored connections can be
//! listed, refreshed and removed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use libsharecast::logging::{LogFormat, LoggingConfig};
use libsharecast::oauth::{generate_state, AuthorizationGrant, PkcePair};
use libsharecast::{
    create_platforms, Config, ConnectionStore, Database, Dispatcher, Platform, PlatformKind,
    SharecastError,
};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "share-creds")]
#[command(version)]
#[command(about = "Manage Sharecast platform connections", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH", global = true, env = "SHARECAST_CONFIG")]
    config: Option<PathBuf>,

    /// User whose connections are managed (defaults to [defaults] user)
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the consent URL to open in a browser
    Authorize {
        /// Platform name (tiktok, youtube, instagram, facebook, twitter)
        platform: String,
    },

    /// Exchange an authorization code and store the connection
    Connect {
        /// Platform name (tiktok, youtube, instagram, facebook, twitter)
        platform: String,

        /// Code from the redirect URI's `code` parameter
        #[arg(long)]
        code: String,

        /// PKCE verifier printed by `authorize` (twitter)
        #[arg(long)]
        code_verifier: Option<String>,
    },

    /// List stored connections (without tokens)
    List {
        /// Output format (text or json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Obtain a fresh access token for a connection
    Refresh {
        /// Platform name (tiktok, youtube, instagram, facebook, twitter)
        platform: String,
    },

    /// Remove a stored connection
    Disconnect {
        /// Platform name (tiktok, youtube, instagram, facebook, twitter)
        platform: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(LogFormat::Text, "warn", cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<SharecastError>()
            .map(SharecastError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

/// Loaded configuration plus the clients and store commands work against
struct Context {
    user: String,
    db: Database,
    dispatcher: Dispatcher,
}

impl Context {
    async fn load(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => Config::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Config::load().context("Failed to load config")?,
        };
        let user = cli.user.clone().unwrap_or_else(|| config.defaults.user.clone());
        let db = Database::new(&config.database_path()?).await?;
        let dispatcher = Dispatcher::new(create_platforms(&config)?, Arc::new(db.clone()));

        Ok(Self {
            user,
            db,
            dispatcher,
        })
    }

    fn platform(&self, name: &str) -> Result<Arc<dyn Platform>> {
        let kind: PlatformKind = name.parse()?;
        match self.dispatcher.platform(kind) {
            Some(platform) if platform.is_configured() => Ok(Arc::clone(platform)),
            _ => bail!(
                "{} is not configured. Add a [{}] section with client_id, client_secret and redirect_uri to the config file.",
                kind.display_name(),
                kind
            ),
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = Context::load(&cli).await?;

    match cli.command {
        Commands::Authorize { platform } => authorize(&ctx, &platform),
        Commands::Connect {
            platform,
            code,
            code_verifier,
        } => connect(&ctx, &platform, code, code_verifier).await,
        Commands::List { format } => list_connections(&ctx, &format).await,
        Commands::Refresh { platform } => refresh(&ctx, &platform).await,
        Commands::Disconnect { platform } => disconnect(&ctx, &platform).await,
    }
}

fn authorize(ctx: &Context, name: &str) -> Result<()> {
    let platform = ctx.platform(name)?;
    let state = generate_state();
    let pkce = platform.requires_pkce().then(PkcePair::generate);
    let url = platform.authorization_url(&state, pkce.as_ref().map(|pair| pair.challenge.as_str()))?;

    println!("Open this URL to connect your {} account:", platform.kind().display_name());
    println!();
    println!("  {}", url);
    println!();
    println!("state: {}", state);
    if let Some(pair) = &pkce {
        println!("code verifier: {}", pair.verifier);
    }
    println!();
    println!(
        "Then run: share-creds connect {} --code <code>{}",
        platform.kind(),
        if pkce.is_some() { " --code-verifier <verifier>" } else { "" }
    );

    Ok(())
}

async fn connect(ctx: &Context, name: &str, code: String, code_verifier: Option<String>) -> Result<()> {
    let platform = ctx.platform(name)?;

    if platform.requires_pkce() && code_verifier.is_none() {
        return Err(SharecastError::InvalidInput(format!(
            "{} requires --code-verifier (printed by `share-creds authorize {}`)",
            platform.kind().display_name(),
            platform.kind()
        ))
        .into());
    }

    let grant = match code_verifier {
        Some(verifier) => AuthorizationGrant::new(code).with_verifier(verifier),
        None => AuthorizationGrant::new(code),
    };
    let connection = platform.exchange_token(&grant).await?;
    ctx.db.save_connection(&ctx.user, &connection).await?;

    info!("Stored {} connection for user {}", platform.kind(), ctx.user);
    println!(
        "✓ Connected {} as {}",
        platform.kind().display_name(),
        connection.username
    );
    Ok(())
}

async fn list_connections(ctx: &Context, format: &str) -> Result<()> {
    let now = Utc::now();
    let mut summaries: Vec<_> = ctx
        .db
        .user_connections(&ctx.user)
        .await?
        .values()
        .map(|connection| connection.summary(now))
        .collect();
    summaries.sort_by_key(|summary| summary.platform);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summaries)?),
        "text" => {
            if summaries.is_empty() {
                println!("No connections for user {}", ctx.user);
                println!("Run 'share-creds authorize <platform>' to connect an account.");
                return Ok(());
            }
            for summary in &summaries {
                let status = match summary.expires_at {
                    _ if summary.expired => "expired".to_string(),
                    Some(expires_at) => format!("expires {}", expires_at.format("%Y-%m-%d %H:%M UTC")),
                    None => "no expiry".to_string(),
                };
                println!("{}: {} ({})", summary.platform, summary.username, status);
            }
        }
        other => {
            return Err(SharecastError::InvalidInput(format!(
                "Invalid format: '{}'. Valid options: text, json",
                other
            ))
            .into())
        }
    }

    Ok(())
}

async fn refresh(ctx: &Context, name: &str) -> Result<()> {
    let platform = ctx.platform(name)?;
    let kind = platform.kind();

    let connections = ctx.db.user_connections(&ctx.user).await?;
    let Some(current) = connections.get(&kind) else {
        bail!("No {} connection for user {}", kind.display_name(), ctx.user);
    };

    let refreshed = platform.refresh_connection(current).await?;
    ctx.db.save_connection(&ctx.user, &refreshed).await?;

    match refreshed.expires_at {
        Some(expires_at) => println!(
            "✓ Refreshed {} (expires {})",
            kind.display_name(),
            expires_at.format("%Y-%m-%d %H:%M UTC")
        ),
        None => println!("✓ Refreshed {}", kind.display_name()),
    }
    Ok(())
}

async fn disconnect(ctx: &Context, name: &str) -> Result<()> {
    let kind: PlatformKind = name.parse()?;

    if !ctx.db.delete_connection(&ctx.user, kind).await? {
        bail!("No {} connection for user {}", kind.display_name(), ctx.user);
    }

    println!("✓ Disconnected {}", kind.display_name());
    Ok(())
}
