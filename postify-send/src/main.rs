//! postify-send - Background daemon for scheduled publishing
//!
//! Polls for scheduled posts whose time has come and publishes them to the
//! configured default platforms.

use clap::Parser;
use libpostify::config::Config;
use libpostify::error::ConfigError;
use libpostify::logging::LoggingConfig;
use libpostify::{
    Database, MultiPlatformPoster, PlatformKind, PlatformSelection, PostStatus, PostifyError,
    PublishCredentials, Result,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "postify-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled publishing")]
#[command(long_about = "\
postify-send - Background daemon for scheduled publishing

DESCRIPTION:
    postify-send polls the Postify database and publishes every scheduled
    post whose time has come to the platforms listed in
    [scheduling] default_platforms. Results are recorded exactly as for a
    publish made through the HTTP API.

USAGE:
    # Run in foreground (logs to stderr)
    postify-send

    # Poll every 30 seconds
    postify-send --poll-interval 30

    # Publish every draft to Telegram once, then exit
    postify-send --drafts

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current poll)

CONFIGURATION:
    Configuration file: ~/.config/postify/config.toml (or POSTIFY_CONFIG)

    [scheduling]
    poll_interval = 60
    default_platforms = [\"telegram\"]

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
    3 - Invalid input
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Process due posts once and exit
    #[arg(long)]
    once: bool,

    /// Publish every draft post to Telegram once and exit
    #[arg(long, conflicts_with = "once")]
    drafts: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    LoggingConfig::from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("postify-send: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let selection = default_selection(&config)?;
    let db = Database::new(&config.database_path()).await?;
    let poster = MultiPlatformPoster::from_config(&config, Arc::new(db.clone()))?;

    if cli.drafts {
        return publish_drafts(&db, &poster).await;
    }

    if cli.once {
        process_due_posts(&db, &poster, &selection).await?;
        info!("postify-send: processed due posts once, exiting");
        return Ok(());
    }

    info!("postify-send daemon starting");
    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poll_interval = cli.poll_interval.unwrap_or(config.scheduling.poll_interval);
    info!("Poll interval: {}s", poll_interval);
    run_daemon_loop(&db, &poster, &selection, poll_interval, shutdown).await;

    info!("postify-send daemon stopped");
    Ok(())
}

fn default_selection(config: &Config) -> Result<PlatformSelection> {
    let platforms = config
        .scheduling
        .default_platforms
        .iter()
        .map(|name| {
            name.parse::<PlatformKind>().map_err(|e| {
                PostifyError::from(ConfigError::InvalidValue {
                    field: "scheduling.default_platforms",
                    reason: e.to_string(),
                })
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if platforms.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "scheduling.default_platforms",
            reason: "at least one platform is required".to_string(),
        }
        .into());
    }
    Ok(PlatformSelection::only(&platforms))
}

#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Received shutdown signal, stopping gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });
    Ok(())
}

async fn run_daemon_loop(
    db: &Database,
    poster: &MultiPlatformPoster,
    selection: &PlatformSelection,
    poll_interval: u64,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        if let Err(e) = process_due_posts(db, poster, selection).await {
            error!("Error processing posts: {}", e);
        }

        // Sleep until next poll, checking for shutdown every second
        for _ in 0..poll_interval.max(1) {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}

async fn process_due_posts(
    db: &Database,
    poster: &MultiPlatformPoster,
    selection: &PlatformSelection,
) -> Result<()> {
    let due_posts = db
        .due_scheduled_posts(chrono::Utc::now().timestamp())
        .await?;

    if due_posts.is_empty() {
        return Ok(());
    }

    info!("Found {} post(s) due for publishing", due_posts.len());

    for post in due_posts {
        let outcomes = poster
            .publish(&post.id, selection, &PublishCredentials::default())
            .await;
        for outcome in outcomes.iter().filter(|o| !o.success) {
            warn!("Post {} on {}: {}", post.id, outcome.platform, outcome.message);
        }
    }

    Ok(())
}

async fn publish_drafts(db: &Database, poster: &MultiPlatformPoster) -> Result<()> {
    let drafts = db.posts_with_status(PostStatus::Draft).await?;
    if drafts.is_empty() {
        info!("No draft posts found");
        return Ok(());
    }

    info!("Publishing {} draft post(s) to Telegram", drafts.len());
    let telegram = PlatformSelection::only(&[PlatformKind::Telegram]);

    for post in drafts {
        let outcomes = poster
            .publish(&post.id, &telegram, &PublishCredentials::default())
            .await;
        match outcomes.first() {
            Some(o) if o.success => info!("Posted: {}", post.title),
            Some(o) => warn!("Failed to post '{}': {}", post.title, o.message),
            None => {}
        }
    }

    Ok(())
}
