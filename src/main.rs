use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use rssbot::config::Config;
use rssbot::feed::{build_http_client, FeedSource, FetchPolicy, HttpFeedSource};
use rssbot::poll::{PollContext, PollOptions, Poller, Scheduler};
use rssbot::storage::{Database, NewUser, StoreError, SubscriptionStore};
use rssbot::transport::{LogTransport, TelegramTransport, Transport};
use rssbot::util::normalize_feed_url;

/// Get the config directory path (~/.config/rssbot/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("rssbot"))
}

#[derive(Parser, Debug)]
#[command(name = "rssbot", about = "Polls RSS/Atom feeds and notifies subscribers of new entries")]
struct Args {
    /// Config file (default: ~/.config/rssbot/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the poll scheduler until Ctrl-C
    Run {
        /// Log notifications instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// Register a user, or re-activate one that stopped
    Register {
        user_id: i64,
        /// Omitted profile fields keep their stored value
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
    },
    /// Subscribe a user to a feed under an alias
    Add {
        user_id: i64,
        url: String,
        alias: String,
        /// Skip the test fetch of the feed
        #[arg(long)]
        no_verify: bool,
    },
    /// Remove a user's subscription by alias
    Remove { user_id: i64, alias: String },
    /// List a user's subscriptions
    List { user_id: i64 },
    /// Send the newest entries of one subscription to the user now
    Get {
        user_id: i64,
        alias: String,
        count: Option<usize>,
    },
    /// Stop all notifications for a user
    Stop { user_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = config.database_path_in(&config_dir);
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => Arc::new(db),
        Err(StoreError::InstanceLocked) => {
            eprintln!("Error: the database is locked by another rssbot process.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let client = build_http_client(config.request_timeout()).context("Failed to build HTTP client")?;
    let source: Arc<dyn FeedSource> = Arc::new(HttpFeedSource::new(
        client.clone(),
        FetchPolicy {
            timeout: config.request_timeout(),
            max_retries: config.fetch_retries,
            ..FetchPolicy::default()
        },
    ));

    match args.command {
        Command::Run { dry_run } => {
            let transport = make_transport(&config, client, dry_run)?;
            run(&config, db, source, transport).await
        }
        Command::Register {
            user_id,
            username,
            first_name,
        } => {
            let outcome = db
                .register_user(&NewUser {
                    username,
                    first_name,
                    ..NewUser::with_id(user_id)
                })
                .await?;
            println!("User {user_id}: {outcome:?}");
            Ok(())
        }
        Command::Add {
            user_id,
            url,
            alias,
            no_verify,
        } => {
            let url = normalize_feed_url(&url)?;
            if !no_verify {
                let entries = source
                    .fetch(url.as_str())
                    .await
                    .with_context(|| format!("{url} does not look like a working feed"))?;
                println!("Feed OK, {} entries", entries.len());
            }
            let bookmark = db.add_bookmark(user_id, url.as_str(), alias.trim()).await?;
            println!("Added '{}' -> {}", bookmark.alias, bookmark.url);
            Ok(())
        }
        Command::Remove { user_id, alias } => {
            match db.remove_bookmark(user_id, &alias).await? {
                Some(b) => println!("Removed '{}' ({})", b.alias, b.url),
                None => println!("No subscription named '{alias}'"),
            }
            Ok(())
        }
        Command::List { user_id } => {
            let bookmarks = db.list_bookmarks(user_id).await?;
            if bookmarks.is_empty() {
                println!("No subscriptions");
            }
            for b in bookmarks {
                println!("{}\t{}", b.alias, b.url);
            }
            Ok(())
        }
        Command::Get {
            user_id,
            alias,
            count,
        } => {
            let transport = make_transport(&config, client, false)?;
            let poller = Poller::new(
                PollContext {
                    store: db.clone(),
                    cursors: db,
                    source,
                    transport,
                },
                poll_options(&config),
            );
            let sent = poller.fetch_latest(user_id, &alias, count).await?;
            println!("Sent {sent} entries");
            Ok(())
        }
        Command::Stop { user_id } => {
            if db.set_user_active(user_id, false).await? {
                println!("User {user_id} stopped");
            } else {
                println!("User {user_id} was not active");
            }
            Ok(())
        }
    }
}

fn poll_options(config: &Config) -> PollOptions {
    PollOptions {
        fetch_concurrency: config.fetch_concurrency,
        dispatch_concurrency: config.dispatch_concurrency,
        seen_window: config.seen_window,
    }
}

fn make_transport(
    config: &Config,
    client: reqwest::Client,
    dry_run: bool,
) -> Result<Arc<dyn Transport>> {
    if dry_run {
        return Ok(Arc::new(LogTransport));
    }
    let token = config
        .bot_token()
        .context("No bot token: set BOT_TOKEN or bot_token in the config file")?;
    Ok(Arc::new(TelegramTransport::new(
        client,
        config.telegram_api_url.clone(),
        token,
        config.request_timeout(),
    )))
}

async fn run(
    config: &Config,
    db: Arc<Database>,
    source: Arc<dyn FeedSource>,
    transport: Arc<dyn Transport>,
) -> Result<()> {
    let poller = Poller::new(
        PollContext {
            store: db.clone(),
            cursors: db.clone(),
            source,
            transport,
        },
        poll_options(config),
    );
    let handle = Scheduler::spawn(Arc::new(poller), config.poll_interval());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    let stats = handle.shutdown(config.shutdown_grace()).await;
    tracing::info!(
        cycles = stats.cycles_completed,
        skipped_ticks = stats.ticks_skipped,
        "Scheduler stopped"
    );
    db.close().await;
    Ok(())
}
