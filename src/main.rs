//! Threadbot operator probe.
//!
//! Small CLI over the scraper core: fetch a full thread, list mentions,
//! search, or post a reply with media. The bot's job handlers call the
//! same library operations; this binary exists so an operator can exercise
//! them with real credentials without running the whole bot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use threadbot_scraper::scraper::pool::SessionPool;
use threadbot_scraper::{
    reconstruct_thread, Catalog, CookieRepository, CredentialKey, Credentials, NewTweet,
    ScraperConfig, SessionCookie, TransactionSigner, XSession,
};

#[derive(Parser)]
#[command(name = "threadbot", about = "Operator probe for the scraper core")]
struct Cli {
    /// Directory where session cookies are persisted between runs.
    #[arg(long, env = "SCRAPER_COOKIE_DIR", default_value = ".cookies")]
    cookie_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconstruct the full conversation containing a tweet.
    Thread {
        id: String,
        #[arg(long, default_value_t = 10)]
        max_attempts: usize,
    },
    /// List recent mentions of the configured account.
    Mentions,
    /// Search recent tweets.
    Search {
        query: String,
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
    /// Post a tweet, optionally as a reply and with attached media.
    Post {
        text: String,
        #[arg(long)]
        reply_to: Option<String>,
        #[arg(long)]
        media: Option<PathBuf>,
    },
}

/// Cookie persistence for the probe: one JSON file per credential key.
/// The bot proper keeps these in its database instead.
struct FileCookieStore {
    dir: PathBuf,
}

impl FileCookieStore {
    fn path(&self, key: &CredentialKey) -> PathBuf {
        let sanitize = |s: &str| {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect::<String>()
        };
        self.dir
            .join(format!("{}_{}.json", sanitize(&key.email), sanitize(&key.username)))
    }
}

#[async_trait]
impl CookieRepository for FileCookieStore {
    async fn load(&self, key: &CredentialKey) -> Result<Option<Vec<SessionCookie>>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, key: &CredentialKey, cookies: &[SessionCookie]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(cookies)?;
        tokio::fs::write(self.path(key), bytes).await?;
        Ok(())
    }
}

/// `SCRAPER_ACCOUNTS=user:pass:email;user2:pass2:email2`, or a single
/// account via `SCRAPER_USERNAME` / `SCRAPER_PASSWORD` / `SCRAPER_EMAIL`.
fn credentials_from_env() -> Result<Vec<Credentials>> {
    if let Ok(accounts) = std::env::var("SCRAPER_ACCOUNTS") {
        let mut credentials = Vec::new();
        for entry in accounts.split(';').filter(|e| !e.trim().is_empty()) {
            let parts: Vec<&str> = entry.trim().splitn(3, ':').collect();
            if parts.len() != 3 {
                bail!("malformed SCRAPER_ACCOUNTS entry (want user:pass:email): {entry}");
            }
            credentials.push(Credentials {
                username: parts[0].to_owned(),
                password: parts[1].to_owned(),
                email: parts[2].to_owned(),
                ..Default::default()
            });
        }
        if credentials.is_empty() {
            bail!("SCRAPER_ACCOUNTS is set but contains no accounts");
        }
        return Ok(credentials);
    }

    let username = std::env::var("SCRAPER_USERNAME").context("SCRAPER_USERNAME not set")?;
    let password = std::env::var("SCRAPER_PASSWORD").context("SCRAPER_PASSWORD not set")?;
    let email = std::env::var("SCRAPER_EMAIL").context("SCRAPER_EMAIL not set")?;

    Ok(vec![Credentials {
        username,
        password,
        email,
        ..Default::default()
    }])
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ScraperConfig::from_env();

    let signer = TransactionSigner::bootstrap(config.pair_dict_url.clone())
        .await
        .context("fetch transaction key table")?;
    let _refresh = signer.start_refresh(config.key_refresh_interval);

    let cookie_store: Arc<dyn CookieRepository> = Arc::new(FileCookieStore {
        dir: cli.cookie_dir.clone(),
    });
    let catalog = Arc::new(Catalog::default());

    let credentials = credentials_from_env()?;
    info!(accounts = credentials.len(), "building sessions");

    let sessions: Vec<Arc<XSession>> = credentials
        .into_iter()
        .map(|creds| {
            XSession::new(
                creds,
                Arc::clone(&cookie_store),
                Arc::clone(&signer),
                Arc::clone(&catalog),
                &config,
            )
            .map(Arc::new)
        })
        .collect::<Result<_, _>>()
        .context("build sessions")?;

    let pool = SessionPool::new(&sessions);

    match cli.command {
        Command::Thread { id, max_attempts } => {
            let thread = pool
                .try_with(|session| {
                    let id = id.clone();
                    async move { reconstruct_thread(session.as_ref(), &id, max_attempts).await }
                })
                .await?;
            info!(tweets = thread.len(), "thread reconstructed");
            println!("{}", serde_json::to_string_pretty(&thread)?);
        }
        Command::Mentions => {
            let mentions = pool
                .try_with(|session| async move { session.get_mentions().await })
                .await?;
            info!(mentions = mentions.len(), "mentions fetched");
            println!("{}", serde_json::to_string_pretty(&mentions)?);
        }
        Command::Search { query, count } => {
            let tweets = pool
                .try_with(|session| {
                    let query = query.clone();
                    async move { session.search_tweets(&query, count).await }
                })
                .await?;
            info!(tweets = tweets.len(), "search complete");
            println!("{}", serde_json::to_string_pretty(&tweets)?);
        }
        Command::Post {
            text,
            reply_to,
            media,
        } => {
            // Posting is not idempotent; use one session rather than
            // falling back across accounts on failure.
            let session = sessions.first().context("no sessions configured")?;

            let mut media_ids = Vec::new();
            if let Some(path) = media {
                let uploaded = upload_file(session, &path).await?;
                info!(media_id = %uploaded, "media uploaded");
                media_ids.push(uploaded);
            }

            let tweet = session
                .create_tweet(NewTweet {
                    text,
                    media_ids,
                    in_reply_to_tweet_id: reply_to,
                    ..Default::default()
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&tweet)?);
        }
    }

    Ok(())
}

async fn upload_file(session: &XSession, path: &Path) -> Result<String> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("open media file {}", path.display()))?;
    let size = file.metadata().await?.len() as usize;
    if size == 0 {
        warn!(path = %path.display(), "media file is empty");
    }

    let result = session.upload_media(file, size).await?;
    Ok(result.media_id)
}
