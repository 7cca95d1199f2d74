//! Private-API scraper core.
//!
//! The layering, outside-in: a [`pool::SessionPool`] falls back across
//! independent [`session::XSession`]s; each session call passes through the
//! transaction-id signer, the session's browser profile, and its rate
//! limiter before hitting the network, and responses come back through the
//! timeline decoder into the domain model. Thread reconstruction and media
//! upload sit on top of a session's operations.

pub mod cookies;
pub mod entities;
pub mod graphql;
pub mod headers;
pub mod login;
pub mod media;
pub mod pool;
pub mod rate_limit;
pub mod session;
pub mod thread;
pub mod timeline;
pub mod transaction;

use std::time::Duration;

pub use cookies::{CookieRepository, CredentialKey, NullCookieRepository, SessionCookie};
pub use graphql::Catalog;
pub use pool::{FallbackPool, SessionPool};
pub use session::{Credentials, XSession};
pub use thread::{reconstruct_thread, TweetFetcher};
pub use transaction::{TransactionSigner, PAIR_DICT_URL};

/// Core tunables, loaded from the environment with production defaults.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Minimum spacing between two requests on one session.
    pub rate_limit_interval: Duration,
    /// How often the transaction key table is refreshed.
    pub key_refresh_interval: Duration,
    /// Where the transaction key table is fetched from.
    pub pair_dict_url: String,
    /// Fetch bound for one thread reconstruction.
    pub thread_max_attempts: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            rate_limit_interval: rate_limit::DEFAULT_REFILL_INTERVAL,
            key_refresh_interval: transaction::DEFAULT_REFRESH_INTERVAL,
            pair_dict_url: PAIR_DICT_URL.to_owned(),
            thread_max_attempts: thread::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ScraperConfig {
    /// Load from environment with defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("SCRAPER_RATE_LIMIT_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                config.rate_limit_interval = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = std::env::var("SCRAPER_KEY_REFRESH_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                config.key_refresh_interval = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("SCRAPER_PAIR_DICT_URL") {
            if !v.is_empty() {
                config.pair_dict_url = v;
            }
        }
        if let Ok(v) = std::env::var("SCRAPER_THREAD_MAX_ATTEMPTS") {
            if let Ok(attempts) = v.parse::<usize>() {
                config.thread_max_attempts = attempts.max(1);
            }
        }

        config
    }
}
