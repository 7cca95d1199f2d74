#![recursion_limit = "256"]
//! Threadbot scraper core.
//!
//! Client library for one platform's private GraphQL API: authenticated
//! sessions with a scripted login flow, anti-automation transaction ids,
//! adaptive rate limiting, polymorphic timeline decoding, thread
//! reconstruction, multi-account fallback, and chunked media upload.
//! Job handlers, storage, and the HTTP API live outside this crate.

pub mod error;
pub mod models;
pub mod scraper;

pub use error::ScrapeError;
pub use models::{
    MediaInfo, MediaUploadResult, NewTweet, Tweet, TweetEntities, TweetStats, TweetsResult, User,
};
pub use scraper::{
    reconstruct_thread, Catalog, CookieRepository, CredentialKey, Credentials, FallbackPool,
    ScraperConfig, SessionCookie, SessionPool, TransactionSigner, TweetFetcher, XSession,
};
