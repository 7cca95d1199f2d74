//! Error taxonomy for the scraper core.
//!
//! Callers (job handlers) match on these variants to decide requeue/backoff;
//! the 401/403 re-auth loop inside a session is the only retry the core does
//! on its own, so the distinction between transport, decode, and bad-request
//! failures must survive wrapping.

use reqwest::StatusCode;
use thiserror::Error;

use crate::scraper::transaction::TransactionError;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Network-level failure (connect, TLS, timeout). Never retried here.
    #[error("send request: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body did not match the expected shape.
    #[error("decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    /// Non-2xx response, with the raw body retained for diagnostics.
    /// Only 401/403 trigger re-authentication; everything else propagates.
    #[error("bad request: {status} {body}")]
    BadRequest { status: StatusCode, body: String },

    /// Server-declared error list on a GraphQL response.
    #[error("api error: {0}")]
    Api(String),

    /// A login flow step returned an explicit error list.
    #[error("authentication error({code}): {message}")]
    Flow { code: i64, message: String },

    /// The server refused the login outright. Not retryable without new
    /// credentials or manual intervention.
    #[error("authentication denied by server")]
    LoginDenied,

    /// The login flow returned a subtask id we do not know how to answer.
    #[error("unrecognized login subtask: {0}")]
    UnknownSubtask(String),

    #[error("transaction id: {0}")]
    Transaction(#[from] TransactionError),

    /// Cookie repository failure (load or save).
    #[error("cookie store: {0}")]
    Cookies(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("missing timeline in response")]
    MissingTimeline,

    #[error("no instructions found in timeline")]
    NoInstructions,

    #[error("tweet result is empty")]
    NilTweet,

    #[error("no tweet found")]
    NoTweetFound,

    #[error("media processing failed: {0}")]
    MediaProcessing(String),

    #[error("read media: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("no sessions available")]
    NoSessions,

    /// Every session in the pool failed; the last cause is retained.
    #[error("all sessions failed, last error: {0}")]
    Exhausted(#[source] Box<ScrapeError>),

    /// A thread reconstruction fetch failed, tagged with the attempt number.
    #[error("attempt {attempt} failed: {source}")]
    Attempt {
        attempt: usize,
        #[source]
        source: Box<ScrapeError>,
    },
}

impl ScrapeError {
    /// True for the statuses that mean "session cookies are no longer
    /// accepted" rather than "this particular request was wrong".
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            ScrapeError::BadRequest { status, .. }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
        )
    }

    /// Terminal authentication failures: retrying login with the same
    /// credentials cannot succeed.
    pub fn is_terminal_auth(&self) -> bool {
        matches!(
            self,
            ScrapeError::LoginDenied | ScrapeError::UnknownSubtask(_)
        )
    }
}
