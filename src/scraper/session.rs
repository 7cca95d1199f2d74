//! One authenticated identity against the private API.
//!
//! An `XSession` owns everything a browser tab would: cookie jar, CSRF
//! token, login state, a consistent browser header profile, and its own
//! rate limiter. Sessions are created once at startup per credential set
//! and live for the whole process; login state flips between authenticated
//! and not as the server accepts or rejects the cookies.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::ScrapeError;
use crate::models::{NewTweet, Tweet, TweetsResult};

use super::cookies::{
    CookieRepository, CredentialKey, SessionJar, AUTH_TOKEN_COOKIE, CSRF_COOKIE,
};
use super::graphql::{Catalog, Operation};
use super::headers::BrowserProfile;
use super::login::LoginFlow;
use super::rate_limit::RateLimiter;
use super::timeline::{
    convert_timeline, convert_tweet, CreateTweetResponse, SearchTimelineResponse,
    TweetDetailResponse, TweetResult,
};
use super::transaction::TransactionSigner;
use super::ScraperConfig;

pub const BASE_URL: &str = "https://x.com";
pub const API_BASE_URL: &str = "https://api.x.com";

/// Bearer token of the public web app; constant across accounts.
pub const WEB_APP_BEARER_TOKEN: &str =
    "Bearer AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";

const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// One account's login material. The OAuth1 fields are optional and only
/// used by deployments that also hold developer-app keys.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub email: String,
    pub api_key: Option<String>,
    pub api_key_secret: Option<String>,
    pub access_token: Option<String>,
    pub access_token_secret: Option<String>,
}

impl Credentials {
    pub fn key(&self) -> CredentialKey {
        CredentialKey {
            email: self.email.clone(),
            username: self.username.clone(),
        }
    }
}

/// Whether the one-time cookie seed from the repository has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeedState {
    Uninitialized,
    Seeding,
    Ready,
}

struct LoginState {
    logged_in: bool,
    seed: SeedState,
}

pub struct XSession {
    client: Client,
    jar: Arc<SessionJar>,
    limiter: RateLimiter,
    signer: Arc<TransactionSigner>,
    profile: BrowserProfile,
    credentials: Credentials,
    cookies: Arc<dyn CookieRepository>,
    catalog: Arc<Catalog>,
    /// Serializes login-state transitions; the whole login flow runs under
    /// this lock, so concurrent callers wait and then re-check instead of
    /// racing a second login.
    login: Mutex<LoginState>,
}

impl XSession {
    pub fn new(
        credentials: Credentials,
        cookies: Arc<dyn CookieRepository>,
        signer: Arc<TransactionSigner>,
        catalog: Arc<Catalog>,
        config: &ScraperConfig,
    ) -> Result<Self, ScrapeError> {
        let jar = Arc::new(SessionJar::new());
        let client = Client::builder()
            .timeout(DEFAULT_CLIENT_TIMEOUT)
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        Ok(Self {
            client,
            jar,
            limiter: RateLimiter::new(config.rate_limit_interval),
            signer,
            profile: BrowserProfile::random(),
            credentials,
            cookies,
            catalog,
            login: Mutex::new(LoginState {
                logged_in: false,
                seed: SeedState::Uninitialized,
            }),
        })
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// True when a request could go out without waiting on the limiter.
    pub fn ready(&self) -> bool {
        self.limiter.ready()
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn jar(&self) -> &SessionJar {
        &self.jar
    }

    pub(crate) fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub(crate) fn cookie_repository(&self) -> &dyn CookieRepository {
        self.cookies.as_ref()
    }

    /// Headers every private-API request carries: transaction id, the
    /// session's browser profile, bearer token, and CSRF mirror of `ct0`.
    /// Only unset headers are filled, so callers can override any of them.
    pub(crate) fn request_headers(
        &self,
        method: &str,
        path: &str,
    ) -> Result<HeaderMap, ScrapeError> {
        let mut headers = HeaderMap::new();

        let transaction_id = self.signer.generate(method, path)?;
        if let Ok(value) = HeaderValue::from_str(&transaction_id) {
            headers.insert("x-client-transaction-id", value);
        }

        self.profile.apply(&mut headers);

        if !headers.contains_key(header::REFERER) {
            headers.insert(header::REFERER, HeaderValue::from_static("https://x.com/home"));
        }
        if !headers.contains_key(header::AUTHORIZATION) {
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_static(WEB_APP_BEARER_TOKEN),
            );
        }
        if let Some(csrf) = self.jar.get(CSRF_COOKIE) {
            if let Ok(value) = HeaderValue::from_str(&csrf) {
                headers.insert("x-csrf-token", value);
            }
        }

        Ok(headers)
    }

    /// Send one request through the limiter and feed rate-limit headers
    /// back. Transport errors propagate untouched.
    pub(crate) async fn execute(&self, request: RequestBuilder) -> Result<Response, ScrapeError> {
        self.limiter.acquire().await;
        let response = request.send().await?;
        self.limiter.observe(response.headers());
        Ok(response)
    }

    /// `execute` plus status check and JSON decode. Non-2xx becomes
    /// `BadRequest` with the raw body retained.
    pub(crate) async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ScrapeError> {
        let response = self.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ScrapeError::BadRequest { status, body });
        }

        serde_json::from_str(&body).map_err(ScrapeError::Decode)
    }

    /// One-time seed of session state from the external cookie store.
    /// Failures are logged, not propagated: the session can still log in
    /// from scratch.
    async fn seed_from_repository(&self) {
        let mut state = self.login.lock().await;
        if state.seed != SeedState::Uninitialized {
            return;
        }
        state.seed = SeedState::Seeding;

        match self.cookies.load(&self.credentials.key()).await {
            Ok(Some(cookies)) if !cookies.is_empty() => {
                self.jar.install(&cookies);
                state.logged_in = true;
                info!(username = %self.credentials.username, "session seeded from stored cookies");
            }
            Ok(_) => {}
            Err(err) => {
                error!(username = %self.credentials.username, error = %err, "cookie load failed");
            }
        }
        state.seed = SeedState::Ready;
    }

    /// Fast-path: authenticated when both the auth and CSRF cookies are
    /// present. Otherwise runs the full login flow under the login lock.
    pub async fn ensure_logged_in(&self) -> Result<(), ScrapeError> {
        let mut state = self.login.lock().await;

        if state.logged_in {
            if self.jar.contains(AUTH_TOKEN_COOKIE) && self.jar.contains(CSRF_COOKIE) {
                return Ok(());
            }
            state.logged_in = false;
        }

        info!(username = %self.credentials.username, "logging in");
        LoginFlow::new(self).run().await?;
        state.logged_in = true;
        info!(username = %self.credentials.username, "login complete");
        Ok(())
    }

    /// Drop all authentication state; the next call logs in again.
    async fn mark_logged_out(&self) {
        let mut state = self.login.lock().await;
        state.logged_in = false;
        self.jar.clear();
    }

    pub async fn get_graphql<T: DeserializeOwned>(
        &self,
        op: &Operation,
        variables: Value,
    ) -> Result<T, ScrapeError> {
        self.do_graphql(Method::GET, op, variables).await
    }

    pub async fn post_graphql<T: DeserializeOwned>(
        &self,
        op: &Operation,
        variables: Value,
    ) -> Result<T, ScrapeError> {
        self.do_graphql(Method::POST, op, variables).await
    }

    /// The authenticated request loop: ensure login, execute, and on a
    /// 401/403 clear the session and go around again. Any other outcome —
    /// success, transport error, decode error, other statuses — returns
    /// immediately. Login failure inside the loop is terminal (see
    /// `login.rs`), which bounds the iterations.
    async fn do_graphql<T: DeserializeOwned>(
        &self,
        method: Method,
        op: &Operation,
        variables: Value,
    ) -> Result<T, ScrapeError> {
        self.seed_from_repository().await;

        loop {
            self.ensure_logged_in().await?;

            match self.do_graphql_once(&method, op, &variables).await {
                Err(err) if err.is_unauthorized() => {
                    debug!(op = op.name, "session rejected, re-authenticating");
                    self.mark_logged_out().await;
                    continue;
                }
                other => return other,
            }
        }
    }

    async fn do_graphql_once<T: DeserializeOwned>(
        &self,
        method: &Method,
        op: &Operation,
        variables: &Value,
    ) -> Result<T, ScrapeError> {
        let path = op.path();
        let url = format!("{BASE_URL}{path}");
        let headers = self.request_headers(method.as_str(), &path)?;

        let request = if *method == Method::GET {
            let mut request = self.client.get(&url).headers(headers).query(&[
                ("variables", variables.to_string()),
                ("features", op.features.to_string()),
            ]);
            if let Some(toggles) = &op.field_toggles {
                request = request.query(&[("fieldToggles", toggles.to_string())]);
            }
            request
        } else {
            self.client.post(&url).headers(headers).json(&json!({
                "queryId": op.query_id,
                "variables": variables,
                "features": op.features,
            }))
        };

        self.execute_json(request).await
    }

    // -----------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------

    /// Fetch the conversation page rooted at `id`.
    pub async fn get_tweets(&self, id: &str) -> Result<TweetsResult, ScrapeError> {
        let variables = json!({
            "focalTweetId": id,
            "referrer": "home",
            "rankingMode": "Relevance",
            "includePromotedContent": true,
            "withCommunity": true,
            "withQuickPromoteEligibilityTweetFields": true,
            "withBirdwatchNotes": true,
            "withVoice": true,
        });

        let response: TweetDetailResponse = self
            .get_graphql(&self.catalog.tweet_detail, variables)
            .await?;

        let result = convert_timeline(
            response
                .data
                .threaded_conversation_with_injections_v2
                .as_ref(),
        )?;

        if result.tweets.is_empty() {
            return Err(ScrapeError::NoTweetFound);
        }

        Ok(result)
    }

    /// Search recent tweets. A 404 from the search endpoint means "nothing
    /// matched" and yields an empty list rather than an error.
    pub async fn search_tweets(
        &self,
        query: &str,
        max_tweets: usize,
    ) -> Result<Vec<Tweet>, ScrapeError> {
        let count = match max_tweets {
            0 => 20,
            n => n.min(50),
        };
        let variables = json!({
            "rawQuery": query,
            "count": count,
            "querySource": "typed_query",
            "product": "Top",
        });

        let response: SearchTimelineResponse = match self
            .get_graphql(&self.catalog.search_timeline, variables)
            .await
        {
            Ok(response) => response,
            Err(ScrapeError::BadRequest { status, .. }) if status == StatusCode::NOT_FOUND => {
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let timeline = response
            .data
            .search_by_raw_query
            .as_ref()
            .and_then(|s| s.search_timeline.as_ref())
            .and_then(|s| s.timeline.as_ref());

        Ok(convert_timeline(timeline)?.tweets)
    }

    /// Recent mentions of this session's account, excluding its own
    /// replies.
    pub async fn get_mentions(&self) -> Result<Vec<Tweet>, ScrapeError> {
        let query = format!("(@{}) filter:replies", self.credentials.username);
        let tweets = self.search_tweets(&query, 20).await?;

        Ok(tweets
            .into_iter()
            .filter(|tweet| {
                tweet
                    .author
                    .as_ref()
                    .map(|author| author.screen_name != self.credentials.username)
                    .unwrap_or(true)
            })
            .collect())
    }

    /// Post a tweet (usually a reply with attached media).
    pub async fn create_tweet(&self, new_tweet: NewTweet) -> Result<Tweet, ScrapeError> {
        let variables = create_tweet_variables(&new_tweet);

        let response: CreateTweetResponse = self
            .post_graphql(&self.catalog.create_tweet, variables)
            .await?;

        if let Some(errors) = &response.errors {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(ScrapeError::Api(message));
            }
        }

        let raw = response
            .data
            .create_tweet
            .as_ref()
            .and_then(|inner| inner.tweet_results.result.as_ref())
            .and_then(TweetResult::as_tweet);

        convert_tweet(raw)
    }
}

fn create_tweet_variables(new_tweet: &NewTweet) -> Value {
    let media_entities: Vec<Value> = new_tweet
        .media_ids
        .iter()
        .enumerate()
        .map(|(index, media_id)| {
            let tagged: Vec<String> = new_tweet
                .tagged_users
                .get(index)
                .cloned()
                .unwrap_or_default();
            json!({"media_id": media_id, "tagged_users": tagged})
        })
        .collect();

    let mut variables = json!({
        "tweet_text": new_tweet.text,
        "dark_request": false,
        "media": {
            "media_entities": media_entities,
            "possibly_sensitive": false,
        },
        "semantic_annotation_ids": [],
        "disallowed_reply_options": null,
    });

    if let Some(reply_to) = &new_tweet.in_reply_to_tweet_id {
        variables["reply"] = json!({
            "exclude_reply_user_ids": [],
            "in_reply_to_tweet_id": reply_to,
        });
    }
    if let Some(attachment) = &new_tweet.attachment_url {
        variables["attachment_url"] = json!(attachment);
    }
    if let Some(mode) = &new_tweet.conversation_control_mode {
        variables["conversation_control"] = json!({"mode": mode});
    }

    variables
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::cookies::{NullCookieRepository, SessionCookie};
    use crate::scraper::transaction::TransactionSigner;

    fn test_session() -> XSession {
        let signer = TransactionSigner::with_pairs(vec![("anim".into(), vec![1, 2, 3, 4])]);
        XSession::new(
            Credentials {
                username: "botuser".into(),
                password: "secret".into(),
                email: "bot@example.com".into(),
                ..Default::default()
            },
            Arc::new(NullCookieRepository),
            signer,
            Arc::new(Catalog::default()),
            &ScraperConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn request_headers_carry_auth_and_fingerprint() {
        let session = test_session();
        let headers = session
            .request_headers("GET", "/i/api/graphql/abc/TweetDetail")
            .unwrap();

        assert!(headers.contains_key("x-client-transaction-id"));
        assert_eq!(
            headers.get(header::AUTHORIZATION).unwrap(),
            WEB_APP_BEARER_TOKEN
        );
        assert_eq!(headers.get(header::REFERER).unwrap(), "https://x.com/home");
        assert!(headers.contains_key("user-agent"));
        // No CSRF cookie yet, so no CSRF header.
        assert!(!headers.contains_key("x-csrf-token"));
    }

    #[test]
    fn csrf_header_mirrors_cookie() {
        let session = test_session();
        session.jar().set(SessionCookie {
            name: CSRF_COOKIE.into(),
            value: "csrf-value".into(),
            domain: ".x.com".into(),
        });

        let headers = session.request_headers("POST", "/path").unwrap();
        assert_eq!(headers.get("x-csrf-token").unwrap(), "csrf-value");
    }

    #[test]
    fn create_tweet_variables_minimal() {
        let variables = create_tweet_variables(&NewTweet {
            text: "hello".into(),
            ..Default::default()
        });

        assert_eq!(variables["tweet_text"], "hello");
        assert!(variables["media"]["media_entities"]
            .as_array()
            .unwrap()
            .is_empty());
        assert!(variables.get("reply").is_none());
    }

    #[test]
    fn create_tweet_variables_with_reply_and_media() {
        let variables = create_tweet_variables(&NewTweet {
            text: "reply".into(),
            media_ids: vec!["m1".into(), "m2".into()],
            tagged_users: vec![vec!["friend".into()]],
            in_reply_to_tweet_id: Some("123".into()),
            conversation_control_mode: Some("Community".into()),
            ..Default::default()
        });

        let entities = variables["media"]["media_entities"].as_array().unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0]["media_id"], "m1");
        assert_eq!(entities[0]["tagged_users"][0], "friend");
        assert!(entities[1]["tagged_users"].as_array().unwrap().is_empty());
        assert_eq!(variables["reply"]["in_reply_to_tweet_id"], "123");
        assert_eq!(variables["conversation_control"]["mode"], "Community");
    }
}
