//! Session cookie state and the persistence boundary.
//!
//! Each session owns a [`SessionJar`] plugged into its HTTP client; the jar
//! is the single mutation point for cookie state and can be snapshotted for
//! persistence or cleared when the server stops accepting the session.
//! Storage itself is an external collaborator behind [`CookieRepository`],
//! keyed by `(email, username)`.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use url::Url;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";
pub const CSRF_COOKIE: &str = "ct0";
pub const GUEST_TOKEN_COOKIE: &str = "gt";

/// One persisted cookie. Attributes beyond the domain are not kept; the
/// session only ever talks to the platform's own hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// Identifies one credential set in the cookie store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialKey {
    pub email: String,
    pub username: String,
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.email, self.username)
    }
}

/// External cookie persistence. Load is called exactly once per session
/// lifetime; save once per successful login.
#[async_trait]
pub trait CookieRepository: Send + Sync {
    /// Returns `None` when no cookie set exists for the key.
    async fn load(&self, key: &CredentialKey) -> anyhow::Result<Option<Vec<SessionCookie>>>;

    async fn save(&self, key: &CredentialKey, cookies: &[SessionCookie]) -> anyhow::Result<()>;
}

/// A repository that never has cookies and discards saves. Useful for
/// probes and tests where persistence is not wired up.
pub struct NullCookieRepository;

#[async_trait]
impl CookieRepository for NullCookieRepository {
    async fn load(&self, _key: &CredentialKey) -> anyhow::Result<Option<Vec<SessionCookie>>> {
        Ok(None)
    }

    async fn save(&self, _key: &CredentialKey, _cookies: &[SessionCookie]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// In-memory cookie jar for one session, shared with its `reqwest::Client`.
///
/// Name-keyed rather than (domain, path)-keyed: every request a session
/// makes goes to the platform's hosts (`x.com`, `api.x.com`,
/// `upload.x.com`), which all share the `.x.com` cookie scope.
#[derive(Default)]
pub struct SessionJar {
    inner: RwLock<BTreeMap<String, SessionCookie>>,
}

impl SessionJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.inner.read().get(name).map(|c| c.value.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    /// Insert or replace a cookie by name.
    pub fn set(&self, cookie: SessionCookie) {
        self.inner.write().insert(cookie.name.clone(), cookie);
    }

    /// Drop all cookie state. Used when the server rejects the session.
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Copy of the full cookie set, for persistence.
    pub fn snapshot(&self) -> Vec<SessionCookie> {
        self.inner.read().values().cloned().collect()
    }

    /// Merge an externally loaded cookie set into the jar.
    pub fn install(&self, cookies: &[SessionCookie]) {
        let mut store = self.inner.write();
        for cookie in cookies {
            let mut cookie = cookie.clone();
            if cookie.domain.is_empty() {
                cookie.domain = ".x.com".to_owned();
            }
            store.insert(cookie.name.clone(), cookie);
        }
    }
}

fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_owned(), value.trim().to_owned()))
}

impl reqwest::cookie::CookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let domain = url
            .host_str()
            .map(|h| format!(".{}", h.trim_start_matches("www.")))
            .unwrap_or_else(|| ".x.com".to_owned());

        let mut store = self.inner.write();
        for header in cookie_headers {
            let Ok(raw) = header.to_str() else { continue };
            if let Some((name, value)) = parse_set_cookie(raw) {
                store.insert(
                    name.clone(),
                    SessionCookie {
                        name,
                        value,
                        domain: domain.clone(),
                    },
                );
            }
        }
    }

    fn cookies(&self, _url: &Url) -> Option<HeaderValue> {
        let store = self.inner.read();
        if store.is_empty() {
            return None;
        }
        let header = store
            .values()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&header).ok()
    }
}
