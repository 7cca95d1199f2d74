//! X-Client-Transaction-Id generation.
//!
//! The private API rejects requests without a transaction id header that a
//! browser would have computed from the page's verification key and loading
//! animation. We skip the in-page derivation and consume a public dictionary
//! of precomputed (animation key, verification) pairs, refreshed on a timer.
//!
//! The table is process-wide: read-locked by every request, write-locked
//! only while a refresh swaps it. After the first successful fetch it is
//! never empty again; a failed refresh keeps the stale table.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parking_lot::RwLock;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Public dictionary of (animation key, verification) pairs.
pub const PAIR_DICT_URL: &str =
    "https://raw.githubusercontent.com/fa0311/x-client-transaction-id-pair-dict/refs/heads/main/pair.json";

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Salt baked into X's client-side JavaScript.
const HASH_SALT: &str = "obfiowerehiring";

/// X's custom epoch: 2023-05-01 00:00:00 UTC.
const X_EPOCH: u64 = 1_682_924_400;

const PROTOCOL_VERSION: u8 = 3;

#[derive(Debug, Error)]
pub enum TransactionError {
    /// The table never got populated; the caller cannot function without it.
    #[error("verification key table is empty")]
    EmptyKeyTable,

    #[error("fetch key table: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("key table fetch returned status {0}")]
    FetchStatus(reqwest::StatusCode),

    #[error("key table contains no pairs")]
    NoPairs,

    #[error("decode verification for {animation_key}: {source}")]
    BadVerification {
        animation_key: String,
        #[source]
        source: base64::DecodeError,
    },
}

#[derive(Debug, Deserialize)]
struct PairRecord {
    #[serde(rename = "animationKey")]
    animation_key: String,
    verification: String,
}

struct KeyPair {
    animation_key: String,
    key_bytes: Vec<u8>,
}

/// Owns the key table and stamps outgoing requests.
pub struct TransactionSigner {
    pairs: RwLock<Vec<KeyPair>>,
    http: reqwest::Client,
    source_url: String,
}

impl TransactionSigner {
    /// Fetch the table once at startup. Failure here is fatal for the
    /// process: no session can issue a single private-API call without it.
    pub async fn bootstrap(source_url: impl Into<String>) -> Result<Arc<Self>, TransactionError> {
        let signer = Arc::new(Self {
            pairs: RwLock::new(Vec::new()),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            source_url: source_url.into(),
        });
        signer.refresh().await?;
        info!(pairs = signer.pairs.read().len(), "transaction key table loaded");
        Ok(signer)
    }

    /// Build a signer from in-memory pairs. Used by tests and by callers
    /// that persist the table themselves.
    pub fn with_pairs(pairs: Vec<(String, Vec<u8>)>) -> Arc<Self> {
        Arc::new(Self {
            pairs: RwLock::new(
                pairs
                    .into_iter()
                    .map(|(animation_key, key_bytes)| KeyPair {
                        animation_key,
                        key_bytes,
                    })
                    .collect(),
            ),
            http: reqwest::Client::new(),
            source_url: String::new(),
        })
    }

    /// Re-fetch the table and swap it in. Keeps the old table on failure.
    pub async fn refresh(&self) -> Result<(), TransactionError> {
        let response = self.http.get(&self.source_url).send().await?;
        if !response.status().is_success() {
            return Err(TransactionError::FetchStatus(response.status()));
        }

        let records: Vec<PairRecord> = response.json().await?;
        if records.is_empty() {
            return Err(TransactionError::NoPairs);
        }

        let mut fresh = Vec::with_capacity(records.len());
        for record in records {
            let key_bytes =
                BASE64
                    .decode(&record.verification)
                    .map_err(|source| TransactionError::BadVerification {
                        animation_key: record.animation_key.clone(),
                        source,
                    })?;
            fresh.push(KeyPair {
                animation_key: record.animation_key,
                key_bytes,
            });
        }

        *self.pairs.write() = fresh;
        Ok(())
    }

    /// Start the periodic refresh task. The returned handle stops the task
    /// when dropped; refresh failures are logged and the stale table kept.
    pub fn start_refresh(self: &Arc<Self>, interval: Duration) -> RefreshTask {
        let signer = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; bootstrap already fetched.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match signer.refresh().await {
                    Ok(()) => debug!("transaction key table refreshed"),
                    Err(err) => warn!(error = %err, "transaction key table refresh failed"),
                }
            }
        });
        RefreshTask { handle }
    }

    /// Compute the transaction id for one request. Intentionally
    /// non-deterministic: a random table entry and a random XOR byte per
    /// call.
    pub fn generate(&self, method: &str, path: &str) -> Result<String, TransactionError> {
        let (animation_key, key_bytes) = {
            let pairs = self.pairs.read();
            if pairs.is_empty() {
                return Err(TransactionError::EmptyKeyTable);
            }
            let pair = &pairs[rand::thread_rng().gen_range(0..pairs.len())];
            (pair.animation_key.clone(), pair.key_bytes.clone())
        };

        let time_now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs().saturating_sub(X_EPOCH))
            .unwrap_or(0) as u32;

        let payload = format!("{method}!{path}!{time_now}{HASH_SALT}{animation_key}");
        let hash = Sha256::digest(payload.as_bytes());

        let random_byte: u8 = rand::thread_rng().gen();

        let mut bytes = Vec::with_capacity(1 + key_bytes.len() + 4 + 16 + 1);
        bytes.push(random_byte);
        bytes.extend(key_bytes.iter().map(|b| b ^ random_byte));
        bytes.extend(time_now.to_le_bytes().iter().map(|b| b ^ random_byte));
        bytes.extend(hash[..16].iter().map(|b| b ^ random_byte));
        bytes.push(PROTOCOL_VERSION ^ random_byte);

        Ok(BASE64.encode(&bytes).trim_end_matches('=').to_owned())
    }
}

/// Handle for the background refresh loop. Aborts the task on drop so the
/// signer's lifecycle stays explicit.
pub struct RefreshTask {
    handle: JoinHandle<()>,
}

impl RefreshTask {
    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
