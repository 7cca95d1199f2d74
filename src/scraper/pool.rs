//! Sequential fallback across independent sessions.
//!
//! A pool is a shuffled snapshot taken at construction: shuffling spreads
//! load across accounts over many pool instances, while any single
//! `try_with` call walks its sessions strictly one at a time. No parallel
//! racing — a second account only sees the request if the first failed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::ScrapeError;

use super::session::XSession;

pub const DEFAULT_MIN_ATTEMPT_DELAY: Duration = Duration::from_millis(300);
pub const DEFAULT_MAX_ATTEMPT_DELAY: Duration = Duration::from_secs(2);

pub type SessionPool = FallbackPool<Arc<XSession>>;

/// A randomly ordered snapshot of sessions for one operation's fallback
/// sequence. Carries no state beyond the references.
pub struct FallbackPool<S> {
    sessions: Vec<S>,
    min_delay: Duration,
    max_delay: Duration,
}

impl<S: Clone> FallbackPool<S> {
    pub fn new(sessions: &[S]) -> Self {
        Self::with_delay(
            sessions,
            DEFAULT_MIN_ATTEMPT_DELAY,
            DEFAULT_MAX_ATTEMPT_DELAY,
        )
    }

    pub fn with_delay(sessions: &[S], min_delay: Duration, max_delay: Duration) -> Self {
        let mut shuffled = sessions.to_vec();
        shuffled.shuffle(&mut rand::thread_rng());
        Self {
            sessions: shuffled,
            min_delay,
            max_delay,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Run `op` against each session in pool order until one succeeds.
    /// A jittered delay precedes every attempt, the first included, so
    /// simultaneous callers do not burst the same account.
    pub async fn try_with<T, F, Fut>(&self, op: F) -> Result<T, ScrapeError>
    where
        F: Fn(S) -> Fut,
        Fut: Future<Output = Result<T, ScrapeError>>,
    {
        if self.sessions.is_empty() {
            return Err(ScrapeError::NoSessions);
        }

        let mut last_error: Option<ScrapeError> = None;

        for (index, session) in self.sessions.iter().enumerate() {
            if self.max_delay > Duration::ZERO {
                let mut delay = self.min_delay;
                if self.max_delay > self.min_delay {
                    let jitter = rand::thread_rng()
                        .gen_range(Duration::ZERO..self.max_delay - self.min_delay);
                    delay += jitter;
                }
                tokio::time::sleep(delay).await;
            }

            match op(session.clone()).await {
                Ok(result) => {
                    debug!(attempt = index + 1, "pool operation succeeded");
                    return Ok(result);
                }
                Err(err) => {
                    warn!(attempt = index + 1, error = %err, "pool attempt failed");
                    last_error = Some(err);
                }
            }
        }

        // sessions is non-empty, so at least one attempt recorded an error.
        Err(ScrapeError::Exhausted(Box::new(
            last_error.unwrap_or(ScrapeError::NoSessions),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn instant_pool(sessions: &[usize]) -> FallbackPool<usize> {
        FallbackPool::with_delay(sessions, Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn empty_pool_errors_without_attempting() {
        let pool = instant_pool(&[]);
        let attempts = AtomicUsize::new(0);

        let result: Result<(), _> = pool
            .try_with(|_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(ScrapeError::NoSessions)));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let pool = instant_pool(&[1, 2, 3, 4]);
        let attempts = AtomicUsize::new(0);

        let result = pool
            .try_with(|session| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < 4 {
                        Err(ScrapeError::NoTweetFound)
                    } else {
                        Ok(session)
                    }
                }
            })
            .await
            .unwrap();

        // The last attempted session won, after exactly four attempts.
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!((1..=4).contains(&result));
    }

    #[tokio::test]
    async fn all_failures_wrap_the_last_error() {
        let pool = instant_pool(&[1, 2]);
        let attempts = AtomicUsize::new(0);

        let result: Result<(), _> = pool
            .try_with(|_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ScrapeError::NoTweetFound) }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        match result.unwrap_err() {
            ScrapeError::Exhausted(inner) => {
                assert!(matches!(*inner, ScrapeError::NoTweetFound));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn shuffle_preserves_the_session_set() {
        let sessions: Vec<usize> = (0..32).collect();
        let pool = instant_pool(&sessions);
        assert_eq!(pool.len(), 32);

        let seen = parking_lot::Mutex::new(BTreeSet::new());
        let _ = pool
            .try_with(|session| {
                seen.lock().insert(session);
                async { Err::<(), _>(ScrapeError::NoTweetFound) }
            })
            .await;

        let seen = seen.into_inner();
        assert_eq!(seen.len(), 32);
        assert_eq!(seen, (0..32).collect::<BTreeSet<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_spaced_by_jittered_delay() {
        let pool = FallbackPool::with_delay(
            &[1, 2],
            Duration::from_millis(300),
            Duration::from_millis(2000),
        );

        let start = tokio::time::Instant::now();
        let result: Result<(), _> = pool
            .try_with(|_| async { Err(ScrapeError::NoTweetFound) })
            .await;

        assert!(result.is_err());
        // Two attempts, each preceded by at least the minimum delay.
        assert!(start.elapsed() >= Duration::from_millis(600));
    }
}
