//! Thread reconstruction.
//!
//! A conversation page rarely contains the whole thread: the server cuts
//! off somewhere above the focal tweet. Reconstruction climbs the reply
//! chain — refetch rooted at the earliest tweet's parent — until the server
//! declares the top reached, nothing new comes back, or the attempt bound
//! hits.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ScrapeError;
use crate::models::{Tweet, TweetsResult};

use super::session::XSession;

pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

/// Source of conversation pages. `XSession` is the production
/// implementation; tests drive the algorithm with scripted fetchers.
#[async_trait]
pub trait TweetFetcher: Send + Sync {
    async fn fetch_tweets(&self, id: &str) -> Result<TweetsResult, ScrapeError>;
}

#[async_trait]
impl TweetFetcher for XSession {
    async fn fetch_tweets(&self, id: &str) -> Result<TweetsResult, ScrapeError> {
        self.get_tweets(id).await
    }
}

/// Collect the full conversation containing `tweet_id`, up to
/// `max_attempts` fetches (0 means the default bound).
///
/// Tweets later in the page than the focal tweet are not part of its
/// ancestry and are dropped. The result is sorted ascending by id string;
/// the platform's ids are fixed-width decimal in practice, so string order
/// matches numeric order.
pub async fn reconstruct_thread(
    fetcher: &dyn TweetFetcher,
    tweet_id: &str,
    max_attempts: usize,
) -> Result<Vec<Tweet>, ScrapeError> {
    let max_attempts = if max_attempts == 0 {
        DEFAULT_MAX_ATTEMPTS
    } else {
        max_attempts
    };

    let mut current_id = tweet_id.to_owned();
    let mut all_tweets: Vec<Tweet> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    for attempt in 1..=max_attempts {
        let result = fetcher
            .fetch_tweets(&current_id)
            .await
            .map_err(|source| ScrapeError::Attempt {
                attempt,
                source: Box::new(source),
            })?;

        let oldest = result.tweets.first().cloned();

        for tweet in &result.tweets {
            if !tweet.rest_id.is_empty() && seen_ids.insert(tweet.rest_id.clone()) {
                all_tweets.push(tweet.clone());
            }
            if tweet.rest_id == current_id {
                break;
            }
        }

        debug!(
            attempt,
            collected = all_tweets.len(),
            complete = result.is_complete,
            "thread page fetched"
        );

        if result.is_complete || result.tweets.is_empty() {
            break;
        }

        // Climb to the earliest tweet's parent for the next page.
        let Some(oldest) = oldest else { break };
        if !oldest.is_reply {
            break;
        }
        let Some(parent_id) = oldest.in_reply_to_status_id else {
            break;
        };
        // A parent we already collected means the chain loops back on
        // itself; stop instead of refetching forever.
        if seen_ids.contains(&parent_id) {
            break;
        }
        current_id = parent_id;
    }

    all_tweets.sort_by(|a, b| a.rest_id.cmp(&b.rest_id));
    Ok(all_tweets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Replays scripted pages in order and counts fetches.
    struct ScriptedFetcher {
        pages: Mutex<Vec<Result<TweetsResult, ScrapeError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn new(pages: Vec<Result<TweetsResult, ScrapeError>>) -> Self {
            Self {
                pages: Mutex::new(pages),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl TweetFetcher for ScriptedFetcher {
        async fn fetch_tweets(&self, id: &str) -> Result<TweetsResult, ScrapeError> {
            self.calls.lock().push(id.to_owned());
            let mut pages = self.pages.lock();
            if pages.is_empty() {
                Ok(TweetsResult::default())
            } else {
                pages.remove(0)
            }
        }
    }

    fn tweet(id: &str, parent: Option<&str>) -> Tweet {
        Tweet {
            id: id.to_owned(),
            rest_id: id.to_owned(),
            is_reply: parent.is_some(),
            in_reply_to_status_id: parent.map(str::to_owned),
            ..Default::default()
        }
    }

    fn page(tweets: Vec<Tweet>, is_complete: bool) -> Result<TweetsResult, ScrapeError> {
        Ok(TweetsResult {
            tweets,
            is_complete,
        })
    }

    #[tokio::test]
    async fn chain_split_across_two_fetches_is_reassembled() {
        // C replies to B replies to A; the first page only reaches B.
        let fetcher = ScriptedFetcher::new(vec![
            page(vec![tweet("2", Some("1")), tweet("3", Some("2"))], false),
            page(vec![tweet("1", None), tweet("2", Some("1"))], true),
        ]);

        let thread = reconstruct_thread(&fetcher, "3", 10).await.unwrap();

        let ids: Vec<&str> = thread.iter().map(|t| t.rest_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn completeness_stops_the_climb() {
        let fetcher = ScriptedFetcher::new(vec![page(
            vec![tweet("5", Some("4")), tweet("6", Some("5"))],
            true,
        )]);

        let thread = reconstruct_thread(&fetcher, "6", 10).await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn cyclic_parent_references_terminate() {
        // B claims parent A, A claims parent B.
        let fetcher = ScriptedFetcher::new(vec![
            page(vec![tweet("B", Some("A"))], false),
            page(vec![tweet("A", Some("B"))], false),
        ]);

        let thread = reconstruct_thread(&fetcher, "B", 10).await.unwrap();

        assert_eq!(thread.len(), 2);
        // Second fetch sees that A's parent B is already collected.
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn attempt_cap_bounds_fetches() {
        // Every page points at a fresh parent, so only the cap stops it.
        let pages: Vec<_> = (0..20)
            .map(|i| {
                page(
                    vec![tweet(
                        &format!("{:03}", 100 - i),
                        Some(&format!("{:03}", 100 - i - 1)),
                    )],
                    false,
                )
            })
            .collect();
        let fetcher = ScriptedFetcher::new(pages);

        let thread = reconstruct_thread(&fetcher, "100", 3).await.unwrap();
        assert_eq!(fetcher.call_count(), 3);
        assert_eq!(thread.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_tweets_are_collected_once() {
        let fetcher = ScriptedFetcher::new(vec![
            page(vec![tweet("2", Some("1")), tweet("3", Some("2"))], false),
            page(
                vec![tweet("1", None), tweet("2", Some("1")), tweet("3", Some("2"))],
                true,
            ),
        ]);

        let thread = reconstruct_thread(&fetcher, "3", 10).await.unwrap();
        assert_eq!(thread.len(), 3);
    }

    #[tokio::test]
    async fn replies_after_the_focal_tweet_are_dropped() {
        // Page contains the focal tweet plus later replies to it.
        let fetcher = ScriptedFetcher::new(vec![page(
            vec![
                tweet("1", None),
                tweet("2", Some("1")),
                tweet("9", Some("2")),
            ],
            true,
        )]);

        let thread = reconstruct_thread(&fetcher, "2", 10).await.unwrap();
        let ids: Vec<&str> = thread.iter().map(|t| t.rest_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn fetch_errors_carry_the_attempt_number() {
        let fetcher = ScriptedFetcher::new(vec![
            page(vec![tweet("2", Some("1"))], false),
            Err(ScrapeError::NoTweetFound),
        ]);

        let err = reconstruct_thread(&fetcher, "2", 10).await.unwrap_err();
        match err {
            ScrapeError::Attempt { attempt, source } => {
                assert_eq!(attempt, 2);
                assert!(matches!(*source, ScrapeError::NoTweetFound));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn result_is_sorted_by_id_string() {
        let fetcher = ScriptedFetcher::new(vec![page(
            vec![
                tweet("103", Some("102")),
                tweet("101", None),
                tweet("102", Some("101")),
                tweet("103", Some("102")),
            ],
            true,
        )]);

        let thread = reconstruct_thread(&fetcher, "103", 10).await.unwrap();
        let ids: Vec<&str> = thread.iter().map(|t| t.rest_id.as_str()).collect();
        assert_eq!(ids, vec!["101", "102", "103"]);
    }

    #[tokio::test]
    async fn zero_max_attempts_uses_default() {
        let fetcher = ScriptedFetcher::new(vec![page(vec![tweet("1", None)], true)]);
        let thread = reconstruct_thread(&fetcher, "1", 0).await.unwrap();
        assert_eq!(thread.len(), 1);
    }
}
