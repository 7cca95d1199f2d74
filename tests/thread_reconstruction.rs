//! End-to-end reconstruction over the public library surface.
//!
//! Drives the decoder and the thread climber together: raw timeline JSON
//! goes in through the wire model, pages come back as `TweetsResult`, and
//! reconstruction stitches them across fetches the way the mention-check
//! and thread-scrape jobs do in production.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use threadbot_scraper::scraper::timeline::{convert_timeline, Timeline};
use threadbot_scraper::{reconstruct_thread, ScrapeError, TweetFetcher, TweetsResult};

/// Serves pre-decoded timeline payloads keyed by requested tweet id.
struct TimelineFixture {
    pages: Mutex<Vec<(String, serde_json::Value)>>,
}

impl TimelineFixture {
    fn new(pages: Vec<(&str, serde_json::Value)>) -> Self {
        Self {
            pages: Mutex::new(
                pages
                    .into_iter()
                    .map(|(id, page)| (id.to_owned(), page))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl TweetFetcher for TimelineFixture {
    async fn fetch_tweets(&self, id: &str) -> Result<TweetsResult, ScrapeError> {
        let pages = self.pages.lock();
        let payload = pages
            .iter()
            .find(|(page_id, _)| page_id == id)
            .map(|(_, page)| page.clone())
            .ok_or(ScrapeError::NoTweetFound)?;
        drop(pages);

        let timeline: Timeline = serde_json::from_value(payload).map_err(ScrapeError::Decode)?;
        convert_timeline(Some(&timeline))
    }
}

fn tweet_entry(rest_id: &str, text: &str, parent: Option<&str>) -> serde_json::Value {
    let mut legacy = json!({
        "full_text": text,
        "conversation_id_str": "100",
        "lang": "en",
        "created_at": "Wed Oct 10 20:19:24 +0000 2018",
    });
    if let Some(parent) = parent {
        legacy["in_reply_to_status_id_str"] = json!(parent);
    }
    json!({
        "entryId": format!("tweet-{rest_id}"),
        "content": {
            "entryType": "TimelineTimelineItem",
            "itemContent": {
                "itemType": "TimelineTweet",
                "tweet_results": {
                    "result": {
                        "__typename": "Tweet",
                        "rest_id": rest_id,
                        "legacy": legacy,
                    }
                }
            }
        }
    })
}

fn add_entries(entries: Vec<serde_json::Value>) -> serde_json::Value {
    json!({"type": "TimelineAddEntries", "entries": entries})
}

fn terminate_top() -> serde_json::Value {
    json!({"type": "TimelineTerminateTimeline", "direction": "Top"})
}

#[tokio::test]
async fn three_tweet_chain_across_two_pages() {
    // C(102) replies to B(101) replies to A(100). The first page starts at
    // B; the second page reaches the root and declares the top.
    let fixture = TimelineFixture::new(vec![
        (
            "102",
            json!({"instructions": [add_entries(vec![
                tweet_entry("101", "second", Some("100")),
                tweet_entry("102", "third", Some("101")),
            ])]}),
        ),
        (
            "100",
            json!({"instructions": [
                add_entries(vec![tweet_entry("100", "root", None)]),
                terminate_top(),
            ]}),
        ),
    ]);

    let thread = reconstruct_thread(&fixture, "102", 10).await.unwrap();

    let ids: Vec<&str> = thread.iter().map(|t| t.rest_id.as_str()).collect();
    assert_eq!(ids, vec!["100", "101", "102"]);
    let texts: Vec<&str> = thread.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["root", "second", "third"]);
    assert!(thread.iter().all(|t| t.created_at.is_some()));
}

#[tokio::test]
async fn single_page_with_module_entries() {
    let module_item = |rest_id: &str, text: &str| {
        json!({
            "item": {
                "itemContent": {
                    "itemType": "TimelineTweet",
                    "tweet_results": {
                        "result": {
                            "__typename": "Tweet",
                            "rest_id": rest_id,
                            "legacy": {"full_text": text},
                        }
                    }
                }
            }
        })
    };
    let fixture = TimelineFixture::new(vec![(
        "201",
        json!({"instructions": [
            {"type": "TimelineAddEntries", "entries": [
                tweet_entry("200", "root", None),
                {
                    "entryId": "conversationthread-1",
                    "content": {
                        "entryType": "TimelineTimelineModule",
                        "items": [module_item("201", "reply in module")],
                    }
                },
            ]},
            terminate_top(),
        ]}),
    )]);

    let thread = reconstruct_thread(&fixture, "201", 10).await.unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[1].text, "reply in module");
}

#[tokio::test]
async fn unknown_entries_do_not_break_reconstruction() {
    let fixture = TimelineFixture::new(vec![(
        "300",
        json!({"instructions": [
            {"type": "TimelineClearCache"},
            {"type": "TimelineAddEntries", "entries": [
                {"entryId": "cursor-top", "content": {"entryType": "TimelineTimelineCursor", "value": "x"}},
                tweet_entry("300", "alone", None),
                {"entryId": "who-to-follow", "content": {"entryType": "TimelineTimelineModule"}},
            ]},
            terminate_top(),
        ]}),
    )]);

    let thread = reconstruct_thread(&fixture, "300", 10).await.unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].rest_id, "300");
}

#[tokio::test]
async fn missing_parent_page_surfaces_wrapped_error() {
    // The chain points at a parent the fixture cannot serve.
    let fixture = TimelineFixture::new(vec![(
        "401",
        json!({"instructions": [add_entries(vec![
            tweet_entry("401", "orphan reply", Some("400")),
        ])]}),
    )]);

    let err = reconstruct_thread(&fixture, "401", 10).await.unwrap_err();
    match err {
        ScrapeError::Attempt { attempt, source } => {
            assert_eq!(attempt, 2);
            assert!(matches!(*source, ScrapeError::NoTweetFound));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn note_tweets_survive_the_full_pipeline() {
    let fixture = TimelineFixture::new(vec![(
        "500",
        json!({"instructions": [
            {"type": "TimelineAddEntries", "entries": [{
                "entryId": "tweet-500",
                "content": {
                    "entryType": "TimelineTimelineItem",
                    "itemContent": {
                        "itemType": "TimelineTweet",
                        "tweet_results": {
                            "result": {
                                "__typename": "Tweet",
                                "rest_id": "500",
                                "legacy": {
                                    "full_text": "truncated…",
                                    "entities": {
                                        "hashtags": [{"text": "thread", "indices": [0, 7]}],
                                        "symbols": [], "urls": [], "user_mentions": []
                                    }
                                },
                                "note_tweet": {
                                    "is_expandable": true,
                                    "note_tweet_results": {"result": {
                                        "text": "the whole long-form story",
                                        "entity_set": {
                                            "hashtags": [
                                                {"text": "thread", "indices": [10, 17]},
                                                {"text": "longform", "indices": [30, 39]}
                                            ],
                                            "symbols": [], "urls": [], "user_mentions": []
                                        }
                                    }}
                                }
                            }
                        }
                    }
                }
            }]},
            terminate_top(),
        ]}),
    )]);

    let thread = reconstruct_thread(&fixture, "500", 10).await.unwrap();
    assert_eq!(thread.len(), 1);

    let tweet = &thread[0];
    assert!(tweet.is_note_tweet);
    assert_eq!(tweet.text, "the whole long-form story");
    let tags: Vec<&str> = tweet
        .entities
        .hashtags
        .iter()
        .map(|h| h.text.as_str())
        .collect();
    assert_eq!(tags, vec!["thread", "longform"]);
}
