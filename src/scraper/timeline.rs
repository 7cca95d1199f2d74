//! Polymorphic timeline decoding.
//!
//! Detail and search endpoints return an instruction-based timeline where
//! nearly every node is a tagged union. Each union point decodes into an
//! enum with an explicit `Unknown` fallback so that entry kinds the crate
//! does not understand are visibly skipped instead of failing the whole
//! payload; anything that does claim to be a tweet is converted or errors.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ScrapeError;
use crate::models::{MediaInfo, Tweet, TweetEntities, TweetStats, TweetsResult, User};

use super::entities::{merge_entities, EntitySet, MediaEntity};

/// The platform's fixed-width textual timestamp, e.g.
/// `Mon Jan 02 15:04:05 +0000 2006`.
pub const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

// ---------------------------------------------------------------------------
// Wire model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Instruction {
    TimelineAddEntries {
        #[serde(default)]
        entries: Vec<TimelineEntry>,
    },
    TimelineTerminateTimeline {
        #[serde(default)]
        direction: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimelineEntry {
    #[serde(rename = "entryId", default)]
    pub entry_id: String,
    pub content: EntryContent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "entryType")]
pub enum EntryContent {
    TimelineTimelineItem {
        #[serde(rename = "itemContent")]
        item_content: ItemContent,
    },
    TimelineTimelineModule {
        #[serde(default)]
        items: Option<Vec<ModuleItem>>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleItem {
    pub item: ModuleItemInner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleItemInner {
    #[serde(rename = "itemContent")]
    pub item_content: ItemContent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "itemType")]
pub enum ItemContent {
    TimelineTweet {
        #[serde(default)]
        tweet_results: TweetResults,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TweetResults {
    #[serde(default)]
    pub result: Option<TweetResult>,
}

/// Tweet-shaped union. Tombstones and future variants land in `Unknown`
/// and are skipped by the assembler.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "__typename")]
pub enum TweetResult {
    Tweet(RawTweet),
    TweetWithVisibilityResults { tweet: RawTweet },
    #[serde(other)]
    Unknown,
}

impl TweetResult {
    pub fn as_tweet(&self) -> Option<&RawTweet> {
        match self {
            TweetResult::Tweet(tweet) => Some(tweet),
            TweetResult::TweetWithVisibilityResults { tweet } => Some(tweet),
            TweetResult::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTweet {
    #[serde(default)]
    pub rest_id: String,
    #[serde(default)]
    pub core: Option<TweetCore>,
    #[serde(default)]
    pub legacy: Option<TweetLegacy>,
    #[serde(default)]
    pub note_tweet: Option<NoteTweet>,
    #[serde(default)]
    pub views: Option<Views>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub is_translatable: Option<bool>,
    #[serde(default)]
    pub has_birdwatch_notes: Option<bool>,
    #[serde(default)]
    pub quoted_status_result: Option<Box<QuotedStatusResult>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotedStatusResult {
    #[serde(default)]
    pub result: Option<TweetResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TweetCore {
    #[serde(default)]
    pub user_results: UserResults,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserResults {
    #[serde(default)]
    pub result: Option<UserResult>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "__typename")]
pub enum UserResult {
    User(RawUser),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub rest_id: String,
    #[serde(default)]
    pub is_blue_verified: bool,
    #[serde(default)]
    pub legacy: UserLegacy,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserLegacy {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub screen_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub followers_count: i64,
    #[serde(default)]
    pub friends_count: i64,
    #[serde(default)]
    pub statuses_count: i64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub profile_image_url_https: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TweetLegacy {
    #[serde(default)]
    pub full_text: String,
    #[serde(default)]
    pub conversation_id_str: String,
    #[serde(default)]
    pub is_quote_status: bool,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub possibly_sensitive: Option<bool>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub in_reply_to_status_id_str: Option<String>,
    #[serde(default)]
    pub in_reply_to_user_id_str: Option<String>,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub retweet_count: i64,
    #[serde(default)]
    pub favorite_count: i64,
    #[serde(default)]
    pub quote_count: i64,
    #[serde(default)]
    pub bookmark_count: i64,
    #[serde(default)]
    pub entities: EntitySet,
    #[serde(default)]
    pub extended_entities: Option<ExtendedEntities>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtendedEntities {
    #[serde(default)]
    pub media: Option<Vec<MediaEntity>>,
}

/// Extended-length body stored beside the legacy record. Its text is the
/// full content; its entities supplement, never replace, the legacy set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteTweet {
    #[serde(default)]
    pub is_expandable: bool,
    #[serde(default)]
    pub note_tweet_results: NoteTweetResults,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteTweetResults {
    #[serde(default)]
    pub result: Option<NoteTweetResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteTweetResult {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub entity_set: EntitySet,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Views {
    #[serde(default)]
    pub count: Option<String>,
}

// ---------------------------------------------------------------------------
// Response envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TweetDetailResponse {
    #[serde(default)]
    pub data: TweetDetailData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TweetDetailData {
    #[serde(default)]
    pub threaded_conversation_with_injections_v2: Option<Timeline>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchTimelineResponse {
    #[serde(default)]
    pub data: SearchTimelineData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchTimelineData {
    #[serde(default)]
    pub search_by_raw_query: Option<SearchByRawQuery>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchByRawQuery {
    #[serde(default)]
    pub search_timeline: Option<SearchTimelineInner>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchTimelineInner {
    #[serde(default)]
    pub timeline: Option<Timeline>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTweetResponse {
    #[serde(default)]
    pub data: CreateTweetData,
    #[serde(default)]
    pub errors: Option<Vec<ApiError>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTweetData {
    #[serde(default)]
    pub create_tweet: Option<CreateTweetInner>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTweetInner {
    #[serde(default)]
    pub tweet_results: TweetResults,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------------
// Conversion into the domain model
// ---------------------------------------------------------------------------

fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, CREATED_AT_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Walk a timeline and assemble the tweets it carries, in encounter order.
///
/// A `TimelineTerminateTimeline` instruction with direction `Top` means the
/// server has nothing earlier in this conversation; that becomes
/// `is_complete`. Entry kinds that are not tweet-shaped are skipped.
pub fn convert_timeline(timeline: Option<&Timeline>) -> Result<TweetsResult, ScrapeError> {
    let timeline = timeline.ok_or(ScrapeError::MissingTimeline)?;
    if timeline.instructions.is_empty() {
        return Err(ScrapeError::NoInstructions);
    }

    let mut tweets = Vec::new();
    let mut is_complete = false;

    for instruction in &timeline.instructions {
        match instruction {
            Instruction::TimelineTerminateTimeline { direction } => {
                if direction == "Top" {
                    is_complete = true;
                }
            }
            Instruction::TimelineAddEntries { entries } => {
                for entry in entries {
                    match &entry.content {
                        EntryContent::TimelineTimelineModule { items } => {
                            for module_item in items.iter().flatten() {
                                append_item(&module_item.item.item_content, &mut tweets)?;
                            }
                        }
                        EntryContent::TimelineTimelineItem { item_content } => {
                            append_item(item_content, &mut tweets)?;
                        }
                        EntryContent::Unknown => {}
                    }
                }
            }
            Instruction::Unknown => {}
        }
    }

    Ok(TweetsResult {
        tweets,
        is_complete,
    })
}

fn append_item(item: &ItemContent, out: &mut Vec<Tweet>) -> Result<(), ScrapeError> {
    if let ItemContent::TimelineTweet { tweet_results } = item {
        if let Some(raw) = tweet_results.result.as_ref().and_then(TweetResult::as_tweet) {
            out.push(convert_tweet(Some(raw))?);
        }
    }
    Ok(())
}

/// Convert one raw tweet into the domain model.
///
/// `rest_id` is the canonical identity; legacy fields are copied verbatim,
/// a note body replaces the text and merges its entities, and an unparsable
/// `created_at` leaves the timestamp unset without failing the tweet.
pub fn convert_tweet(raw: Option<&RawTweet>) -> Result<Tweet, ScrapeError> {
    let raw = raw.ok_or(ScrapeError::NilTweet)?;

    let mut tweet = Tweet {
        id: raw.rest_id.clone(),
        rest_id: raw.rest_id.clone(),
        ..Default::default()
    };

    let mut entity_set = EntitySet::default();

    if let Some(legacy) = &raw.legacy {
        tweet.text = legacy.full_text.clone();
        tweet.conversation_id = legacy.conversation_id_str.clone();
        tweet.is_quote_status = legacy.is_quote_status;
        tweet.lang = legacy.lang.clone();
        tweet.possibly_sensitive = legacy.possibly_sensitive.unwrap_or(false);
        tweet.created_at = parse_created_at(&legacy.created_at);

        if let Some(parent) = &legacy.in_reply_to_status_id_str {
            tweet.in_reply_to_status_id = Some(parent.clone());
            tweet.is_reply = true;
        }
        tweet.in_reply_to_user_id = legacy.in_reply_to_user_id_str.clone();

        tweet.stats = TweetStats {
            reply_count: legacy.reply_count,
            retweet_count: legacy.retweet_count,
            favorite_count: legacy.favorite_count,
            quote_count: legacy.quote_count,
            bookmark_count: legacy.bookmark_count,
            view_count: 0,
        };

        entity_set = legacy.entities.clone();
        if let Some(extended) = &legacy.extended_entities {
            if extended.media.is_some() {
                entity_set.media = extended.media.clone();
            }
        }
    }

    if let Some(note) = raw
        .note_tweet
        .as_ref()
        .and_then(|n| n.note_tweet_results.result.as_ref())
    {
        // Notes carry the full content; the truncated legacy text loses.
        tweet.text = note.text.clone();
        tweet.is_note_tweet = true;
        entity_set = merge_entities(&entity_set, &note.entity_set);
    }

    tweet.entities = convert_entity_set(&entity_set);

    if let Some(user) = raw
        .core
        .as_ref()
        .and_then(|core| core.user_results.result.as_ref())
    {
        if let UserResult::User(raw_user) = user {
            tweet.author = Some(convert_user(raw_user));
        }
    }

    tweet.has_birdwatch_notes = raw.has_birdwatch_notes.unwrap_or(false);
    tweet.is_translatable = raw.is_translatable.unwrap_or(false);
    tweet.source = raw.source.clone();

    if let Some(count) = raw.views.as_ref().and_then(|v| v.count.as_deref()) {
        if let Ok(views) = count.parse::<i64>() {
            tweet.views = views;
            tweet.stats.view_count = views;
        }
    }

    if let Some(quoted) = raw
        .quoted_status_result
        .as_ref()
        .and_then(|q| q.result.as_ref())
        .and_then(TweetResult::as_tweet)
    {
        if let Ok(quoted_tweet) = convert_tweet(Some(quoted)) {
            tweet.quoted_tweet = Some(Box::new(quoted_tweet));
        }
    }

    Ok(tweet)
}

fn convert_entity_set(set: &EntitySet) -> TweetEntities {
    TweetEntities {
        hashtags: set.hashtags.clone(),
        symbols: set.symbols.clone(),
        urls: set.urls.clone(),
        user_mentions: set.user_mentions.clone(),
        timestamps: set.timestamps.clone().unwrap_or_default(),
        media: set
            .media
            .iter()
            .flatten()
            .map(convert_media)
            .collect(),
    }
}

fn convert_media(media: &MediaEntity) -> MediaInfo {
    MediaInfo {
        id: media.id_str.clone(),
        media_key: media.media_key.clone(),
        kind: media.kind.clone(),
        url: media.url.clone(),
        display_url: media.display_url.clone(),
        expanded_url: media.media_url_https.clone(),
        alt_text: media.ext_alt_text.clone(),
        width: media.original_info.width,
        height: media.original_info.height,
    }
}

pub fn convert_user(raw: &RawUser) -> User {
    let legacy = &raw.legacy;
    User {
        id: raw.id.clone(),
        rest_id: raw.rest_id.clone(),
        name: legacy.name.clone(),
        screen_name: legacy.screen_name.clone(),
        profile_image_url: legacy.profile_image_url_https.clone(),
        description: legacy.description.clone(),
        followers_count: legacy.followers_count,
        friends_count: legacy.friends_count,
        statuses_count: legacy.statuses_count,
        created_at: parse_created_at(&legacy.created_at),
        verified: legacy.verified,
        is_blue_verified: raw.is_blue_verified,
    }
}
