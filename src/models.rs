use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scraper::entities::{Hashtag, Symbol, TimestampEntity, UrlEntity, UserMention};

/// Simplified user extracted from the platform's user results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub rest_id: String,
    pub name: String,
    pub screen_name: String,
    pub profile_image_url: String,
    pub description: String,
    pub followers_count: i64,
    pub friends_count: i64,
    pub statuses_count: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub verified: bool,
    pub is_blue_verified: bool,
}

/// Media attached to a tweet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    pub id: String,
    pub media_key: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub display_url: String,
    pub expanded_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    pub width: i64,
    pub height: i64,
}

/// Entity spans found in tweet text, after any note-tweet merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TweetEntities {
    pub hashtags: Vec<Hashtag>,
    pub symbols: Vec<Symbol>,
    pub urls: Vec<UrlEntity>,
    pub user_mentions: Vec<UserMention>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timestamps: Vec<TimestampEntity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaInfo>,
}

/// Engagement counters, copied verbatim from the legacy record.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TweetStats {
    pub reply_count: i64,
    pub retweet_count: i64,
    pub favorite_count: i64,
    pub quote_count: i64,
    pub bookmark_count: i64,
    #[serde(default)]
    pub view_count: i64,
}

/// Normalized tweet. `id == rest_id` is the canonical identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub rest_id: String,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    pub entities: TweetEntities,
    pub stats: TweetStats,
    pub is_retweet: bool,
    pub is_reply: bool,
    pub is_quote_status: bool,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_status_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted_tweet: Option<Box<Tweet>>,
    pub has_birdwatch_notes: bool,
    pub is_note_tweet: bool,
    pub lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub possibly_sensitive: bool,
    pub is_translatable: bool,
    pub views: i64,
}

/// One page of conversation. `is_complete` means the server declared that no
/// earlier tweet exists in this conversation beyond what was returned.
#[derive(Debug, Clone, Default)]
pub struct TweetsResult {
    pub tweets: Vec<Tweet>,
    pub is_complete: bool,
}

/// Input for posting a tweet (usually a reply carrying a rendered image).
#[derive(Debug, Clone, Default)]
pub struct NewTweet {
    pub text: String,
    pub media_ids: Vec<String>,
    pub tagged_users: Vec<Vec<String>>,
    pub in_reply_to_tweet_id: Option<String>,
    pub attachment_url: Option<String>,
    pub conversation_control_mode: Option<String>,
}

/// Result of a finished media upload, ready to attach to a `NewTweet`.
#[derive(Debug, Clone)]
pub struct MediaUploadResult {
    pub media_id: String,
    pub media_key: String,
    pub size: u64,
}
