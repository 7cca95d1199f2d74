//! Entity sets and the note-tweet merge.
//!
//! Extended ("note") tweet bodies carry their own entity set. It must be
//! merged into the legacy entities, never substituted wholesale: the merge
//! is a set union under kind-specific equality, preserving the original
//! order and appending unseen entities from the note.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Hashtag span. Compared by text only; indices differ between the legacy
/// and note bodies for the same tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hashtag {
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Cashtag/symbol span, compared by text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Symbol {
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// @-mention span, compared by screen name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMention {
    #[serde(default)]
    pub screen_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Shortened URL span, compared by the t.co URL string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlEntity {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub expanded_url: String,
    #[serde(default)]
    pub display_url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Video timestamp span, compared by (seconds, text).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimestampEntity {
    #[serde(default)]
    pub seconds: i64,
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OriginalInfo {
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
}

/// Attached media, compared by (id, media key).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaEntity {
    #[serde(default)]
    pub id_str: String,
    #[serde(default)]
    pub media_key: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub display_url: String,
    #[serde(default)]
    pub media_url_https: String,
    #[serde(default)]
    pub ext_alt_text: Option<String>,
    #[serde(default)]
    pub original_info: OriginalInfo,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The entity set attached to a tweet body (legacy or note).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitySet {
    #[serde(default)]
    pub hashtags: Vec<Hashtag>,
    #[serde(default)]
    pub symbols: Vec<Symbol>,
    #[serde(default)]
    pub urls: Vec<UrlEntity>,
    #[serde(default)]
    pub user_mentions: Vec<UserMention>,
    #[serde(default)]
    pub timestamps: Option<Vec<TimestampEntity>>,
    #[serde(default)]
    pub media: Option<Vec<MediaEntity>>,
}

fn hashtag_eq(a: &Hashtag, b: &Hashtag) -> bool {
    a.text == b.text
}

fn symbol_eq(a: &Symbol, b: &Symbol) -> bool {
    a.text == b.text
}

fn mention_eq(a: &UserMention, b: &UserMention) -> bool {
    a.screen_name == b.screen_name
}

fn url_eq(a: &UrlEntity, b: &UrlEntity) -> bool {
    a.url == b.url
}

fn timestamp_eq(a: &TimestampEntity, b: &TimestampEntity) -> bool {
    a.seconds == b.seconds && a.text == b.text
}

fn media_eq(a: &MediaEntity, b: &MediaEntity) -> bool {
    a.id_str == b.id_str && a.media_key == b.media_key
}

/// Union of `original` and `updated` under `eq`, keeping original order and
/// appending entities from `updated` not already present.
fn merge_by<T: Clone>(original: &[T], updated: &[T], eq: fn(&T, &T) -> bool) -> Vec<T> {
    let mut merged = original.to_vec();
    for candidate in updated {
        if !merged.iter().any(|existing| eq(existing, candidate)) {
            merged.push(candidate.clone());
        }
    }
    merged
}

fn merge_optional<T: Clone>(
    original: &Option<Vec<T>>,
    updated: &Option<Vec<T>>,
    eq: fn(&T, &T) -> bool,
) -> Option<Vec<T>> {
    match (original, updated) {
        (None, None) => None,
        (Some(orig), None) => Some(orig.clone()),
        (None, Some(upd)) => Some(upd.clone()),
        (Some(orig), Some(upd)) => Some(merge_by(orig, upd, eq)),
    }
}

/// Merge a note tweet's entity set into the legacy entity set.
pub fn merge_entities(original: &EntitySet, updated: &EntitySet) -> EntitySet {
    EntitySet {
        hashtags: merge_by(&original.hashtags, &updated.hashtags, hashtag_eq),
        symbols: merge_by(&original.symbols, &updated.symbols, symbol_eq),
        urls: merge_by(&original.urls, &updated.urls, url_eq),
        user_mentions: merge_by(&original.user_mentions, &updated.user_mentions, mention_eq),
        timestamps: merge_optional(&original.timestamps, &updated.timestamps, timestamp_eq),
        media: merge_optional(&original.media, &updated.media, media_eq),
    }
}
