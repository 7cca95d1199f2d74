//! Per-operation GraphQL wire contracts.
//!
//! The platform addresses each GraphQL operation by an opaque query-id hash
//! and demands an exact feature-flag set; both rotate without notice. They
//! are kept here as swappable data records so adapting to an upstream
//! rotation never touches the protocol logic.

use serde_json::{json, Value};

/// One operation's wire contract.
#[derive(Debug, Clone)]
pub struct Operation {
    pub name: &'static str,
    /// Opaque hash segment of the endpoint path.
    pub query_id: &'static str,
    /// Feature flags the server validates against this query id.
    pub features: Value,
    /// Optional `fieldToggles` query parameter.
    pub field_toggles: Option<Value>,
}

impl Operation {
    pub fn path(&self) -> String {
        format!("/i/api/graphql/{}/{}", self.query_id, self.name)
    }
}

/// The full set of operations this crate performs. Swap a record (or the
/// whole catalog) when the platform rotates ids or flags.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub tweet_detail: Operation,
    pub search_timeline: Operation,
    pub create_tweet: Operation,
}

fn timeline_features(with_video_screen: bool) -> Value {
    let mut features = json!({
        "profile_label_improvements_pcf_label_in_post_enabled": true,
        "rweb_tipjar_consumption_enabled": true,
        "verified_phone_label_enabled": false,
        "creator_subscriptions_tweet_preview_api_enabled": true,
        "responsive_web_graphql_timeline_navigation_enabled": true,
        "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
        "premium_content_api_read_enabled": false,
        "communities_web_enable_tweet_community_results_fetch": true,
        "c9s_tweet_anatomy_moderator_badge_enabled": true,
        "responsive_web_grok_analyze_button_fetch_trends_enabled": false,
        "responsive_web_grok_analyze_post_followups_enabled": true,
        "responsive_web_jetfuel_frame": false,
        "responsive_web_grok_share_attachment_enabled": true,
        "articles_preview_enabled": true,
        "responsive_web_edit_tweet_api_enabled": true,
        "graphql_is_translatable_rweb_tweet_is_translatable_enabled": true,
        "view_counts_everywhere_api_enabled": true,
        "longform_notetweets_consumption_enabled": true,
        "responsive_web_twitter_article_tweet_consumption_enabled": true,
        "tweet_awards_web_tipping_enabled": false,
        "responsive_web_grok_show_grok_translated_post": false,
        "responsive_web_grok_analysis_button_from_backend": false,
        "creator_subscriptions_quote_tweet_preview_enabled": false,
        "freedom_of_speech_not_reach_fetch_enabled": true,
        "standardized_nudges_misinfo": true,
        "tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled": true,
        "longform_notetweets_rich_text_read_enabled": true,
        "longform_notetweets_inline_media_enabled": true,
        "responsive_web_grok_image_annotation_enabled": true,
        "responsive_web_enhance_cards_enabled": false,
    });
    if with_video_screen {
        features["rweb_video_screen_enabled"] = json!(false);
    }
    features
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            tweet_detail: Operation {
                name: "TweetDetail",
                query_id: "xd_EMdYvB9hfZsZ6Idri0w",
                features: timeline_features(true),
                field_toggles: Some(json!({
                    "withArticleRichContentState": true,
                    "withArticlePlainText": false,
                    "withGrokAnalyze": false,
                    "withDisallowedReplyControls": false,
                })),
            },
            search_timeline: Operation {
                name: "SearchTimeline",
                query_id: "VhUd6vHVmLBcw0uX-6jMLA",
                features: timeline_features(false),
                field_toggles: None,
            },
            create_tweet: Operation {
                name: "CreateTweet",
                query_id: "IID9x6WsdMnTlXnzXGq8ng",
                features: timeline_features(false),
                field_toggles: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_embed_query_ids() {
        let catalog = Catalog::default();
        assert_eq!(
            catalog.tweet_detail.path(),
            "/i/api/graphql/xd_EMdYvB9hfZsZ6Idri0w/TweetDetail"
        );
        assert_eq!(
            catalog.create_tweet.path(),
            "/i/api/graphql/IID9x6WsdMnTlXnzXGq8ng/CreateTweet"
        );
    }

    #[test]
    fn features_are_json_objects() {
        let catalog = Catalog::default();
        assert!(catalog.tweet_detail.features.is_object());
        assert!(catalog.tweet_detail.features["rweb_video_screen_enabled"].is_boolean());
        // Search does not carry the video-screen flag.
        assert!(catalog.search_timeline.features["rweb_video_screen_enabled"].is_null());
    }
}
