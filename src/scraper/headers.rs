//! Realistic browser header emulation.
//!
//! Each session instance picks one profile at random and keeps it for its
//! whole lifetime; mixing user agents inside one cookie session is a
//! detection signal. Profiles only fill headers the caller left unset.

use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// A consistent set of browser identification headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserProfile {
    pub sec_ch_ua: Option<&'static str>,
    pub sec_ch_ua_mobile: Option<&'static str>,
    pub sec_ch_ua_platform: Option<&'static str>,
    pub upgrade_insecure_requests: Option<&'static str>,
    pub user_agent: Option<&'static str>,
    pub accept: Option<&'static str>,
    pub sec_fetch_site: Option<&'static str>,
    pub sec_fetch_mode: Option<&'static str>,
    pub sec_fetch_user: Option<&'static str>,
    pub sec_fetch_dest: Option<&'static str>,
    pub accept_language: Option<&'static str>,
}

const CHROME_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36";
const EDGE_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36 Edg/137.0.0.0";
const FIREFOX_UA: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:139.0) Gecko/20100101 Firefox/139.0";

const CHROME_BRANDS: &str = r#""Google Chrome";v="137", "Chromium";v="137", "Not/A)Brand";v="24""#;
const EDGE_BRANDS: &str = r#""Microsoft Edge";v="137", "Chromium";v="137", "Not/A)Brand";v="24""#;

const NAVIGATE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";
const FIREFOX_NAVIGATE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Navigation and fetch variants for Chrome, Edge, and Firefox.
const PROFILES: &[BrowserProfile] = &[
    // Chrome navigation
    BrowserProfile {
        sec_ch_ua: Some(CHROME_BRANDS),
        sec_ch_ua_mobile: Some("?0"),
        sec_ch_ua_platform: Some("\"Linux\""),
        upgrade_insecure_requests: Some("1"),
        user_agent: Some(CHROME_UA),
        accept: Some(NAVIGATE_ACCEPT),
        sec_fetch_site: Some("none"),
        sec_fetch_mode: Some("navigate"),
        sec_fetch_user: Some("?1"),
        sec_fetch_dest: Some("document"),
        accept_language: Some("en-US,en;q=0.9"),
    },
    // Chrome fetch/XHR
    BrowserProfile {
        sec_ch_ua: Some(CHROME_BRANDS),
        sec_ch_ua_mobile: Some("?0"),
        sec_ch_ua_platform: Some("\"Linux\""),
        upgrade_insecure_requests: None,
        user_agent: Some(CHROME_UA),
        accept: Some("*/*"),
        sec_fetch_site: Some("same-origin"),
        sec_fetch_mode: Some("cors"),
        sec_fetch_user: None,
        sec_fetch_dest: Some("empty"),
        accept_language: Some("en-US,en;q=0.9"),
    },
    // Edge navigation
    BrowserProfile {
        sec_ch_ua: Some(EDGE_BRANDS),
        sec_ch_ua_mobile: Some("?0"),
        sec_ch_ua_platform: Some("\"Linux\""),
        upgrade_insecure_requests: Some("1"),
        user_agent: Some(EDGE_UA),
        accept: Some(NAVIGATE_ACCEPT),
        sec_fetch_site: Some("none"),
        sec_fetch_mode: Some("navigate"),
        sec_fetch_user: Some("?1"),
        sec_fetch_dest: Some("document"),
        accept_language: Some("en-US,en;q=0.9"),
    },
    // Edge fetch/XHR
    BrowserProfile {
        sec_ch_ua: Some(EDGE_BRANDS),
        sec_ch_ua_mobile: Some("?0"),
        sec_ch_ua_platform: Some("\"Linux\""),
        upgrade_insecure_requests: None,
        user_agent: Some(EDGE_UA),
        accept: Some("*/*"),
        sec_fetch_site: Some("same-origin"),
        sec_fetch_mode: Some("cors"),
        sec_fetch_user: None,
        sec_fetch_dest: Some("empty"),
        accept_language: Some("en-US,en;q=0.9"),
    },
    // Firefox navigation
    BrowserProfile {
        sec_ch_ua: None,
        sec_ch_ua_mobile: None,
        sec_ch_ua_platform: None,
        upgrade_insecure_requests: Some("1"),
        user_agent: Some(FIREFOX_UA),
        accept: Some(FIREFOX_NAVIGATE_ACCEPT),
        sec_fetch_site: Some("none"),
        sec_fetch_mode: Some("navigate"),
        sec_fetch_user: Some("?1"),
        sec_fetch_dest: Some("document"),
        accept_language: Some("en-US,en;q=0.5"),
    },
    // Firefox fetch
    BrowserProfile {
        sec_ch_ua: None,
        sec_ch_ua_mobile: None,
        sec_ch_ua_platform: None,
        upgrade_insecure_requests: None,
        user_agent: Some(FIREFOX_UA),
        accept: Some("*/*"),
        sec_fetch_site: Some("same-origin"),
        sec_fetch_mode: Some("cors"),
        sec_fetch_user: None,
        sec_fetch_dest: Some("empty"),
        accept_language: Some("en-US,en;q=0.5"),
    },
];

impl BrowserProfile {
    /// Pick one profile for the lifetime of a session.
    pub fn random() -> Self {
        *PROFILES
            .choose(&mut rand::thread_rng())
            .expect("profile table is non-empty")
    }

    /// Fill headers the request has not set itself.
    pub fn apply(&self, headers: &mut HeaderMap) {
        let mut set = |name: &'static str, value: Option<&'static str>| {
            if let Some(value) = value {
                let name = HeaderName::from_static(name);
                if !headers.contains_key(&name) {
                    headers.insert(name, HeaderValue::from_static(value));
                }
            }
        };

        set("sec-ch-ua", self.sec_ch_ua);
        set("sec-ch-ua-mobile", self.sec_ch_ua_mobile);
        set("sec-ch-ua-platform", self.sec_ch_ua_platform);
        set("upgrade-insecure-requests", self.upgrade_insecure_requests);
        set("user-agent", self.user_agent);
        set("accept", self.accept);
        set("sec-fetch-site", self.sec_fetch_site);
        set("sec-fetch-mode", self.sec_fetch_mode);
        set("sec-fetch-user", self.sec_fetch_user);
        set("sec-fetch-dest", self.sec_fetch_dest);
        set("accept-language", self.accept_language);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_does_not_override_existing_headers() {
        let profile = PROFILES[0];
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("custom-agent"));

        profile.apply(&mut headers);

        assert_eq!(headers.get("user-agent").unwrap(), "custom-agent");
        assert!(headers.contains_key("accept-language"));
    }

    #[test]
    fn every_profile_has_a_user_agent() {
        for profile in PROFILES {
            assert!(profile.user_agent.is_some());
        }
    }
}
