//! URL builders for the private web API.
//!
//! Base URLs are passed in by the caller so tests can point the client at a
//! local mock server.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

pub const API_V1: &str = "https://i.instagram.com/api/v1";
pub const API_GRAPH: &str = "https://instagram.com/graphql/query";

/// App id sent with every request; the web client's public identifier.
pub const APP_ID: &str = "936619743392459";

/// Query hash for the profile-info GraphQL document (highlight tray).
const PROFILE_QUERY_HASH: &str = "d4d88dc1500312af6f937f7b804c68c3";

pub fn user_profile(base: &str, username: &str) -> String {
    format!("{base}/users/web_profile_info/?username={username}")
}

pub fn user_feed(base: &str, user_id: &str, count: usize, max_id: &str) -> String {
    format!("{base}/feed/user/{user_id}/?count={count}&max_id={max_id}")
}

pub fn user_reels_feed(base: &str, user_id: &str, count: usize, max_id: &str) -> String {
    format!("{base}/feed/user/{user_id}/reels/?count={count}&max_id={max_id}")
}

/// Batched story/highlight-reel contents request. Each id is repeated as its
/// own `reel_ids` query parameter.
pub fn reels_media(base: &str, reel_ids: &[String]) -> String {
    format!("{base}/feed/reels_media/?reel_ids={}", reel_ids.join("&reel_ids="))
}

pub fn highlight_tray(base: &str, user_id: &str) -> String {
    let variables = serde_json::json!({
        "user_id": user_id,
        "include_chaining": false,
        "include_reel": false,
        "include_suggested_users": false,
        "include_logged_out_extras": false,
        "include_highlight_reels": true,
        "include_live_status": true,
    });
    let variables_str = variables.to_string();
    let encoded = utf8_percent_encode(&variables_str, NON_ALPHANUMERIC);
    format!("{base}/?query_hash={PROFILE_QUERY_HASH}&variables={encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_url_carries_cursor_and_count() {
        let url = user_feed("http://x/api/v1", "123", 50, "abc");
        assert_eq!(url, "http://x/api/v1/feed/user/123/?count=50&max_id=abc");
    }

    #[test]
    fn reels_media_repeats_parameter() {
        let ids = vec!["1".to_string(), "highlight:2".to_string()];
        let url = reels_media("http://x/api/v1", &ids);
        assert_eq!(
            url,
            "http://x/api/v1/feed/reels_media/?reel_ids=1&reel_ids=highlight:2"
        );
    }

    #[test]
    fn highlight_tray_encodes_variables() {
        let url = highlight_tray("http://x/graphql/query", "42");
        assert!(url.starts_with("http://x/graphql/query/?query_hash="));
        // The JSON braces and quotes must not survive unencoded.
        assert!(!url.contains('{'));
        assert!(!url.contains('"'));
        assert!(url.contains("user%5Fid"));
    }
}
