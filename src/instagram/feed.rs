//! Feed access: profile lookups, cursor pagination to a known boundary, and
//! batched story/highlight-reel fetches.
//!
//! Every request goes through one throttled entry point so the whole client
//! is paced by the operator-configured sleep, one request in flight at a
//! time.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::endpoints;
use super::error::ApiError;
use super::media::id_of;
use super::session::Session;
use crate::state::{HighlightCollection, HistoryKind};

/// Page size requested once the first response has revealed the feed shape.
/// The first request probes with a count of 1.
const PAGE_SIZE: usize = 50;
const FIRST_PAGE_COUNT: usize = 1;

/// Core fields of a profile lookup.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub pic_sd: Option<String>,
    pub pic_hd: Option<String>,
}

pub struct FeedClient<'a> {
    session: &'a dyn Session,
    v1_base: String,
    graph_base: String,
    delay: Duration,
}

impl<'a> FeedClient<'a> {
    pub fn new(session: &'a dyn Session, delay: Duration) -> Self {
        Self::with_bases(
            session,
            endpoints::API_V1.to_string(),
            endpoints::API_GRAPH.to_string(),
            delay,
        )
    }

    /// Construct against explicit base URLs (tests point this at a mock).
    pub fn with_bases(
        session: &'a dyn Session,
        v1_base: String,
        graph_base: String,
        delay: Duration,
    ) -> Self {
        Self {
            session,
            v1_base,
            graph_base,
            delay,
        }
    }

    /// Throttled GET; the pause runs before the request so every call site
    /// is rate limited the same way.
    async fn get(&self, url: &str) -> Result<Value, ApiError> {
        tokio::time::sleep(self.delay).await;
        self.session.get_json(url).await
    }

    /// Look up an account by display name. Returns `None` when the account
    /// does not exist or was deleted, which is a steady-state condition.
    pub async fn user_profile(&self, username: &str) -> Result<Option<UserProfile>, ApiError> {
        let url = endpoints::user_profile(&self.v1_base, username);
        let data = match self.get(&url).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let user = &data["data"]["user"];
        if user.is_null() {
            return Ok(None);
        }
        let id = id_of(&user["id"])
            .or_else(|| id_of(&user["pk"]))
            .ok_or_else(|| ApiError::Malformed(format!("profile of {username} has no id")))?;
        Ok(Some(UserProfile {
            id,
            username: user["username"]
                .as_str()
                .unwrap_or(username)
                .to_owned(),
            pic_sd: user["profile_pic_url"].as_str().map(str::to_owned),
            pic_hd: user["profile_pic_url_hd"].as_str().map(str::to_owned),
        }))
    }

    /// Walk the account's feed newest-first until the remote reports no more
    /// pages or a previously-recorded id shows up.
    ///
    /// When a batch contains a known id, the items ahead of it are returned
    /// and the rest of the batch is discarded without another request — each
    /// run only pages back to the last recorded boundary. With no known ids
    /// (first sync) the walk is a full backfill.
    ///
    /// The returned sequence is raw records; resolution happens at the
    /// caller so carousel expansion stays out of the paging logic.
    pub async fn fetch_new_items(
        &self,
        kind: HistoryKind,
        user_id: &str,
        known_ids: &HashSet<String>,
    ) -> Result<Vec<Value>, ApiError> {
        let mut items = Vec::new();
        let mut cursor = String::new();
        let mut count = FIRST_PAGE_COUNT;
        let mut page = 0u32;

        loop {
            let url = match kind {
                HistoryKind::Posts => {
                    endpoints::user_feed(&self.v1_base, user_id, count, &cursor)
                }
                HistoryKind::Reels => {
                    endpoints::user_reels_feed(&self.v1_base, user_id, count, &cursor)
                }
            };
            let data = self.get(&url).await?;
            page += 1;

            let more = data["more_available"].as_bool().unwrap_or(false);
            cursor = id_of(&data["next_max_id"]).unwrap_or_default();
            let batch = data["items"].as_array().ok_or_else(|| {
                ApiError::Malformed(format!("feed page {page} for {user_id} has no items"))
            })?;
            debug!(user_id, page, batch = batch.len(), more, "Fetched feed page");

            for item in batch {
                let id = id_of(&item["pk"]).or_else(|| id_of(&item["id"]));
                if let Some(id) = id {
                    if known_ids.contains(&id) {
                        debug!(user_id, %id, "Reached known history boundary");
                        return Ok(items);
                    }
                }
                items.push(item.clone());
            }

            if !more {
                return Ok(items);
            }
            count = PAGE_SIZE;
        }
    }

    /// Fetch the contents of a batch of reels (story feeds or highlight
    /// reels) by explicit id. Not paginated; callers chunk the id list.
    pub async fn reels_media(&self, reel_ids: &[String]) -> Result<Value, ApiError> {
        self.get(&endpoints::reels_media(&self.v1_base, reel_ids))
            .await
    }

    /// Fetch the account's highlight tray: empty collections keyed by
    /// highlight id, plus the prefixed ids to request contents with.
    pub async fn highlight_tray(
        &self,
        user_id: &str,
    ) -> Result<(BTreeMap<String, HighlightCollection>, Vec<String>), ApiError> {
        let data = self
            .get(&endpoints::highlight_tray(&self.graph_base, user_id))
            .await?;
        let edges = data["data"]["user"]["edge_highlight_reels"]["edges"]
            .as_array()
            .ok_or_else(|| {
                ApiError::Malformed(format!("highlight tray for {user_id} has no edges"))
            })?;

        let mut collections = BTreeMap::new();
        let mut reel_ids = Vec::new();
        for edge in edges {
            let node = &edge["node"];
            let id = id_of(&node["id"]).ok_or_else(|| {
                ApiError::Malformed(format!("highlight node for {user_id} has no id"))
            })?;
            reel_ids.push(format!("highlight:{id}"));
            collections.insert(
                id.clone(),
                HighlightCollection {
                    id,
                    title: node["title"].as_str().unwrap_or_default().to_owned(),
                    thumbnail_url: node["cover_media"]["thumbnail_src"]
                        .as_str()
                        .unwrap_or_default()
                        .to_owned(),
                    reels: Vec::new(),
                },
            );
        }
        Ok((collections, reel_ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instagram::session::IgSession;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn feed_page(ids: &[&str], more: bool, next: &str) -> Value {
        json!({
            "items": ids.iter().map(|id| json!({
                "pk": id,
                "user": {"pk": "1", "username": "amira"},
                "image_versions2": {"candidates": [
                    {"width": 100, "height": 100, "url": format!("https://cdn.example/{id}.jpg")}
                ]}
            })).collect::<Vec<_>>(),
            "more_available": more,
            "next_max_id": next,
        })
    }

    async fn client_for(server: &MockServer) -> (IgSession, String) {
        let session = IgSession::new("sid", true).unwrap();
        (session, server.uri())
    }

    #[tokio::test]
    async fn stops_at_known_boundary_without_further_requests() {
        let server = MockServer::start().await;
        // Page 1 (probe, count=1) holds A, B, C; C is already known.
        Mock::given(method("GET"))
            .and(path("/feed/user/1/"))
            .and(query_param("count", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(feed_page(
                &["A", "B", "C"],
                true,
                "cur1",
            )))
            .expect(1)
            .mount(&server)
            .await;
        // No request may go past the page containing the boundary.
        Mock::given(method("GET"))
            .and(path("/feed/user/1/"))
            .and(query_param("max_id", "cur1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(feed_page(
                &["D", "E"],
                false,
                "",
            )))
            .expect(0)
            .mount(&server)
            .await;

        let (session, base) = client_for(&server).await;
        let client =
            FeedClient::with_bases(&session, base.clone(), base, Duration::ZERO);
        let known: HashSet<String> =
            ["C", "D", "E"].iter().map(|s| s.to_string()).collect();
        let items = client
            .fetch_new_items(HistoryKind::Posts, "1", &known)
            .await
            .unwrap();

        let ids: Vec<String> = items
            .iter()
            .map(|i| id_of(&i["pk"]).unwrap())
            .collect();
        assert_eq!(ids, ["A", "B"]);
    }

    #[tokio::test]
    async fn empty_history_walks_to_the_end() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed/user/1/"))
            .and(query_param("count", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(feed_page(
                &["A", "B", "C"],
                true,
                "cur1",
            )))
            .expect(1)
            .mount(&server)
            .await;
        // Second page must be requested with the revealed page size.
        Mock::given(method("GET"))
            .and(path("/feed/user/1/"))
            .and(query_param("count", "50"))
            .and(query_param("max_id", "cur1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(feed_page(
                &["D", "E"],
                false,
                "",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let (session, base) = client_for(&server).await;
        let client =
            FeedClient::with_bases(&session, base.clone(), base, Duration::ZERO);
        let items = client
            .fetch_new_items(HistoryKind::Posts, "1", &HashSet::new())
            .await
            .unwrap();
        assert_eq!(items.len(), 5);
    }

    #[tokio::test]
    async fn profile_lookup_maps_deleted_accounts_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/web_profile_info/"))
            .and(query_param("username", "ghost"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"user": null}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/web_profile_info/"))
            .and(query_param("username", "gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (session, base) = client_for(&server).await;
        let client =
            FeedClient::with_bases(&session, base.clone(), base, Duration::ZERO);
        assert!(client.user_profile("ghost").await.unwrap().is_none());
        assert!(client.user_profile("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn profile_lookup_extracts_picture_urls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/web_profile_info/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"user": {
                    "id": "50012345",
                    "username": "amira",
                    "profile_pic_url": "https://cdn.example/sd.jpg",
                    "profile_pic_url_hd": "https://cdn.example/hd.jpg"
                }}
            })))
            .mount(&server)
            .await;

        let (session, base) = client_for(&server).await;
        let client =
            FeedClient::with_bases(&session, base.clone(), base, Duration::ZERO);
        let profile = client.user_profile("amira").await.unwrap().unwrap();
        assert_eq!(profile.id, "50012345");
        assert_eq!(profile.pic_hd.as_deref(), Some("https://cdn.example/hd.jpg"));
    }

    #[tokio::test]
    async fn highlight_tray_builds_prefixed_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"user": {"edge_highlight_reels": {"edges": [
                    {"node": {
                        "id": "17900001",
                        "title": "trips",
                        "cover_media": {"thumbnail_src": "https://cdn.example/t1.jpg"}
                    }},
                    {"node": {
                        "id": "17900002",
                        "title": "food",
                        "cover_media": {"thumbnail_src": "https://cdn.example/t2.jpg"}
                    }}
                ]}}}
            })))
            .mount(&server)
            .await;

        let (session, base) = client_for(&server).await;
        let client =
            FeedClient::with_bases(&session, base.clone(), base, Duration::ZERO);
        let (collections, ids) = client.highlight_tray("1").await.unwrap();
        assert_eq!(ids, ["highlight:17900001", "highlight:17900002"]);
        assert_eq!(collections["17900001"].title, "trips");
        assert!(collections["17900002"].reels.is_empty());
    }
}
