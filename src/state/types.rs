//! Records persisted in the per-account history files.
//!
//! Field names are pinned to the JSON layout earlier runs left on disk, so
//! histories written by any prior version keep deserializing. Numeric ids in
//! old files may appear as JSON numbers; they are normalized to strings on
//! the way in.

use serde::{Deserialize, Serialize};

/// A user tagged on a media item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedUser {
    #[serde(with = "id_string")]
    pub id: String,
    pub username: String,
}

/// One media item, normalized at the resolver boundary.
///
/// Immutable once produced. `parent` is set only for carousel children;
/// `time` is the unix capture timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedItem {
    #[serde(with = "id_string")]
    pub id: String,
    #[serde(default, with = "opt_id_string")]
    pub parent: Option<String>,
    #[serde(with = "id_string")]
    pub owner: String,
    #[serde(default)]
    pub owner_username: Option<String>,
    #[serde(default)]
    pub tagged_users: Vec<TaggedUser>,
    pub image_url: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub video_url: Option<String>,
    #[serde(default)]
    pub besties_only: bool,
    #[serde(rename = "time", default)]
    pub taken_at: i64,
}

impl ResolvedItem {
    /// Base name for files belonging to this item: `{parent}_{id}` for
    /// carousel children, plain `{id}` otherwise.
    pub fn file_stem(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{parent}_{}", self.id),
            None => self.id.clone(),
        }
    }

    /// The video URL, if the item actually has one. Histories written by
    /// older runs store image-only items with an empty string here.
    pub fn video_url(&self) -> Option<&str> {
        self.video_url.as_deref().filter(|u| !u.is_empty())
    }
}

/// A highlight collection: metadata plus the reel items accumulated while
/// its pages are walked within one run. Persisted as a full snapshot,
/// overwriting the previous run's file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightCollection {
    #[serde(with = "id_string")]
    pub id: String,
    pub title: String,
    pub thumbnail_url: String,
    #[serde(default)]
    pub reels: Vec<ResolvedItem>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Str(String),
    Num(u64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Str(s) => s,
            RawId::Num(n) => n.to_string(),
        }
    }
}

mod id_string {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::RawId;

    pub fn serialize<S: Serializer>(v: &str, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(v)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(RawId::deserialize(d)?.into())
    }
}

mod opt_id_string {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::RawId;

    pub fn serialize<S: Serializer>(v: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(v) => s.serialize_str(v),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<RawId>::deserialize(d)?.map(String::from))
    }
}

fn empty_as_none<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    use serde::Deserialize;
    Ok(Option::<String>::deserialize(d)?.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stem_prefixes_carousel_parent() {
        let mut item = sample_item();
        assert_eq!(item.file_stem(), "111");
        item.parent = Some("222".into());
        assert_eq!(item.file_stem(), "222_111");
    }

    #[test]
    fn legacy_record_with_numeric_ids_parses() {
        let json = r#"{
            "id": 3113456789,
            "owner": 50012345,
            "image_url": "https://cdn.example/a.jpg",
            "video_url": "",
            "besties_only": false,
            "parent": null,
            "time": 1690000000
        }"#;
        let item: ResolvedItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "3113456789");
        assert_eq!(item.owner, "50012345");
        assert_eq!(item.video_url(), None);
        assert_eq!(item.taken_at, 1690000000);
        assert!(item.tagged_users.is_empty());
    }

    #[test]
    fn round_trip_preserves_tags_and_time() {
        let item = ResolvedItem {
            tagged_users: vec![
                TaggedUser {
                    id: "7".into(),
                    username: "amira".into(),
                },
                TaggedUser {
                    id: "7".into(),
                    username: "amira".into(),
                },
            ],
            video_url: Some("https://cdn.example/v.mp4".into()),
            ..sample_item()
        };
        let json = serde_json::to_string(&item).unwrap();
        let back: ResolvedItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
        // Duplicate tags survive the round trip untouched.
        assert_eq!(back.tagged_users.len(), 2);
    }

    fn sample_item() -> ResolvedItem {
        ResolvedItem {
            id: "111".into(),
            parent: None,
            owner: "9".into(),
            owner_username: Some("amira".into()),
            tagged_users: Vec::new(),
            image_url: "https://cdn.example/a.jpg".into(),
            video_url: None,
            besties_only: false,
            taken_at: 1700000000,
        }
    }
}
