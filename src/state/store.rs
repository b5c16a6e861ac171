//! Whole-file JSON persistence for the identity map and per-account
//! histories.
//!
//! Every file is read in full at the start of an account's processing and
//! written in full when its category completes, so a crash mid-run can lose
//! at most the in-progress category, never leave a half-written record.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::StateError;
use super::types::{HighlightCollection, ResolvedItem};

/// Identity map: remote numeric id (as string) to local display name.
pub type IdentityMap = BTreeMap<String, String>;

/// The two cursor-paginated history categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    Posts,
    Reels,
}

impl HistoryKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            HistoryKind::Posts => "posts.json",
            HistoryKind::Reels => "reels.json",
        }
    }

    /// Media folder name for this category.
    pub fn category(&self) -> &'static str {
        match self {
            HistoryKind::Posts => "posts",
            HistoryKind::Reels => "reels",
        }
    }
}

/// Bucket string used to name hourly story snapshots.
pub fn hour_bucket(now: DateTime<Utc>) -> String {
    now.format("%d-%m-%y_%H").to_string()
}

/// On-disk store rooted at the downloads folder.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn account_dir(&self, account: &str) -> PathBuf {
        self.root.join(account)
    }

    pub fn meta_dir(&self, account: &str) -> PathBuf {
        self.account_dir(account).join("meta")
    }

    pub fn profile_pics_dir(&self, account: &str) -> PathBuf {
        self.account_dir(account).join("profile_pics")
    }

    /// Create the account's metadata and profile-picture directories.
    pub fn ensure_account_dirs(&self, account: &str) -> Result<(), StateError> {
        for dir in [self.meta_dir(account), self.profile_pics_dir(account)] {
            fs::create_dir_all(&dir).map_err(|source| StateError::Write { path: dir, source })?;
        }
        Ok(())
    }

    /// Whether a directory bearing this display name carries the metadata
    /// marker of a tracked account. Used as the fan-out fallback when a
    /// tagged id is missing from the identity map.
    pub fn is_tracked_dir(&self, display_name: &str) -> bool {
        self.meta_dir(display_name).is_dir()
    }

    pub fn load_identity_map(&self) -> Result<IdentityMap, StateError> {
        self.read_json_or_default(&self.root.join("usernames.json"))
    }

    pub fn save_identity_map(&self, map: &IdentityMap) -> Result<(), StateError> {
        self.write_json(&self.root.join("usernames.json"), map)
    }

    pub fn load_history(
        &self,
        account: &str,
        kind: HistoryKind,
    ) -> Result<Vec<ResolvedItem>, StateError> {
        self.read_json_or_default(&self.meta_dir(account).join(kind.file_name()))
    }

    /// Persist a category history as `new` items ahead of `old` ones.
    ///
    /// The merge is strictly additive: ids already recorded are never
    /// dropped, so the history file only ever grows.
    pub fn save_merged_history(
        &self,
        account: &str,
        kind: HistoryKind,
        new: &[ResolvedItem],
        old: &[ResolvedItem],
    ) -> Result<(), StateError> {
        let merged: Vec<&ResolvedItem> = new.iter().chain(old.iter()).collect();
        self.write_json(&self.meta_dir(account).join(kind.file_name()), &merged)
    }

    /// Write one story fetch as an hour-bucketed snapshot file.
    pub fn save_story_snapshot(
        &self,
        account: &str,
        bucket: &str,
        items: &[ResolvedItem],
    ) -> Result<(), StateError> {
        self.write_json(
            &self.meta_dir(account).join(format!("story_{bucket}.json")),
            &items,
        )
    }

    /// Overwrite the account's highlight snapshot with the current state.
    /// Unlike posts/reels this is not merged with prior runs.
    pub fn save_highlights(
        &self,
        account: &str,
        collections: &BTreeMap<String, HighlightCollection>,
    ) -> Result<(), StateError> {
        self.write_json(&self.meta_dir(account).join("highlights.json"), collections)
    }

    fn read_json_or_default<T: DeserializeOwned + Default>(
        &self,
        path: &Path,
    ) -> Result<T, StateError> {
        if !path.exists() {
            return Ok(T::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| StateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| StateError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StateError> {
        let rendered =
            serde_json::to_string_pretty(value).map_err(|source| StateError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        fs::write(path, rendered).map_err(|source| StateError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(id: &str) -> ResolvedItem {
        ResolvedItem {
            id: id.into(),
            parent: None,
            owner: "1".into(),
            owner_username: None,
            tagged_users: Vec::new(),
            image_url: format!("https://cdn.example/{id}.jpg"),
            video_url: None,
            besties_only: false,
            taken_at: 0,
        }
    }

    #[test]
    fn missing_identity_map_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert!(store.load_identity_map().unwrap().is_empty());
    }

    #[test]
    fn identity_map_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut map = IdentityMap::new();
        map.insert("50012345".into(), "amira".into());
        store.save_identity_map(&map).unwrap();
        assert_eq!(store.load_identity_map().unwrap(), map);
    }

    #[test]
    fn merged_history_puts_new_items_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.ensure_account_dirs("amira").unwrap();

        let old = vec![item("3"), item("4")];
        store
            .save_merged_history("amira", HistoryKind::Posts, &[], &old)
            .unwrap();

        let loaded = store.load_history("amira", HistoryKind::Posts).unwrap();
        store
            .save_merged_history("amira", HistoryKind::Posts, &[item("1"), item("2")], &loaded)
            .unwrap();

        let ids: Vec<String> = store
            .load_history("amira", HistoryKind::Posts)
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, ["1", "2", "3", "4"]);
    }

    #[test]
    fn story_snapshot_is_hour_bucketed() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.ensure_account_dirs("amira").unwrap();

        let ts = Utc.with_ymd_and_hms(2026, 8, 4, 13, 5, 0).unwrap();
        let bucket = hour_bucket(ts);
        assert_eq!(bucket, "04-08-26_13");

        store
            .save_story_snapshot("amira", &bucket, &[item("9")])
            .unwrap();
        assert!(dir
            .path()
            .join("amira/meta/story_04-08-26_13.json")
            .exists());
    }

    #[test]
    fn highlights_snapshot_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.ensure_account_dirs("amira").unwrap();

        let mut first = BTreeMap::new();
        first.insert(
            "h1".to_string(),
            HighlightCollection {
                id: "h1".into(),
                title: "trips".into(),
                thumbnail_url: "https://cdn.example/t.jpg".into(),
                reels: vec![item("1")],
            },
        );
        store.save_highlights("amira", &first).unwrap();

        let second = BTreeMap::new();
        store.save_highlights("amira", &second).unwrap();

        let raw = fs::read_to_string(dir.path().join("amira/meta/highlights.json")).unwrap();
        let parsed: BTreeMap<String, HighlightCollection> =
            serde_json::from_str(&raw).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn tracked_dir_marker_is_the_meta_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert!(!store.is_tracked_dir("amira"));
        store.ensure_account_dirs("amira").unwrap();
        assert!(store.is_tracked_dir("amira"));
    }
}
