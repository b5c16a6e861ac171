//! Tag fan-out: replicate an item's downloaded files into the folders of
//! tracked accounts tagged on it. Local copies only, never a re-fetch.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::paths::{self, ItemPaths};
use crate::state::{IdentityMap, ResolvedItem, StateStore};

/// Copy the item's files into each tracked tagged account's parallel
/// `tagged/` subtree.
///
/// A tag counts as tracked when its numeric id is in the identity map, or
/// (fallback) a directory bearing the tag's display name already carries the
/// metadata marker. Untracked tags are skipped silently. Copies are no-ops
/// when the destination exists. Returns the number of copies performed.
pub fn distribute(
    store: &StateStore,
    identity: &IdentityMap,
    item: &ResolvedItem,
    downloaded: &ItemPaths,
    category: &str,
) -> std::io::Result<u64> {
    let mut copies = 0;
    for tag in &item.tagged_users {
        let display = match identity.get(&tag.id) {
            Some(name) => name.clone(),
            None if store.is_tracked_dir(&tag.username) => tag.username.clone(),
            None => {
                debug!(id = %tag.id, username = %tag.username, "Tag not tracked, skipping");
                continue;
            }
        };

        let dest = paths::item_paths(store.root(), Path::new(&display), category, item, true);
        copies += copy_if_needed(&downloaded.image, &dest.image)?;
        if let (Some(src), Some(dst)) = (&downloaded.video, &dest.video) {
            copies += copy_if_needed(src, dst)?;
        }
    }
    Ok(copies)
}

/// Copy `src` to `dest` unless the source is missing (failed download) or
/// the destination already exists. Carries the source's timestamps onto the
/// copy best-effort.
fn copy_if_needed(src: &Path, dest: &Path) -> std::io::Result<u64> {
    if !src.exists() || dest.exists() {
        return Ok(0);
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dest)?;

    if let Ok(meta) = fs::metadata(src) {
        let mut times = fs::FileTimes::new();
        if let Ok(modified) = meta.modified() {
            times = times.set_modified(modified);
        }
        if let Ok(accessed) = meta.accessed() {
            times = times.set_accessed(accessed);
        }
        if let Ok(file) = fs::OpenOptions::new().write(true).open(dest) {
            let _ = file.set_times(times);
        }
    }
    Ok(1)
}
