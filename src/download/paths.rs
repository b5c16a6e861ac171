//! Local layout for downloaded media.
//!
//! ```text
//! {root}/{owner}/{category}/[tagged/][private/][video_thumbnails/]{stem}.{ext}
//! ```
//! where `{stem}` is `{parent}_{id}` for carousel children and `{id}`
//! otherwise. Video items store the clip under the category folder and the
//! poster frame under `video_thumbnails/` with a `_thumbnail` suffix.

use std::path::{Path, PathBuf};

use crate::state::{IdentityMap, ResolvedItem};

/// File extension from a media URL, ignoring the query string.
pub fn extension_from_url(url: &str) -> &str {
    let path = url.split('?').next().unwrap_or(url);
    path.rsplit('.').next().unwrap_or(path)
}

/// Final path segment of a media URL, ignoring the query string.
pub fn filename_from_url(url: &str) -> &str {
    let trimmed = url.trim_matches('/');
    let path = trimmed.split('?').next().unwrap_or(trimmed);
    path.rsplit('/').next().unwrap_or(path)
}

/// Folder the item's owner maps to.
///
/// Owners missing from the identity map (a repost from an untracked
/// account) degrade to the embedded display name, or an `Unknown/<id>`
/// bucket. Deliberately not an error.
pub fn owner_folder(item: &ResolvedItem, identity: &IdentityMap) -> PathBuf {
    match identity.get(&item.owner) {
        Some(name) => PathBuf::from(name),
        None => match &item.owner_username {
            Some(name) => PathBuf::from(name),
            None => Path::new("Unknown").join(&item.owner),
        },
    }
}

/// Destination files for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPaths {
    /// The image — the media itself, or the poster frame for video items.
    pub image: PathBuf,
    /// The video file, for video items.
    pub video: Option<PathBuf>,
}

/// Compute the destination paths for an item under `owner`'s folder.
///
/// `category` may be nested (`highlights/<id>`); `tagged` selects the
/// parallel fan-out subtree.
pub fn item_paths(
    root: &Path,
    owner: &Path,
    category: &str,
    item: &ResolvedItem,
    tagged: bool,
) -> ItemPaths {
    let mut dir = root.join(owner);
    for part in category.split('/').filter(|p| !p.is_empty()) {
        dir.push(part);
    }
    if tagged {
        dir.push("tagged");
    }
    if item.besties_only {
        dir.push("private");
    }

    let stem = item.file_stem();
    match item.video_url() {
        Some(video) => ItemPaths {
            image: dir.join("video_thumbnails").join(format!(
                "{stem}_thumbnail.{}",
                extension_from_url(&item.image_url)
            )),
            video: Some(dir.join(format!("{stem}.{}", extension_from_url(video)))),
        },
        None => ItemPaths {
            image: dir.join(format!("{stem}.{}", extension_from_url(&item.image_url))),
            video: None,
        },
    }
}
