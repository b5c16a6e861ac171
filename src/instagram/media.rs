//! Asset resolution: raw media records into [`ResolvedItem`]s.
//!
//! This is the typed boundary for the remote's schema-less JSON. Records are
//! mapped to strongly-typed items here and nothing downstream touches raw
//! maps. Resolution is pure; a record without an image variant is a
//! malformed-media error, which aborts the current account rather than being
//! silently skipped.

use serde_json::Value;
use tracing::warn;

use super::error::ApiError;
use crate::state::{ResolvedItem, TaggedUser};

/// Audience marker meaning "close friends only".
const BESTIES_AUDIENCE: &str = "besties";

/// Owner and timestamp context a carousel child inherits from its parent
/// record when it carries none of its own.
#[derive(Debug, Clone)]
pub struct OwnerContext {
    pub parent_id: String,
    pub owner_id: String,
    pub owner_username: Option<String>,
    pub taken_at: Option<i64>,
}

/// Normalize an id field that the remote serializes as either a JSON number
/// or a string.
pub fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Resolve a raw feed record, expanding carousels into one item per child.
pub fn resolve(raw: &Value) -> Result<Vec<ResolvedItem>, ApiError> {
    let children = match raw["carousel_media"].as_array() {
        Some(children) => children,
        None => return Ok(vec![resolve_single(raw, None)?]),
    };

    let parent_id = id_of(&raw["pk"])
        .or_else(|| id_of(&raw["id"]))
        .ok_or_else(|| ApiError::Malformed("carousel record without an id".into()))?;
    let owner_id = id_of(&raw["user"]["pk"]).ok_or_else(|| {
        ApiError::Malformed(format!("carousel {parent_id} has no owner record"))
    })?;
    let ctx = OwnerContext {
        parent_id,
        owner_id,
        owner_username: raw["user"]["username"].as_str().map(str::to_owned),
        taken_at: raw["taken_at"].as_i64(),
    };

    children
        .iter()
        .map(|child| resolve_single(child, Some(&ctx)))
        .collect()
}

/// Resolve one raw media record (a story item, a plain post, or a carousel
/// child with its parent's context).
pub fn resolve_single(
    raw: &Value,
    ctx: Option<&OwnerContext>,
) -> Result<ResolvedItem, ApiError> {
    let id = id_of(&raw["pk"])
        .or_else(|| id_of(&raw["id"]))
        .ok_or_else(|| ApiError::Malformed("media record without an id".into()))?;

    let owner = id_of(&raw["user"]["pk"])
        .or_else(|| ctx.map(|c| c.owner_id.clone()))
        .ok_or_else(|| ApiError::Malformed(format!("media item {id} has no owner")))?;
    let owner_username = raw["user"]["username"]
        .as_str()
        .map(str::to_owned)
        .or_else(|| ctx.and_then(|c| c.owner_username.clone()));

    let parent = id_of(&raw["carousel_parent_id"])
        .or_else(|| id_of(&raw["parent_id"]))
        .or_else(|| ctx.map(|c| c.parent_id.clone()));

    let taken_at = raw["taken_at"]
        .as_i64()
        .or_else(|| ctx.and_then(|c| c.taken_at))
        .unwrap_or(0);

    let image_url = raw["image_versions2"]["candidates"]
        .as_array()
        .and_then(|candidates| best_candidate(candidates))
        .ok_or_else(|| ApiError::MalformedMedia(id.clone()))?
        .to_owned();

    let video_url = raw["video_versions"]
        .as_array()
        .and_then(|versions| best_candidate(versions))
        .map(str::to_owned);

    Ok(ResolvedItem {
        id,
        parent,
        owner,
        owner_username,
        tagged_users: flatten_tags(&raw["usertags"]),
        image_url,
        video_url,
        besties_only: raw["audience"].as_str() == Some(BESTIES_AUDIENCE),
        taken_at,
    })
}

/// Pick the variant with the largest `width * height`. Ties resolve to the
/// later candidate.
fn best_candidate(candidates: &[Value]) -> Option<&str> {
    candidates
        .iter()
        .filter_map(|c| {
            let url = c["url"].as_str()?;
            let area = c["width"].as_u64().unwrap_or(0) * c["height"].as_u64().unwrap_or(0);
            Some((url, area))
        })
        .max_by_key(|&(_, area)| area)
        .map(|(url, _)| url)
}

/// Flatten the tag buckets into one ordered list. Duplicate tags are kept
/// as-is; records without a usable user are dropped with a warning.
fn flatten_tags(usertags: &Value) -> Vec<TaggedUser> {
    let buckets = match usertags.as_object() {
        Some(buckets) => buckets,
        None => return Vec::new(),
    };

    let mut tags = Vec::new();
    for records in buckets.values() {
        let Some(records) = records.as_array() else {
            continue;
        };
        for record in records {
            let user = &record["user"];
            match (id_of(&user["pk"]), user["username"].as_str()) {
                (Some(id), Some(username)) => tags.push(TaggedUser {
                    id,
                    username: username.to_owned(),
                }),
                _ => warn!("Dropping tag record without user id/username"),
            }
        }
    }
    tags
}
