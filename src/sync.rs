//! Per-category run orchestration.
//!
//! For each configured account: detect and register new accounts (pruning
//! deleted ones for the rest of the run), then walk stories, posts, reels,
//! and highlights, downloading new media and persisting the merged
//! histories. A hard error while processing one account is logged and the
//! run continues with the next; only configuration and store-level failures
//! abort the category.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::download::{self, fetch, paths, DownloadStats};
use crate::instagram::{media, FeedClient, Session};
use crate::profile_pics::{self, FreshnessTracker};
use crate::retry::RetryConfig;
use crate::state::{hour_bucket, HistoryKind, IdentityMap, ResolvedItem, StateStore};
use crate::types::RefreshPolicy;

/// Story batches request several accounts at once; the chunk is this many
/// times the operator's download limit since story feeds are small.
const STORY_CHUNK_FACTOR: usize = 3;

/// Subset of the application config consumed by the sync engine, decoupled
/// from CLI parsing so the engine can be driven from tests.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub download_limit: usize,
    pub sleep: Duration,
    pub stories: bool,
    pub posts: bool,
    pub reels: bool,
    pub highlights: bool,
    pub profile_pics: bool,
    pub retry: RetryConfig,
    pub show_progress: bool,
}

/// Tally for one category run.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncStats {
    pub new_items: u64,
    pub pruned_accounts: u64,
    pub failed_accounts: u64,
    pub downloads: DownloadStats,
}

/// Mirror every account of one category.
pub async fn sync_category(
    feed: &FeedClient<'_>,
    session: &dyn Session,
    store: &StateStore,
    users: &[String],
    cfg: &SyncConfig,
) -> anyhow::Result<SyncStats> {
    let mut stats = SyncStats::default();

    for user in users {
        store.ensure_account_dirs(user)?;
    }

    let mut identity = store.load_identity_map()?;
    // Run-scoped working set: numeric id -> display name, configured
    // accounts only.
    let mut mapping: IdentityMap = identity
        .iter()
        .filter(|(_, name)| users.contains(*name))
        .map(|(id, name)| (id.clone(), name.clone()))
        .collect();
    let known_names: HashSet<String> = mapping.values().cloned().collect();

    let bucket = profile_pics::current_bucket(chrono::Utc::now());
    let mut tracker = FreshnessTracker::new();

    let mut active: Vec<String> = Vec::with_capacity(users.len());
    for username in users {
        if known_names.contains(username) {
            active.push(username.clone());
            continue;
        }
        info!(username, "New account detected");
        match feed.user_profile(username).await {
            Ok(Some(profile)) => {
                identity.insert(profile.id.clone(), username.clone());
                if let Some(url) = profile.pic_hd.as_deref().or(profile.pic_sd.as_deref()) {
                    if let Err(e) = profile_pics::download_profile_pic(
                        session,
                        store,
                        username,
                        url,
                        &bucket,
                        RefreshPolicy::IfStale,
                        &cfg.retry,
                    )
                    .await
                    {
                        error!(username, error = %e, "Profile picture download failed, skipping account");
                        stats.failed_accounts += 1;
                        continue;
                    }
                }
                mapping.insert(profile.id, username.clone());
                active.push(username.clone());
            }
            Ok(None) => {
                warn!(username, "Account does not exist or was deleted, pruning for this run");
                stats.pruned_accounts += 1;
            }
            Err(e) => {
                error!(username, error = %e, "Profile lookup failed, skipping account");
                stats.failed_accounts += 1;
            }
        }
    }
    store.save_identity_map(&identity)?;

    if cfg.stories {
        let ids: Vec<String> = mapping.keys().cloned().collect();
        let story_bucket = hour_bucket(chrono::Utc::now());
        for chunk in ids.chunks(cfg.download_limit.max(1) * STORY_CHUNK_FACTOR) {
            if let Err(e) = sync_story_chunk(
                feed,
                session,
                store,
                &identity,
                &mapping,
                &mut tracker,
                chunk,
                &story_bucket,
                cfg,
                &mut stats,
            )
            .await
            {
                error!(error = %e, "Story batch failed, continuing");
                stats.failed_accounts += 1;
            }
        }
    }

    for kind in [HistoryKind::Posts, HistoryKind::Reels] {
        let enabled = match kind {
            HistoryKind::Posts => cfg.posts,
            HistoryKind::Reels => cfg.reels,
        };
        if !enabled {
            continue;
        }
        for (user_id, username) in mapping.clone() {
            if let Err(e) = sync_feed_history(
                feed,
                session,
                store,
                &identity,
                &mut tracker,
                kind,
                &user_id,
                &username,
                cfg,
                &mut stats,
            )
            .await
            {
                error!(
                    username,
                    category = kind.category(),
                    error = %e,
                    "Feed sync failed, skipping account"
                );
                stats.failed_accounts += 1;
            }
        }
    }

    if cfg.highlights {
        for (user_id, username) in mapping.clone() {
            if let Err(e) =
                sync_highlights(feed, session, store, &identity, &user_id, &username, cfg, &mut stats)
                    .await
            {
                error!(username, error = %e, "Highlights sync failed, skipping account");
                stats.failed_accounts += 1;
            }
        }
    }

    if cfg.profile_pics {
        info!("Validating profile pictures");
        for username in &active {
            if tracker.contains(username) {
                continue;
            }
            if profile_pics::needs_refresh(store, username, &bucket) {
                info!(username, "Profile picture marker expired");
                tracker.mark_stale(username);
            }
        }
        for (username, candidates, policy) in tracker.into_entries() {
            match profile_pics::refresh_account(
                feed,
                session,
                store,
                &username,
                candidates,
                policy,
                &bucket,
                &cfg.retry,
            )
            .await
            {
                Ok(Some(user_id)) => {
                    identity.insert(user_id, username);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(username, error = %e, "Profile picture refresh failed");
                    stats.failed_accounts += 1;
                }
            }
        }
        store.save_identity_map(&identity)?;
    }

    Ok(stats)
}

/// Fetch one batch of story feeds, snapshot each account's items, and
/// download them.
#[allow(clippy::too_many_arguments)]
async fn sync_story_chunk(
    feed: &FeedClient<'_>,
    session: &dyn Session,
    store: &StateStore,
    identity: &IdentityMap,
    mapping: &IdentityMap,
    tracker: &mut FreshnessTracker,
    chunk: &[String],
    story_bucket: &str,
    cfg: &SyncConfig,
    stats: &mut SyncStats,
) -> anyhow::Result<()> {
    let names: Vec<&str> = chunk
        .iter()
        .filter_map(|id| mapping.get(id).map(String::as_str))
        .collect();
    info!(accounts = ?names, "Fetching stories");

    let data = feed.reels_media(chunk).await?;
    let reels = match data["reels"].as_object() {
        Some(reels) => reels,
        None => {
            debug!("No story reels in response");
            return Ok(());
        }
    };

    for (reel_id, reel) in reels {
        let Some(username) = mapping.get(reel_id) else {
            continue;
        };
        if !reel["user"].is_null() {
            // Story feeds carry the owner's current picture URLs as a side
            // channel; record them for the refresh pass.
            tracker.observe(username, &reel["user"], RefreshPolicy::AlwaysIfHigherRes);
        }

        let items = resolve_all(reel["items"].as_array())?;
        store.save_story_snapshot(username, story_bucket, &items)?;
        stats.new_items += items.len() as u64;

        let outcome = download::download_items(
            session,
            store,
            identity,
            &items,
            "stories",
            &cfg.retry,
            cfg.show_progress,
        )
        .await?;
        stats.downloads.merge(outcome);
    }
    Ok(())
}

/// Walk one account's paginated feed down to the recorded boundary, download
/// everything new, and persist the merged history.
#[allow(clippy::too_many_arguments)]
async fn sync_feed_history(
    feed: &FeedClient<'_>,
    session: &dyn Session,
    store: &StateStore,
    identity: &IdentityMap,
    tracker: &mut FreshnessTracker,
    kind: HistoryKind,
    user_id: &str,
    username: &str,
    cfg: &SyncConfig,
    stats: &mut SyncStats,
) -> anyhow::Result<()> {
    info!(username, user_id, category = kind.category(), "Syncing feed");

    let old = store.load_history(username, kind)?;
    let known: HashSet<String> = old.iter().map(|item| item.id.clone()).collect();
    let raw_items = feed.fetch_new_items(kind, user_id, &known).await?;

    let mut new_items: Vec<ResolvedItem> = Vec::new();
    for raw in &raw_items {
        if !raw["user"].is_null() {
            // Feed user records embed an already-HD picture URL; a refresh
            // from one overwrites the cached file.
            tracker.observe(username, &raw["user"], RefreshPolicy::Always);
        }
        new_items.extend(media::resolve(raw)?);
    }
    info!(username, new_items = new_items.len(), "Feed walk complete");
    stats.new_items += new_items.len() as u64;

    let outcome = download::download_items(
        session,
        store,
        identity,
        &new_items,
        kind.category(),
        &cfg.retry,
        cfg.show_progress,
    )
    .await?;
    stats.downloads.merge(outcome);

    store.save_merged_history(username, kind, &new_items, &old)?;
    Ok(())
}

/// The two-level highlight loop: page the highlight id list in chunks,
/// fetch each chunk's reel contents, download as soon as items resolve, and
/// write thumbnail and title files the first time a highlight is seen.
/// The collection snapshot is persisted once, after the outer loop.
#[allow(clippy::too_many_arguments)]
async fn sync_highlights(
    feed: &FeedClient<'_>,
    session: &dyn Session,
    store: &StateStore,
    identity: &IdentityMap,
    user_id: &str,
    username: &str,
    cfg: &SyncConfig,
    stats: &mut SyncStats,
) -> anyhow::Result<()> {
    info!(username, "Fetching highlight tray");
    let (mut collections, reel_ids) = feed.highlight_tray(user_id).await?;
    if reel_ids.is_empty() {
        store.save_highlights(username, &collections)?;
        return Ok(());
    }

    let limit = cfg.download_limit.max(1);
    let total_pages = reel_ids.len().div_ceil(limit);
    let mut decorated: HashSet<String> = HashSet::new();

    for (page, chunk) in reel_ids.chunks(limit).enumerate() {
        info!(username, page = page + 1, total_pages, "Fetching highlight page");
        let data = feed.reels_media(chunk).await?;
        let reels = match data["reels"].as_object() {
            Some(reels) => reels,
            None => continue,
        };

        for reel in reels.values() {
            let full_id = media::id_of(&reel["id"]).unwrap_or_default();
            let highlight_id = full_id
                .split_once(':')
                .map(|(_, id)| id)
                .unwrap_or(full_id.as_str());
            let Some(collection) = collections.get_mut(highlight_id) else {
                warn!(highlight_id, "Reel response for a highlight not in the tray");
                continue;
            };

            let items = resolve_all(reel["items"].as_array())?;
            stats.new_items += items.len() as u64;

            let category = format!("highlights/{highlight_id}");
            let outcome = download::download_items(
                session,
                store,
                identity,
                &items,
                &category,
                &cfg.retry,
                cfg.show_progress,
            )
            .await?;
            stats.downloads.merge(outcome);
            collection.reels.extend(items);

            if decorated.insert(highlight_id.to_string()) {
                let dir = store
                    .account_dir(username)
                    .join("highlights")
                    .join(highlight_id);
                std::fs::create_dir_all(&dir)?;
                if !collection.thumbnail_url.is_empty() {
                    let dest = dir.join(format!(
                        "thumbnail.{}",
                        paths::extension_from_url(&collection.thumbnail_url)
                    ));
                    fetch(
                        session,
                        &collection.thumbnail_url,
                        &dest,
                        None,
                        false,
                        &cfg.retry,
                    )
                    .await?;
                }
                std::fs::write(dir.join("name.txt"), &collection.title)?;
            }
        }
    }

    store.save_highlights(username, &collections)?;
    Ok(())
}

fn resolve_all(raw_items: Option<&Vec<Value>>) -> anyhow::Result<Vec<ResolvedItem>> {
    let mut items = Vec::new();
    for raw in raw_items.into_iter().flatten() {
        items.extend(media::resolve(raw)?);
    }
    Ok(items)
}
