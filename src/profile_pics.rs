//! Profile-picture freshness tracking and refresh.
//!
//! A marker file per account (`profile_pics/last.txt`) stores the coarse
//! time bucket in which the picture was last verified; within the same
//! bucket the refresh is skipped entirely. Candidate URLs observed as
//! side-channel data while parsing stories and posts upgrade the recorded
//! candidate (HD-max over HD over SD) without downloading anything until
//! the refresh step at the end of the account pass.

use std::collections::BTreeMap;
use std::fs;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::download::paths::filename_from_url;
use crate::download::{fetch, FetchOutcome};
use crate::instagram::media::id_of;
use crate::instagram::{FeedClient, Session};
use crate::retry::RetryConfig;
use crate::state::StateStore;
use crate::types::RefreshPolicy;

/// Freshness bucket: year-week granularity.
///
/// Markers written by older runs in bare week-number form simply compare
/// unequal once and converge on the new format.
pub fn current_bucket(now: DateTime<Utc>) -> String {
    now.format("%Y-W%W").to_string()
}

/// Candidate picture URLs for one account.
#[derive(Debug, Default, Clone)]
pub struct PicCandidates {
    pub user_id: Option<String>,
    pub sd: Option<String>,
    pub hd: Option<String>,
    pub hd_max: Option<String>,
}

impl PicCandidates {
    /// Best known URL, preferring HD-max over HD over SD.
    pub fn best(&self) -> Option<&str> {
        self.hd_max
            .as_deref()
            .or(self.hd.as_deref())
            .or(self.sd.as_deref())
    }

    /// Merge in freshly observed URLs; newer observations win per tier.
    fn upgrade(&mut self, other: PicCandidates) {
        if other.user_id.is_some() {
            self.user_id = other.user_id;
        }
        if other.sd.is_some() {
            self.sd = other.sd;
        }
        if other.hd.is_some() {
            self.hd = other.hd;
        }
        if other.hd_max.is_some() {
            self.hd_max = other.hd_max;
        }
    }
}

fn extract_candidates(user: &Value) -> PicCandidates {
    PicCandidates {
        user_id: id_of(&user["pk"]).or_else(|| id_of(&user["id"])),
        sd: user["profile_pic_url"].as_str().map(str::to_owned),
        hd: user["profile_pic_url_hd"].as_str().map(str::to_owned),
        hd_max: user["hd_profile_pic_url_info"]["url"]
            .as_str()
            .map(str::to_owned),
    }
}

/// Per-run ledger of accounts whose picture needs attention.
#[derive(Debug, Default)]
pub struct FreshnessTracker {
    entries: BTreeMap<String, (PicCandidates, RefreshPolicy)>,
}

impl FreshnessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record candidate URLs from a raw user record, escalating the
    /// account's refresh policy to `policy` if it is stronger.
    pub fn observe(&mut self, username: &str, user: &Value, policy: RefreshPolicy) {
        let observed = extract_candidates(user);
        let entry = self
            .entries
            .entry(username.to_owned())
            .or_insert_with(|| (PicCandidates::default(), RefreshPolicy::Never));
        entry.0.upgrade(observed);
        entry.1 = entry.1.max(policy);
    }

    /// Enter an account whose marker has aged out, with no candidates yet.
    pub fn mark_stale(&mut self, username: &str) {
        let entry = self
            .entries
            .entry(username.to_owned())
            .or_insert_with(|| (PicCandidates::default(), RefreshPolicy::Never));
        entry.1 = entry.1.max(RefreshPolicy::IfStale);
    }

    pub fn contains(&self, username: &str) -> bool {
        self.entries.contains_key(username)
    }

    pub fn into_entries(self) -> impl Iterator<Item = (String, PicCandidates, RefreshPolicy)> {
        self.entries
            .into_iter()
            .map(|(name, (candidates, policy))| (name, candidates, policy))
    }
}

/// Whether the account's marker has aged out of the current bucket.
/// An absent or unreadable marker counts as stale.
pub fn needs_refresh(store: &StateStore, account: &str, bucket: &str) -> bool {
    let marker = store.profile_pics_dir(account).join("last.txt");
    match fs::read_to_string(marker) {
        Ok(contents) => contents.trim() != bucket,
        Err(_) => true,
    }
}

/// Stamp the account's marker with the current bucket.
pub fn record_refreshed(
    store: &StateStore,
    account: &str,
    bucket: &str,
) -> std::io::Result<()> {
    let dir = store.profile_pics_dir(account);
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("last.txt"), bucket)
}

/// Download the account's picture (named after the URL's file segment) and
/// stamp the marker unless the download outright failed.
pub async fn download_profile_pic(
    session: &dyn Session,
    store: &StateStore,
    account: &str,
    url: &str,
    bucket: &str,
    policy: RefreshPolicy,
    retry: &RetryConfig,
) -> anyhow::Result<FetchOutcome> {
    let dir = store.profile_pics_dir(account);
    fs::create_dir_all(&dir)?;
    let dest = dir.join(filename_from_url(url));
    let outcome = fetch(session, url, &dest, None, policy.overwrites(), retry).await?;
    if outcome != FetchOutcome::Failed {
        record_refreshed(store, account, bucket)?;
    }
    Ok(outcome)
}

/// Refresh one ledger entry: pick the best candidate, then download
/// idempotently. An entry with no HD-tier URL gets a fresh profile lookup
/// first, since side-channel SD urls are lower resolution than what the
/// profile endpoint serves.
///
/// Returns the account's numeric id when one is known, so the caller can
/// keep the identity map current.
pub async fn refresh_account(
    feed: &FeedClient<'_>,
    session: &dyn Session,
    store: &StateStore,
    account: &str,
    mut candidates: PicCandidates,
    policy: RefreshPolicy,
    bucket: &str,
    retry: &RetryConfig,
) -> anyhow::Result<Option<String>> {
    if candidates.hd_max.is_none() && candidates.hd.is_none() {
        // The lookup path is throttled by the feed client itself.
        match feed.user_profile(account).await? {
            Some(profile) => {
                candidates.user_id = Some(profile.id);
                candidates.hd = profile.pic_hd;
                if profile.pic_sd.is_some() {
                    candidates.sd = profile.pic_sd;
                }
            }
            None => {
                info!(account, "Account gone, skipping picture refresh");
                return Ok(None);
            }
        }
    } else {
        tokio::time::sleep(retry.delay).await;
    }

    // A known maximum-resolution URL upgrades the refresh to a forced one.
    let effective = if policy == RefreshPolicy::AlwaysIfHigherRes && candidates.hd_max.is_some() {
        RefreshPolicy::Always
    } else {
        policy
    };

    match candidates.best() {
        Some(url) => {
            info!(account, "Refreshing profile picture");
            download_profile_pic(session, store, account, url, bucket, effective, retry)
                .await?;
        }
        None => warn!(account, "No picture URL known, leaving cached copy"),
    }
    Ok(candidates.user_id)
}
