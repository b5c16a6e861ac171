//! Run configuration: the accounts file plus CLI resolution.
//!
//! The accounts file maps category names to a credential reference and a
//! list of account display names, next to a table of credential references.
//! Dangling references are configuration errors and abort the run before
//! any network activity.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use percent_encoding::percent_decode_str;
use serde::Deserialize;

use crate::cli::Cli;
use crate::retry::RetryConfig;
use crate::sync::SyncConfig;

/// One category: a credential reference plus the accounts to mirror.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryEntry {
    pub sessionid: String,
    #[serde(default)]
    pub users: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    categories: BTreeMap<String, CategoryEntry>,
    #[serde(default)]
    sessionids: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct Config {
    pub root: PathBuf,
    /// Category names selected for this run, in processing order.
    pub selected: Vec<String>,
    pub categories: BTreeMap<String, CategoryEntry>,
    credentials: BTreeMap<String, String>,
    pub bypass_proxy: bool,
    pub sync: SyncConfig,
}

impl Config {
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let (stories, posts, reels, highlights) = if cli.story_only {
            (true, false, false, false)
        } else if cli.posts_only {
            (false, true, false, false)
        } else if cli.reels_only {
            (false, false, true, false)
        } else if cli.highlights_only {
            (false, false, false, true)
        } else {
            (
                !cli.no_stories,
                !cli.no_posts,
                !cli.no_reels,
                !cli.no_highlights,
            )
        };

        let ad_hoc = !cli.session_id.is_empty() || !cli.users.is_empty();
        let (categories, credentials, selected) = if ad_hoc {
            if cli.all_categories {
                bail!("--all-categories cannot be combined with an ad-hoc session/users pair");
            }
            if cli.session_id.is_empty() || cli.users.is_empty() {
                bail!("--session-id and --users must be passed together");
            }

            // The value may be a credential reference from the accounts
            // file rather than a raw credential.
            let mut sessionid = cli.session_id.clone();
            if let Ok(file) = load_accounts_file(&cli.input_file) {
                if let Some(resolved) = file.sessionids.get(&sessionid) {
                    tracing::debug!("Session id resolved as a credential reference");
                    sessionid = resolved.clone();
                }
            }

            let categories = BTreeMap::from([(
                "passed".to_string(),
                CategoryEntry {
                    sessionid: "S".to_string(),
                    users: cli.users.clone(),
                },
            )]);
            let credentials = BTreeMap::from([("S".to_string(), sessionid)]);
            (categories, credentials, vec!["passed".to_string()])
        } else {
            let file = load_accounts_file(&cli.input_file)?;
            let selected = if cli.all_categories {
                file.categories.keys().cloned().collect()
            } else if cli.categories.is_empty() {
                bail!("no categories given; pass category names or --all-categories");
            } else {
                cli.categories.clone()
            };
            (file.categories, file.sessionids, selected)
        };

        for name in &selected {
            let entry = categories
                .get(name)
                .with_context(|| format!("category '{name}' not present in the accounts file"))?;
            if !credentials.contains_key(&entry.sessionid) {
                bail!(
                    "category '{name}' references unknown credential '{}'",
                    entry.sessionid
                );
            }
        }

        let sleep = Duration::from_secs(cli.sleep_time);
        Ok(Self {
            root: expand_tilde(&cli.output),
            selected,
            categories,
            credentials,
            bypass_proxy: !cli.allow_proxy,
            sync: SyncConfig {
                download_limit: cli.download_limit.max(1),
                sleep,
                stories,
                posts,
                reels,
                highlights,
                profile_pics: !cli.no_profile_pics,
                retry: RetryConfig {
                    delay: sleep,
                    ..RetryConfig::default()
                },
                show_progress: true,
            },
        })
    }

    /// The decoded credential for a category. References were validated at
    /// load time.
    pub fn credential(&self, category: &str) -> anyhow::Result<String> {
        let entry = self
            .categories
            .get(category)
            .with_context(|| format!("unknown category '{category}'"))?;
        let raw = self
            .credentials
            .get(&entry.sessionid)
            .with_context(|| format!("unknown credential reference '{}'", entry.sessionid))?;
        Ok(unquote_credential(raw))
    }
}

fn load_accounts_file(path: &str) -> anyhow::Result<AccountsFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to load accounts file {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("malformed accounts file {path}"))
}

/// Percent-decode a credential pasted straight from a browser cookie.
fn unquote_credential(raw: &str) -> String {
    if !raw.contains('%') {
        return raw.to_string();
    }
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
