//! Download driver: fetches each resolved item's files into its owner's
//! folder, then fans copies out to tagged accounts. Strictly sequential —
//! one request in flight at a time.

pub mod error;
pub mod fanout;
pub mod fetch;
pub mod paths;

use std::fs;
use std::io::IsTerminal;

use anyhow::Context;
use indicatif::ProgressBar;
use tracing::debug;

pub use error::FetchError;
pub use fetch::{fetch, FetchOutcome};

use crate::instagram::Session;
use crate::retry::RetryConfig;
use crate::state::{IdentityMap, ResolvedItem, StateStore};

/// Tally of one download pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct DownloadStats {
    pub downloaded: u64,
    pub skipped: u64,
    pub gone: u64,
    pub failed: u64,
    pub fanned_out: u64,
}

impl DownloadStats {
    pub fn merge(&mut self, other: DownloadStats) {
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.gone += other.gone;
        self.failed += other.failed;
        self.fanned_out += other.fanned_out;
    }

    fn record(&mut self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Downloaded => self.downloaded += 1,
            FetchOutcome::SkippedExists => self.skipped += 1,
            FetchOutcome::SkippedGone => self.gone += 1,
            FetchOutcome::Failed => self.failed += 1,
        }
    }
}

/// Download every item in the list into `category` and fan out tagged
/// copies.
///
/// A hard fetch error (unexpected status, disk failure) propagates to the
/// caller and aborts the current account; exhausted retries and gone assets
/// are tallied and the pass continues.
pub async fn download_items(
    session: &dyn Session,
    store: &StateStore,
    identity: &IdentityMap,
    items: &[ResolvedItem],
    category: &str,
    retry: &RetryConfig,
    show_progress: bool,
) -> anyhow::Result<DownloadStats> {
    let bar = if show_progress && !items.is_empty() && std::io::stderr().is_terminal() {
        ProgressBar::new(items.len() as u64)
    } else {
        ProgressBar::hidden()
    };

    let mut stats = DownloadStats::default();
    for item in items {
        let owner = paths::owner_folder(item, identity);
        let item_paths = paths::item_paths(store.root(), &owner, category, item, false);
        bar.set_message(format!("{} for {}", item.id, owner.display()));

        for parent in [&item_paths.image, item_paths.video.as_ref().unwrap_or(&item_paths.image)]
            .iter()
            .filter_map(|p| p.parent())
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let captured_at = (item.taken_at > 0).then_some(item.taken_at);
        if let (Some(url), Some(dest)) = (item.video_url(), &item_paths.video) {
            stats.record(fetch(session, url, dest, captured_at, false, retry).await?);
        }
        stats.record(
            fetch(session, &item.image_url, &item_paths.image, captured_at, false, retry)
                .await?,
        );

        stats.fanned_out += fanout::distribute(store, identity, item, &item_paths, category)
            .context("fan-out copy failed")?;
        bar.inc(1);
    }
    bar.finish_and_clear();

    debug!(
        category,
        downloaded = stats.downloaded,
        skipped = stats.skipped,
        gone = stats.gone,
        failed = stats.failed,
        "Download pass complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instagram::IgSession;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item(server: &MockServer, id: &str) -> ResolvedItem {
        ResolvedItem {
            id: id.into(),
            parent: None,
            owner: "9".into(),
            owner_username: None,
            tagged_users: Vec::new(),
            image_url: format!("{}/{id}.jpg", server.uri()),
            video_url: None,
            besties_only: false,
            taken_at: 0,
        }
    }

    #[tokio::test]
    async fn second_pass_downloads_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
            .expect(2) // one per item, first pass only
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let identity: IdentityMap =
            [("9".to_string(), "amira".to_string())].into_iter().collect();
        let items = vec![item(&server, "1"), item(&server, "2")];
        let session = IgSession::new("sid", true).unwrap();
        let retry = RetryConfig {
            max_retries: 3,
            delay: Duration::ZERO,
        };

        let first = download_items(&session, &store, &identity, &items, "posts", &retry, false)
            .await
            .unwrap();
        assert_eq!(first.downloaded, 2);
        assert_eq!(first.skipped, 0);

        let second = download_items(&session, &store, &identity, &items, "posts", &retry, false)
            .await
            .unwrap();
        assert_eq!(second.downloaded, 0);
        assert_eq!(second.skipped, 2);
    }
}
