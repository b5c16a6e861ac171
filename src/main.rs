//! instadl-rs — incremental mirror of Instagram accounts' media.
//!
//! Authenticates with a previously-obtained session cookie, then walks each
//! configured account's stories, posts, reels, and highlights, stopping at
//! the previously recorded history boundary. Downloads are idempotent and
//! the on-disk layout is shared with prior runs.

#![warn(clippy::all)]

mod cli;
mod config;
mod download;
mod instagram;
mod profile_pics;
mod retry;
mod state;
mod sync;
mod types;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let filter = match cli.log_level {
        types::LogLevel::Debug => "debug",
        types::LogLevel::Info => "info",
        types::LogLevel::Warn => "warn",
        types::LogLevel::Error => "error",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = config::Config::from_cli(cli)?;
    std::fs::create_dir_all(&config.root)?;
    let store = state::StateStore::new(&config.root);

    for category in &config.selected {
        let users = match config.categories.get(category) {
            Some(entry) => entry.users.clone(),
            None => anyhow::bail!("category '{category}' vanished from the configuration"),
        };
        let sessionid = config.credential(category)?;
        let session = instagram::IgSession::new(&sessionid, config.bypass_proxy)?;
        let feed = instagram::FeedClient::new(&session, config.sync.sleep);

        tracing::info!(category, accounts = users.len(), "Processing category");
        let stats = sync::sync_category(&feed, &session, &store, &users, &config.sync).await?;
        tracing::info!(
            category,
            new_items = stats.new_items,
            downloaded = stats.downloads.downloaded,
            skipped = stats.downloads.skipped,
            gone = stats.downloads.gone,
            failed = stats.downloads.failed,
            fanned_out = stats.downloads.fanned_out,
            pruned_accounts = stats.pruned_accounts,
            failed_accounts = stats.failed_accounts,
            "Category complete"
        );
    }

    Ok(())
}
