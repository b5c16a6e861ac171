use clap::Parser;

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "instadl-rs",
    about = "Mirror Instagram accounts' media using a session cookie"
)]
pub struct Cli {
    /// Categories from the accounts file to process
    #[arg(value_name = "CATEGORY")]
    pub categories: Vec<String>,

    /// Folder to store downloaded media in
    #[arg(short = 'o', long, default_value = "media")]
    pub output: String,

    /// Chunk size for batched requests. Keep it low to avoid huge payloads,
    /// but not too low to avoid rate limiting.
    #[arg(short = 'l', long, default_value_t = 3)]
    pub download_limit: usize,

    /// JSON file holding session credentials and tracked accounts
    #[arg(short = 'f', long, default_value = "data/list.json")]
    pub input_file: String,

    /// Process every category in the accounts file
    #[arg(short = 'a', long)]
    pub all_categories: bool,

    /// Session credential (or a credential reference) to use directly.
    /// WARNING: visible in process listings; prefer the environment variable.
    #[arg(short = 'e', long, default_value = "", env = "INSTADL_SESSION_ID")]
    pub session_id: String,

    /// Account names to mirror with --session-id
    #[arg(short = 'u', long = "users", value_name = "USERNAME", num_args = 1..)]
    pub users: Vec<String>,

    /// Don't download stories
    #[arg(short = 's', long)]
    pub no_stories: bool,

    /// Don't download posts
    #[arg(short = 'p', long)]
    pub no_posts: bool,

    /// Don't download reels
    #[arg(short = 'r', long)]
    pub no_reels: bool,

    /// Don't download highlights
    #[arg(short = 'i', long)]
    pub no_highlights: bool,

    /// Download stories only
    #[arg(short = 'S', long, group = "only")]
    pub story_only: bool,

    /// Download posts only
    #[arg(short = 'P', long, group = "only")]
    pub posts_only: bool,

    /// Download reels only
    #[arg(short = 'R', long, group = "only")]
    pub reels_only: bool,

    /// Download highlights only
    #[arg(short = 'I', long, group = "only")]
    pub highlights_only: bool,

    /// Allow use of the OS proxy (bypassed by default)
    #[arg(short = 'x', long)]
    pub allow_proxy: bool,

    /// Seconds to wait between requests
    #[arg(short = 't', long, value_name = "SECONDS", default_value_t = 1)]
    pub sleep_time: u64,

    /// Don't download profile pictures
    #[arg(short = 'n', long)]
    pub no_profile_pics: bool,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_every_category() {
        let cli = Cli::try_parse_from(["instadl-rs", "FRIENDS"]).unwrap();
        assert_eq!(cli.categories, ["FRIENDS"]);
        assert_eq!(cli.output, "media");
        assert_eq!(cli.download_limit, 3);
        assert_eq!(cli.sleep_time, 1);
        assert!(!cli.no_stories && !cli.no_posts && !cli.no_reels && !cli.no_highlights);
        assert!(!cli.all_categories);
    }

    #[test]
    fn only_switches_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["instadl-rs", "--story-only", "--posts-only"]).is_err());
        assert!(Cli::try_parse_from(["instadl-rs", "--highlights-only"]).is_ok());
    }

    #[test]
    fn ad_hoc_pair_parses() {
        let cli = Cli::try_parse_from([
            "instadl-rs",
            "--session-id",
            "12345:abc",
            "--users",
            "amira",
            "badr",
        ])
        .unwrap();
        assert_eq!(cli.session_id, "12345:abc");
        assert_eq!(cli.users, ["amira", "badr"]);
    }
}
