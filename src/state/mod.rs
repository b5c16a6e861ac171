//! Persisted run state: the identity map and per-account history files.
//!
//! All state is flat JSON under the downloads root, shared with prior runs:
//! - `usernames.json` — numeric id to display name
//! - `{account}/meta/posts.json`, `reels.json` — append-merged histories
//! - `{account}/meta/story_{hour}.json` — per-fetch story snapshots
//! - `{account}/meta/highlights.json` — full snapshot, overwritten each run

pub mod error;
pub mod store;
pub mod types;

pub use error::StateError;
pub use store::{hour_bucket, HistoryKind, IdentityMap, StateStore};
pub use types::{HighlightCollection, ResolvedItem, TaggedUser};
