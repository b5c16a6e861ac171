//! Remote service access: transport seam, URL builders, feed walking, and
//! raw-record resolution.

pub mod endpoints;
pub mod error;
pub mod feed;
pub mod media;
pub mod session;

pub use error::ApiError;
pub use feed::{FeedClient, UserProfile};
pub use session::{IgSession, MediaResponse, Session};
