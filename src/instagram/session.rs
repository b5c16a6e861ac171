//! HTTP transport seam.
//!
//! The engine talks to the remote service through the [`Session`] trait so
//! that the feed walker and the retrieval engine can be exercised against a
//! mock server. The concrete [`IgSession`] wraps a `reqwest` client with the
//! session cookie pre-attached to the service domain.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

use super::endpoints;
use super::error::ApiError;

/// A media GET with the body left as a stream; status is surfaced raw so the
/// retrieval engine can classify 2xx / 404 / 410 / 5xx / other itself.
pub struct MediaResponse {
    pub status: u16,
    pub body: BoxStream<'static, std::io::Result<bytes::Bytes>>,
}

#[async_trait]
pub trait Session: Send + Sync {
    /// GET a JSON endpoint. Non-2xx statuses become [`ApiError::Status`].
    async fn get_json(&self, url: &str) -> Result<Value, ApiError>;

    /// GET a media URL, returning the raw status and a streaming body.
    async fn get_media(&self, url: &str) -> Result<MediaResponse, ApiError>;
}

/// Authenticated session against the live service.
pub struct IgSession {
    client: reqwest::Client,
}

impl IgSession {
    /// Build a client carrying the session cookie and the app-id header.
    ///
    /// `bypass_proxy` disables any OS-level proxy for this client, the
    /// default stance since most proxies trip the remote's bot checks.
    pub fn new(sessionid: &str, bypass_proxy: bool) -> anyhow::Result<Self> {
        let jar = reqwest::cookie::Jar::default();
        let origin: reqwest::Url = "https://instagram.com".parse()?;
        jar.add_cookie_str(
            &format!("sessionid={sessionid}; Domain=.instagram.com; Path=/"),
            &origin,
        );

        let mut headers = HeaderMap::new();
        headers.insert("x-ig-app-id", HeaderValue::from_static(endpoints::APP_ID));

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_provider(Arc::new(jar));
        if bypass_proxy {
            builder = builder.no_proxy();
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Session for IgSession {
    async fn get_json(&self, url: &str) -> Result<Value, ApiError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp.json().await?)
    }

    async fn get_media(&self, url: &str) -> Result<MediaResponse, ApiError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status().as_u16();
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other))
            .boxed();
        Ok(MediaResponse { status, body })
    }
}
