//! Static request header configuration shared by the catalog and download clients.
//!
//! The catalog answers 403 to requests that do not look like a browser, so both
//! HTTP clients are built from one [`RequestHeaders`] value instead of hidden
//! per-client constants.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

/// Default HTTP connect timeout (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

/// Browser User-Agent sent by default.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/75.0.3770.142 Safari/537.36";

const BROWSER_HEADERS: [(&str, &str); 8] = [
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
    ),
    (
        "accept-language",
        "en-US,en;q=0.9,de-DE;q=0.8,de;q=0.7,ja-JP;q=0.6,ja;q=0.5,en-GB;q=0.4",
    ),
    ("cache-control", "max-age=0"),
    ("dnt", "1"),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
    ("upgrade-insecure-requests", "1"),
];

/// A header name or value could not be encoded.
#[derive(Debug, Error)]
#[error("invalid request header '{name}'")]
pub struct InvalidHeader {
    /// Offending header name.
    pub name: String,
}

/// Headers attached to every catalog and download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeaders {
    user_agent: String,
    extra: Vec<(String, String)>,
}

impl Default for RequestHeaders {
    fn default() -> Self {
        Self::browser()
    }
}

impl RequestHeaders {
    /// Browser-like headers the catalog accepts.
    #[must_use]
    pub fn browser() -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            extra: BROWSER_HEADERS
                .iter()
                .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
                .collect(),
        }
    }

    /// Replaces the User-Agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Returns the configured User-Agent.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Encodes the configured headers (User-Agent excluded).
    ///
    /// # Errors
    ///
    /// Returns [`InvalidHeader`] if a name or value is not valid HTTP.
    pub fn to_header_map(&self) -> Result<HeaderMap, InvalidHeader> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.extra {
            let invalid = || InvalidHeader { name: name.clone() };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

/// Connect/read timeouts for an HTTP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// Connect timeout in seconds.
    pub connect_secs: u64,
    /// Read timeout in seconds.
    pub read_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_secs: DEFAULT_READ_TIMEOUT_SECS,
        }
    }
}

/// Errors building a reqwest client.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    /// Header configuration was invalid.
    #[error(transparent)]
    Header(#[from] InvalidHeader),
    /// reqwest rejected the configuration.
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

fn client_builder(
    headers: &RequestHeaders,
    timeouts: HttpTimeouts,
) -> Result<ClientBuilder, InvalidHeader> {
    Ok(Client::builder()
        .user_agent(headers.user_agent())
        .default_headers(headers.to_header_map()?)
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .read_timeout(Duration::from_secs(timeouts.read_secs)))
}

/// Builds the catalog API client carrying `headers` on every request.
///
/// # Errors
///
/// Returns [`ClientBuildError`] if the headers are invalid or the builder fails.
pub fn build_client(
    headers: &RequestHeaders,
    timeouts: HttpTimeouts,
) -> Result<Client, ClientBuildError> {
    Ok(client_builder(headers, timeouts)?.build()?)
}

/// Builds the artifact download client.
///
/// Transparent decompression is off: the integrity check compares bytes on
/// disk with the declared `content-length`, which counts encoded bytes.
///
/// # Errors
///
/// Returns [`ClientBuildError`] if the headers are invalid or the builder fails.
pub fn build_download_client(
    headers: &RequestHeaders,
    timeouts: HttpTimeouts,
) -> Result<Client, ClientBuildError> {
    Ok(client_builder(headers, timeouts)?.no_gzip().build()?)
}
