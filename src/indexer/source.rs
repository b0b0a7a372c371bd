//! Catalog page fetching.
//!
//! [`CatalogSource`] is the seam between the indexer and the remote listing
//! API; [`HttpCatalogSource`] is the reqwest implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::catalog::NewCatalogItem;
use crate::headers::{ClientBuildError, HttpTimeouts, RequestHeaders, build_client};
use crate::retry::{FailureType, classify_http_status};

/// One page of the `maps/latest` listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogPage {
    /// Items on this page, newest first.
    pub docs: Vec<CatalogDoc>,
    /// Index of the last page the catalog currently has.
    #[serde(rename = "lastPage")]
    pub last_page: i64,
}

/// An item descriptor as served by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogDoc {
    /// Remote natural key.
    pub key: String,
    /// Descriptive metadata.
    pub metadata: DocMetadata,
    /// Download path relative to the catalog base URL.
    #[serde(rename = "directDownload")]
    pub direct_download: String,
}

/// Metadata block of a [`CatalogDoc`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocMetadata {
    /// Item title.
    #[serde(rename = "songName")]
    pub song_name: String,
    /// Item author.
    #[serde(rename = "levelAuthorName")]
    pub level_author_name: String,
}

impl CatalogDoc {
    /// Borrows this descriptor as a store insertion.
    #[must_use]
    pub fn as_new_item(&self) -> NewCatalogItem<'_> {
        NewCatalogItem {
            key: &self.key,
            title: &self.metadata.song_name,
            author_name: &self.metadata.level_author_name,
            download_url: &self.direct_download,
        }
    }
}

/// Errors fetching a catalog page.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Connection, DNS or TLS failure.
    #[error("network error fetching {url}: {source}")]
    Network {
        /// Requested URL.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The request timed out.
    #[error("timeout fetching {url}")]
    Timeout {
        /// Requested URL.
        url: String,
    },

    /// Non-success HTTP status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// The body was not the expected JSON shape.
    #[error("malformed catalog response from {url}: {source}")]
    Malformed {
        /// Requested URL.
        url: String,
        /// JSON decoding error.
        #[source]
        source: serde_json::Error,
    },

    /// The page URL could not be built.
    #[error("invalid catalog URL: {url}")]
    InvalidUrl {
        /// Offending URL text.
        url: String,
    },
}

impl SourceError {
    fn from_transport(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                source,
            }
        }
    }

    /// Retry classification for this error.
    #[must_use]
    pub fn failure_type(&self) -> FailureType {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => FailureType::Transient,
            Self::HttpStatus { status, .. } => classify_http_status(*status),
            Self::Malformed { .. } | Self::InvalidUrl { .. } => FailureType::Permanent,
        }
    }
}

/// Supplier of catalog pages.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetches page `page` (0 = newest items).
    async fn fetch_page(&self, page: i64) -> Result<CatalogPage, SourceError>;
}

/// Catalog source backed by the remote HTTP listing API.
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    client: Client,
    base_url: Url,
}

impl HttpCatalogSource {
    /// Creates a source for the catalog rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] if the HTTP client cannot be built.
    pub fn new(
        base_url: Url,
        headers: &RequestHeaders,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ClientBuildError> {
        Ok(Self::with_client(build_client(headers, timeouts)?, base_url))
    }

    /// Creates a source reusing an existing client.
    #[must_use]
    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// URL of listing page `page`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidUrl`] if the URL cannot be joined.
    pub fn page_url(&self, page: i64) -> Result<Url, SourceError> {
        let path = format!("api/maps/latest/{page}");
        join_base(&self.base_url, &path).ok_or(SourceError::InvalidUrl { url: path })
    }
}

/// Joins `path` under `base`, treating `base` as a directory.
pub(crate) fn join_base(base: &Url, path: &str) -> Option<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path.trim_start_matches('/')).ok()
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    #[instrument(skip(self))]
    async fn fetch_page(&self, page: i64) -> Result<CatalogPage, SourceError> {
        let url = self.page_url(page)?;
        let url_text = url.to_string();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::from_transport(&url_text, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                url: url_text,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::from_transport(&url_text, e))?;
        let parsed: CatalogPage =
            serde_json::from_str(&body).map_err(|source| SourceError::Malformed {
                url: url_text.clone(),
                source,
            })?;

        debug!(page, docs = parsed.docs.len(), last_page = parsed.last_page, "fetched catalog page");
        Ok(parsed)
    }
}
