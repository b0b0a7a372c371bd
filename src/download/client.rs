//! HTTP client for downloading catalog artifacts.
//!
//! A transfer succeeds only when the bytes written to disk equal the
//! response's declared `content-length`. Any failure removes the partial file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use indicatif::ProgressBar;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, HeaderMap};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};
use url::Url;

use super::error::DownloadError;
use super::filename::filename_for_item;
use crate::catalog::CatalogItem;
use crate::headers::{ClientBuildError, HttpTimeouts, RequestHeaders, build_download_client};
use crate::indexer::source::join_base;

/// Transfers one item's artifact into a directory.
#[async_trait]
pub trait ItemDownloader: Send + Sync {
    /// Downloads `item` into `output_dir`, returning the verified byte count.
    async fn download_item(
        &self,
        item: &CatalogItem,
        output_dir: &Path,
        progress: &ProgressBar,
    ) -> Result<u64, DownloadError>;
}

/// HTTP client for artifact downloads with streaming support.
///
/// Created once per run and shared by every transfer of every batch, so the
/// connection pool is reused.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
}

impl HttpClient {
    /// Creates a client resolving download paths against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] if the HTTP client cannot be built.
    pub fn new(
        base_url: Url,
        headers: &RequestHeaders,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ClientBuildError> {
        Ok(Self::with_client(
            build_download_client(headers, timeouts)?,
            base_url,
        ))
    }

    /// Creates a client reusing an existing reqwest client.
    #[must_use]
    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Absolute URL of `item`'s artifact.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] if the path cannot be joined.
    pub fn item_url(&self, item: &CatalogItem) -> Result<Url, DownloadError> {
        join_base(&self.base_url, &item.download_url)
            .ok_or_else(|| DownloadError::invalid_url(item.download_url.clone()))
    }

    async fn transfer(
        &self,
        url: Url,
        file_path: &Path,
        progress: &ProgressBar,
    ) -> Result<u64, DownloadError> {
        let url_text = url.to_string();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::network(&url_text, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url_text, status.as_u16()));
        }

        let declared = declared_length(response.headers()).ok_or_else(|| {
            DownloadError::MissingContentLength {
                url: url_text.clone(),
                status: status.as_u16(),
            }
        })?;
        progress.set_length(declared);

        let file = File::create(file_path)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| DownloadError::network(&url_text, e)));
        let written = write_stream(file, stream, file_path, progress).await?;

        check_integrity(file_path, declared, written)?;
        Ok(written)
    }
}

#[async_trait]
impl ItemDownloader for HttpClient {
    #[instrument(skip(self, item, progress), fields(key = %item.key))]
    async fn download_item(
        &self,
        item: &CatalogItem,
        output_dir: &Path,
        progress: &ProgressBar,
    ) -> Result<u64, DownloadError> {
        let url = self.item_url(item)?;
        let file_path: PathBuf = output_dir.join(filename_for_item(item));
        debug!(url = %url, path = %file_path.display(), "starting download");

        let result = self.transfer(url, &file_path, progress).await;
        if result.is_err() {
            remove_partial(&file_path).await;
        }
        result
    }
}

/// Deletes a partially written file, logging when it cannot be removed.
async fn remove_partial(file_path: &Path) {
    match tokio::fs::remove_file(file_path).await {
        Ok(()) => debug!(path = %file_path.display(), "cleaned up partial file after error"),
        // Not every failure got as far as creating the file.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %file_path.display(), error = %e, "failed to remove partial file"),
    }
}

/// Reads the `content-length` header exactly as sent.
#[must_use]
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Streams chunks into `writer`, returning the number of bytes written.
///
/// # Errors
///
/// Returns the first stream error, or [`DownloadError::Io`] if a write fails.
pub async fn write_stream<W, S, B>(
    writer: W,
    mut stream: S,
    file_path: &Path,
    progress: &ProgressBar,
) -> Result<u64, DownloadError>
where
    W: AsyncWrite + Unpin,
    S: Stream<Item = Result<B, DownloadError>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut writer = BufWriter::new(writer);
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        writer
            .write_all(chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        let len = chunk.len() as u64;
        bytes_written += len;
        progress.inc(len);
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}

/// Compares the bytes written with the declared length.
///
/// # Errors
///
/// Returns [`DownloadError::SizeMismatch`] if they differ.
pub fn check_integrity(file_path: &Path, declared: u64, written: u64) -> Result<(), DownloadError> {
    if declared == written {
        Ok(())
    } else {
        Err(DownloadError::size_mismatch(file_path, declared, written))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::stream;
    use reqwest::header::HeaderValue;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::catalog::DownloadState;

    fn item(key: &str) -> CatalogItem {
        CatalogItem {
            id: 1,
            key: key.to_string(),
            title: "Song".to_string(),
            author_name: "Mapper".to_string(),
            download_url: format!("/cdn/{key}.zip"),
            state_code: DownloadState::Pending.as_i64(),
            attempts: 0,
            last_error: None,
            added_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn client_for(server: &MockServer) -> HttpClient {
        HttpClient::new(
            Url::parse(&server.uri()).unwrap(),
            &RequestHeaders::default(),
            HttpTimeouts::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_declared_length_parses_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_length(&headers), None);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1000"));
        assert_eq!(declared_length(&headers), Some(1000));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("lots"));
        assert_eq!(declared_length(&headers), None);
    }

    #[test]
    fn test_check_integrity() {
        let path = Path::new("a.zip");
        assert!(check_integrity(path, 1000, 1000).is_ok());

        let err = check_integrity(path, 1000, 999).unwrap_err();
        assert!(matches!(
            err,
            DownloadError::SizeMismatch {
                expected_bytes: 1000,
                actual_bytes: 999,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_write_stream_counts_bytes_and_advances_progress() {
        let chunks: Vec<Result<Vec<u8>, DownloadError>> =
            vec![Ok(vec![1; 400]), Ok(vec![2; 400]), Ok(vec![3; 199])];
        let progress = ProgressBar::hidden();
        let mut sink = Vec::new();

        let written = write_stream(&mut sink, stream::iter(chunks), Path::new("a"), &progress)
            .await
            .unwrap();

        assert_eq!(written, 999);
        assert_eq!(sink.len(), 999);
        assert_eq!(progress.position(), 999);
        assert!(check_integrity(Path::new("a"), 1000, written).is_err());
    }

    #[tokio::test]
    async fn test_write_stream_surfaces_stream_error() {
        let chunks: Vec<Result<Vec<u8>, DownloadError>> = vec![
            Ok(vec![0; 10]),
            Err(DownloadError::Timeout {
                url: "http://x".to_string(),
            }),
        ];
        let mut sink = Vec::new();

        let err = write_stream(&mut sink, stream::iter(chunks), Path::new("a"), &ProgressBar::hidden())
            .await
            .unwrap_err();

        assert!(err.reason().contains("request exception"));
    }

    #[tokio::test]
    async fn test_download_item_writes_named_file() {
        let server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();
        let body = vec![7u8; 1000];

        Mock::given(method("GET"))
            .and(path("/cdn/1a2b.zip"))
            .and(header("dnt", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let written = client_for(&server)
            .download_item(&item("1a2b"), temp_dir.path(), &ProgressBar::hidden())
            .await
            .unwrap();

        assert_eq!(written, 1000);
        let contents = std::fs::read(temp_dir.path().join("1a2b (Song - Mapper).zip")).unwrap();
        assert_eq!(contents, body);
    }

    #[tokio::test]
    async fn test_download_item_http_error_leaves_no_file() {
        let server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .download_item(&item("gone"), temp_dir.path(), &ProgressBar::hidden())
            .await
            .unwrap_err();

        assert!(err.reason().starts_with("HTTP 404"));
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert!(entries.is_empty(), "unexpected files: {entries:?}");
    }

    #[tokio::test]
    async fn test_download_item_missing_directory_is_io_error() {
        let server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 10]))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .download_item(
                &item("k"),
                &temp_dir.path().join("does-not-exist"),
                &ProgressBar::hidden(),
            )
            .await
            .unwrap_err();

        assert!(err.reason().contains("io error"), "got {err}");
    }

    #[test]
    fn test_item_url_joins_base_and_download_path() {
        let client = HttpClient::with_client(
            Client::new(),
            Url::parse("https://catalog.example").unwrap(),
        );
        assert_eq!(
            client.item_url(&item("ab")).unwrap().as_str(),
            "https://catalog.example/cdn/ab.zip"
        );
    }

    #[tokio::test]
    async fn test_remove_partial_deletes_file_and_tolerates_missing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("partial.zip");
        std::fs::write(&path, b"half").unwrap();

        remove_partial(&path).await;
        assert!(!path.exists());

        remove_partial(&path).await;
    }

    #[tokio::test]
    async fn test_remove_partial_survives_unremovable_path() {
        let temp_dir = TempDir::new().unwrap();
        let dir_path = temp_dir.path().join("not-a-file");
        std::fs::create_dir(&dir_path).unwrap();

        // remove_file refuses directories; the error is logged, not raised.
        remove_partial(&dir_path).await;
        assert!(dir_path.exists());
    }
}
