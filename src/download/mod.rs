//! Artifact downloads for indexed catalog items.
//!
//! [`HttpClient`] streams a single item to disk and verifies its size;
//! [`DownloadBatcher`] drives bounded batches of transfers and records each
//! outcome through the download state machine.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use catalog_mirror_core::catalog::CatalogStore;
//! use catalog_mirror_core::download::{DownloadBatcher, HttpClient};
//! use catalog_mirror_core::headers::{HttpTimeouts, RequestHeaders};
//! use catalog_mirror_core::Database;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = CatalogStore::new(Database::new(std::path::Path::new("catalog.db")).await?);
//! let base = url::Url::parse("https://catalog.example")?;
//! let client = HttpClient::new(base, &RequestHeaders::default(), HttpTimeouts::default())?;
//! let batcher = DownloadBatcher::new(store, Arc::new(client), "songs");
//! let session = batcher.run_until_drained(8, None).await?;
//! println!("completed {} items in {} batches", session.completed, session.batches);
//! # Ok(())
//! # }
//! ```

mod batcher;
mod client;
mod constants;
mod error;
mod filename;

pub use batcher::{BatchReport, DownloadBatcher, SessionReport};
pub use client::{HttpClient, ItemDownloader, check_integrity, declared_length, write_stream};
pub use constants::{DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE};
pub use error::{BatchError, DownloadError};
pub use filename::{filename_for_item, sanitize_filename};
