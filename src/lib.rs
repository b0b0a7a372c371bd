//! Catalog Mirror Core Library
//!
//! Mirrors a paginated, newest-first remote catalog into a local SQLite
//! index, then downloads the referenced artifacts in bounded batches.
//!
//! # Architecture
//!
//! - [`db`] - Database connection and schema management
//! - [`catalog`] - Catalog items, the download state machine, and the crawler cursor
//! - [`indexer`] - Drift-correcting catalog walk
//! - [`download`] - Artifact client and concurrent download batches
//! - [`retry`] - Backoff policy for catalog fetches
//! - [`headers`] - Request header configuration for both HTTP clients

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod db;
pub mod download;
pub mod headers;
pub mod indexer;
pub mod retry;

// Re-export commonly used types
pub use catalog::{CatalogItem, CatalogStore, CrawlerCursor, DownloadOutcome, DownloadState, StoreError};
pub use db::Database;
pub use download::{BatchReport, DownloadBatcher, DownloadError, HttpClient, SessionReport};
pub use indexer::{CatalogIndexer, CatalogSource, HttpCatalogSource, IndexError, IndexReport};
pub use retry::{FailureType, RetryDecision, RetryPolicy};
