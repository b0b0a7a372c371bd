//! Error types for catalog indexing.

use thiserror::Error;

use super::source::SourceError;
use crate::catalog::StoreError;

/// Errors that end an indexing run.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A page fetch failed in a way retrying cannot fix.
    #[error("fetching catalog page {page} failed: {source}")]
    Fetch {
        /// Page being fetched.
        page: i64,
        /// Underlying fetch error.
        #[source]
        source: SourceError,
    },

    /// Transient fetch failures outlasted the retry policy.
    #[error("fetching catalog page {page} failed after {attempts} attempts: {source}")]
    FetchExhausted {
        /// Page being fetched.
        page: i64,
        /// Attempts made, including the first.
        attempts: u32,
        /// Last fetch error.
        #[source]
        source: SourceError,
    },
}
