//! Catalog indexer: walks the remote listing from the oldest page toward the
//! newest, inserting unknown items and keeping the crawler cursor aligned.
//!
//! # Flow
//!
//! ```text
//! run()
//!   ├── fetch page 0 ──► lastPage
//!   ├── create cursor (first run) or resume at the aligned page
//!   └── loop while next >= 0
//!         index(next)
//!           ├── fetch page (retrying transient failures)
//!           ├── insert_if_missing for every doc
//!           ├── last_fetched_page = page
//!           └── step_after ──► next page, re-anchor on drift
//! ```

mod error;
pub mod offset;
pub mod source;

pub use error::IndexError;
pub use offset::{PageStep, aligned_page, resume_step, step_after};
pub use source::{CatalogDoc, CatalogPage, CatalogSource, DocMetadata, HttpCatalogSource, SourceError};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::catalog::{CatalogStore, StoreError};
use crate::retry::{RetryDecision, RetryPolicy};

/// Default pause between catalog page fetches.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(2);

/// What indexing one page did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageReport {
    /// Page that was indexed.
    pub page: i64,
    /// Items inserted as new `Pending` rows.
    pub inserted: usize,
    /// Items whose key was already stored.
    pub known: usize,
    /// Next page to index; negative once the catalog is covered.
    pub next_page: i64,
    /// Whether the cursor baseline was re-anchored.
    pub reanchored: bool,
}

/// Totals for one indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Pages indexed, counting re-visits.
    pub pages_indexed: usize,
    /// Items inserted.
    pub inserted: usize,
    /// Items already known.
    pub known: usize,
    /// Times the cursor was re-anchored, including on resume.
    pub drift_corrections: usize,
}

impl IndexReport {
    fn absorb(&mut self, page: &PageReport) {
        self.pages_indexed += 1;
        self.inserted += page.inserted;
        self.known += page.known;
        if page.reanchored {
            self.drift_corrections += 1;
        }
    }
}

/// Mirrors the remote catalog's metadata into the [`CatalogStore`].
pub struct CatalogIndexer {
    store: CatalogStore,
    source: Arc<dyn CatalogSource>,
    retry: RetryPolicy,
    page_delay: Duration,
}

impl std::fmt::Debug for CatalogIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogIndexer")
            .field("retry", &self.retry)
            .field("page_delay", &self.page_delay)
            .finish_non_exhaustive()
    }
}

impl CatalogIndexer {
    /// Creates an indexer with the default retry policy and page delay.
    #[must_use]
    pub fn new(store: CatalogStore, source: Arc<dyn CatalogSource>) -> Self {
        Self {
            store,
            source,
            retry: RetryPolicy::default(),
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    /// Replaces the fetch retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the pause between page fetches.
    #[must_use]
    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Indexes the catalog until every page has been visited.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] on store failures, permanent fetch failures or
    /// once transient fetch failures exhaust the retry policy.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<IndexReport, IndexError> {
        let mut report = IndexReport::default();

        let start = self.start_page().await?;
        if start.reanchor.is_some() {
            report.drift_corrections += 1;
        }

        let mut next = start.next_page;
        while next >= 0 {
            let page = self.index(next).await?;
            report.absorb(&page);
            next = page.next_page;

            if next >= 0 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        info!(
            pages = report.pages_indexed,
            inserted = report.inserted,
            known = report.known,
            drift_corrections = report.drift_corrections,
            "catalog indexed"
        );
        Ok(report)
    }

    /// Works out where this run starts, creating or re-anchoring the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the probe fetch or a store operation fails.
    #[instrument(skip(self))]
    pub async fn start_page(&self) -> Result<PageStep, IndexError> {
        let probe = self.fetch_with_retry(0).await?;
        let current_total = probe.last_page;

        let cursor = match self.store.cursor().await? {
            Some(cursor) => cursor,
            None => {
                info!(initial_page_count = current_total, "creating crawler cursor");
                self.store.create_cursor(current_total).await?
            }
        };

        let step = resume_step(&cursor, current_total);
        if let Some(initial) = step.reanchor {
            info!(
                from = cursor.initial_page_count,
                to = initial,
                "catalog grew since last run, re-anchoring cursor"
            );
            self.store.reanchor_cursor(initial).await?;
        }

        info!(
            start_page = step.next_page,
            last_page = current_total,
            last_fetched_page = cursor.last_fetched_page,
            "resuming catalog walk"
        );
        Ok(step)
    }

    /// Indexes one page and advances the cursor.
    ///
    /// Re-indexing a page only re-records the cursor; known keys are never
    /// modified.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the fetch or a store operation fails.
    #[instrument(skip(self))]
    pub async fn index(&self, page: i64) -> Result<PageReport, IndexError> {
        let fetched = self.fetch_with_retry(page).await?;

        let mut inserted = 0;
        let mut known = 0;
        for doc in &fetched.docs {
            if self.store.insert_if_missing(&doc.as_new_item()).await?.is_inserted() {
                debug!(key = %doc.key, title = %doc.metadata.song_name, "adding new item");
                inserted += 1;
            } else {
                debug!(key = %doc.key, "item exists");
                known += 1;
            }
        }

        self.store.set_last_fetched_page(page).await?;
        let cursor = self.store.cursor().await?.ok_or(StoreError::CursorMissing)?;

        let step = step_after(&cursor, page, fetched.last_page);
        if let Some(initial) = step.reanchor {
            info!(
                page,
                from = cursor.initial_page_count,
                to = initial,
                "catalog drift detected, re-anchoring cursor"
            );
            self.store.reanchor_cursor(initial).await?;
        }

        info!(page, inserted, known, next_page = step.next_page, "indexed page");
        Ok(PageReport {
            page,
            inserted,
            known,
            next_page: step.next_page,
            reanchored: step.reanchor.is_some(),
        })
    }

    async fn fetch_with_retry(&self, page: i64) -> Result<CatalogPage, IndexError> {
        let mut attempt = 1;
        loop {
            let error = match self.source.fetch_page(page).await {
                Ok(fetched) => return Ok(fetched),
                Err(error) => error,
            };

            match self.retry.should_retry(error.failure_type(), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    warn!(page, attempt, error = %error, delay_ms = delay.as_millis(), "catalog fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    warn!(page, attempt, error = %error, %reason, "giving up on catalog page");
                    return Err(if attempt >= self.retry.max_attempts() {
                        IndexError::FetchExhausted {
                            page,
                            attempts: attempt,
                            source: error,
                        }
                    } else {
                        IndexError::Fetch {
                            page,
                            source: error,
                        }
                    });
                }
            }
        }
    }
}
