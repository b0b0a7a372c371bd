//! Bounded-concurrency download batches over eligible catalog items.
//!
//! Each batch selects up to `n` eligible items (newest first), runs one task
//! per item in a [`JoinSet`], and commits every outcome as its task finishes.
//! Batches run strictly one after another.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use super::client::ItemDownloader;
use super::constants::{DEFAULT_BATCH_DELAY, PROGRESS_TEMPLATE};
use super::error::{BatchError, DownloadError};
use crate::catalog::{CatalogItem, CatalogStore, DownloadOutcome, StoreError};

/// Outcome counts of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Items selected and handed to a transfer task.
    pub attempted: usize,
    /// Items committed as `Completed`.
    pub completed: usize,
    /// Items committed as `Failed`.
    pub failed: usize,
    /// Items whose outcome was not recorded: the task panicked, or the item
    /// was already `Completed` when its outcome arrived.
    pub skipped: usize,
}

/// Accumulated counts over a download session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Batches run.
    pub batches: usize,
    /// Items completed across all batches.
    pub completed: usize,
    /// Failed attempts across all batches.
    pub failed: usize,
    /// Attempts whose outcome was not recorded.
    pub skipped: usize,
}

impl SessionReport {
    fn absorb(&mut self, batch: BatchReport) {
        self.batches += 1;
        self.completed += batch.completed;
        self.failed += batch.failed;
        self.skipped += batch.skipped;
    }
}

/// How one transfer result landed in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Committed {
    Completed,
    Failed,
    Discarded,
}

/// Drains eligible items from the store onto disk.
pub struct DownloadBatcher {
    store: CatalogStore,
    downloader: Arc<dyn ItemDownloader>,
    output_dir: PathBuf,
    batch_delay: Duration,
    progress: MultiProgress,
}

impl std::fmt::Debug for DownloadBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadBatcher")
            .field("output_dir", &self.output_dir)
            .field("batch_delay", &self.batch_delay)
            .finish_non_exhaustive()
    }
}

impl DownloadBatcher {
    /// Creates a batcher writing into `output_dir`, with progress bars hidden.
    #[must_use]
    pub fn new(
        store: CatalogStore,
        downloader: Arc<dyn ItemDownloader>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            downloader,
            output_dir: output_dir.into(),
            batch_delay: DEFAULT_BATCH_DELAY,
            progress: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        }
    }

    /// Replaces the pause between batches.
    #[must_use]
    pub fn with_batch_delay(mut self, batch_delay: Duration) -> Self {
        self.batch_delay = batch_delay;
        self
    }

    /// Draws per-transfer progress bars on `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: MultiProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Downloads up to `n` eligible items in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError`] if the output directory cannot be created or a
    /// store operation fails. Outcomes committed before the error are kept.
    #[instrument(skip(self))]
    pub async fn run_batch(&self, n: usize) -> Result<BatchReport, BatchError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| BatchError::OutputDir {
                path: self.output_dir.clone(),
                source,
            })?;

        let items = self.store.select_eligible(n).await?;
        let mut report = BatchReport {
            attempted: items.len(),
            ..BatchReport::default()
        };

        let mut tasks = JoinSet::new();
        for item in items {
            let downloader = Arc::clone(&self.downloader);
            let output_dir = self.output_dir.clone();
            let bar = self.progress.add(progress_bar(&item));
            tasks.spawn(async move {
                let result = downloader.download_item(&item, &output_dir, &bar).await;
                bar.finish_and_clear();
                (item, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (item, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!(error = %e, "download task panicked");
                    report.skipped += 1;
                    continue;
                }
            };
            match self.commit(&item, result).await? {
                Committed::Completed => report.completed += 1,
                Committed::Failed => report.failed += 1,
                Committed::Discarded => report.skipped += 1,
            }
        }

        Ok(report)
    }

    /// Commits one transfer result.
    async fn commit(
        &self,
        item: &CatalogItem,
        result: Result<u64, DownloadError>,
    ) -> Result<Committed, BatchError> {
        let outcome = match &result {
            Ok(bytes) => {
                info!(key = %item.key, title = %item.title, bytes, "successfully downloaded");
                DownloadOutcome::Success
            }
            Err(e) => {
                let reason = e.reason();
                warn!(key = %item.key, title = %item.title, %reason, "failed to download");
                DownloadOutcome::failure(reason)
            }
        };

        match self.store.record_outcome(item.id, &outcome).await {
            Ok(_) if outcome.is_success() => Ok(Committed::Completed),
            Ok(_) => Ok(Committed::Failed),
            Err(StoreError::IllegalTransition { id, .. }) => {
                warn!(id, key = %item.key, "item completed elsewhere, outcome discarded");
                Ok(Committed::Discarded)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Runs batches of at most `n` items until nothing is eligible.
    ///
    /// Items that keep failing stay eligible and are retried every batch;
    /// `max_batches` bounds the session.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError`] from the first failing batch.
    #[instrument(skip(self))]
    pub async fn run_until_drained(
        &self,
        n: usize,
        max_batches: Option<usize>,
    ) -> Result<SessionReport, BatchError> {
        let mut session = SessionReport::default();

        loop {
            if max_batches.is_some_and(|max| session.batches >= max) {
                info!(batches = session.batches, "batch limit reached");
                break;
            }

            let remaining = usize::try_from(self.store.count_eligible().await?).unwrap_or(0);
            let batch_size = n.min(remaining);
            if batch_size == 0 {
                break;
            }

            if session.batches > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            let batch = self.run_batch(batch_size).await?;
            session.absorb(batch);
            info!(
                size = batch_size,
                completed = batch.completed,
                failed = batch.failed,
                skipped = batch.skipped,
                session_total = session.completed,
                "batch completed"
            );
        }

        info!(
            batches = session.batches,
            completed = session.completed,
            failed = session.failed,
            skipped = session.skipped,
            "download session finished"
        );
        Ok(session)
    }
}

fn progress_bar(item: &CatalogItem) -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.set_message(format!("{} {}", item.key, item.title));
    bar
}
