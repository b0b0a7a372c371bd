//! Catalog store: persisted catalog items and the crawler cursor.
//!
//! Every other component reads and mutates catalog state only through
//! [`CatalogStore`]. Writes are single-row statements committed immediately,
//! so a crash never leaves a half-applied batch behind.
//!
//! # Example
//!
//! ```ignore
//! use catalog_mirror_core::catalog::{CatalogStore, NewCatalogItem, DownloadOutcome};
//! use catalog_mirror_core::Database;
//!
//! let store = CatalogStore::new(Database::new_in_memory().await?);
//! store.insert_if_missing(&NewCatalogItem {
//!     key: "1a2b",
//!     title: "Song",
//!     author_name: "Mapper",
//!     download_url: "/api/download/key/1a2b",
//! }).await?;
//!
//! for item in store.select_eligible(8).await? {
//!     store.record_outcome(item.id, &DownloadOutcome::Success).await?;
//! }
//! ```

mod cursor;
mod error;
mod item;

pub use cursor::CrawlerCursor;
pub use error::{StoreDbErrorKind, StoreError};
pub use item::{CatalogItem, DownloadOutcome, DownloadState, NewCatalogItem, TransitionError};

use sqlx::Row;
use tracing::{debug, instrument};

use crate::db::Database;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Whether `insert_if_missing` created a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new `Pending` item was created with this id.
    Inserted(i64),
    /// The key was already known; nothing changed.
    AlreadyKnown,
}

impl InsertOutcome {
    /// Returns `true` when a row was created.
    #[must_use]
    pub fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// SQL fragment `state IN (..)` built from [`DownloadState::is_eligible`].
fn eligible_state_clause() -> String {
    let codes: Vec<String> = DownloadState::eligible_states()
        .into_iter()
        .map(|state| state.as_i64().to_string())
        .collect();
    format!("state IN ({})", codes.join(", "))
}

/// Handle to the persisted catalog.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    db: Database,
}

impl CatalogStore {
    /// Creates a store over the given database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts a `Pending` item unless its key is already known.
    ///
    /// Re-discovering an existing key performs no mutation at all.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    #[instrument(skip(self, item), fields(key = %item.key))]
    pub async fn insert_if_missing(&self, item: &NewCatalogItem<'_>) -> Result<InsertOutcome> {
        let row = sqlx::query(
            r"INSERT INTO catalog_items (key, title, author_name, download_url, state)
              VALUES (?, ?, ?, ?, ?)
              ON CONFLICT(key) DO NOTHING
              RETURNING id",
        )
        .bind(item.key)
        .bind(item.title)
        .bind(item.author_name)
        .bind(item.download_url)
        .bind(DownloadState::Pending.as_i64())
        .fetch_optional(self.db.pool())
        .await?;

        Ok(match row {
            Some(row) => InsertOutcome::Inserted(row.get("id")),
            None => InsertOutcome::AlreadyKnown,
        })
    }

    /// Gets an item by local id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<Option<CatalogItem>> {
        let item = sqlx::query_as::<_, CatalogItem>(r"SELECT * FROM catalog_items WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(item)
    }

    /// Gets an item by remote key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_by_key(&self, key: &str) -> Result<Option<CatalogItem>> {
        let item = sqlx::query_as::<_, CatalogItem>(r"SELECT * FROM catalog_items WHERE key = ?")
            .bind(key)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(item)
    }

    /// Counts all items.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn count_all(&self) -> Result<i64> {
        let row = sqlx::query(r"SELECT COUNT(*) AS count FROM catalog_items")
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.get("count"))
    }

    /// Counts items in one state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_by_state(&self, state: DownloadState) -> Result<i64> {
        let row = sqlx::query(r"SELECT COUNT(*) AS count FROM catalog_items WHERE state = ?")
            .bind(state.as_i64())
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.get("count"))
    }

    /// Counts items the batcher may still download.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_eligible(&self) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS count FROM catalog_items WHERE {}",
            eligible_state_clause()
        );
        let row = sqlx::query(&sql).fetch_one(self.db.pool()).await?;

        Ok(row.get("count"))
    }

    /// Selects up to `limit` eligible items, most recently discovered first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn select_eligible(&self, limit: usize) -> Result<Vec<CatalogItem>> {
        let sql = format!(
            "SELECT * FROM catalog_items WHERE {} ORDER BY id DESC LIMIT ?",
            eligible_state_clause()
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let items = sqlx::query_as::<_, CatalogItem>(&sql)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;

        Ok(items)
    }

    /// Applies a download outcome to one item and commits it immediately.
    ///
    /// The UPDATE is guarded on the item still being eligible, so a
    /// `Completed` row can never be reverted, even by a racing writer.
    ///
    /// # Returns
    ///
    /// The item's new state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ItemNotFound`] if no item has this id,
    /// [`StoreError::IllegalTransition`] if the item is already `Completed`,
    /// or [`StoreError::Database`] if the update fails.
    #[instrument(skip(self, outcome), fields(success = outcome.is_success()))]
    pub async fn record_outcome(&self, id: i64, outcome: &DownloadOutcome) -> Result<DownloadState> {
        let current = self.get(id).await?.ok_or(StoreError::ItemNotFound(id))?;
        let next = current
            .state()
            .transition(outcome)
            .map_err(|source| StoreError::IllegalTransition { id, source })?;

        let last_error = match outcome {
            DownloadOutcome::Success => None,
            DownloadOutcome::Failure { reason } => Some(reason.as_str()),
        };
        let sql = format!(
            "UPDATE catalog_items
             SET state = ?, attempts = attempts + 1, last_error = ?, updated_at = datetime('now')
             WHERE id = ? AND {}",
            eligible_state_clause()
        );
        let result = sqlx::query(&sql)
            .bind(next.as_i64())
            .bind(last_error)
            .bind(id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::IllegalTransition {
                id,
                source: TransitionError {
                    from: DownloadState::Completed,
                },
            });
        }

        debug!(id, from = %current.state(), to = %next, "recorded download outcome");
        Ok(next)
    }

    /// Reads the crawler cursor, if it has been created.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn cursor(&self) -> Result<Option<CrawlerCursor>> {
        let cursor = sqlx::query_as::<_, CrawlerCursor>(
            r"SELECT initial_page_count, last_fetched_page, updated_at
              FROM crawler_cursor WHERE id = 1",
        )
        .fetch_optional(self.db.pool())
        .await?;

        Ok(cursor)
    }

    /// Creates the cursor seeded with the catalog's current page count.
    ///
    /// A no-op when the cursor already exists; the stored cursor is returned
    /// either way.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    #[instrument(skip(self))]
    pub async fn create_cursor(&self, initial_page_count: i64) -> Result<CrawlerCursor> {
        sqlx::query(
            r"INSERT INTO crawler_cursor (id, initial_page_count, last_fetched_page)
              VALUES (1, ?, NULL)
              ON CONFLICT(id) DO NOTHING",
        )
        .bind(initial_page_count)
        .execute(self.db.pool())
        .await?;

        self.cursor().await?.ok_or(StoreError::CursorMissing)
    }

    /// Records the last successfully indexed page.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CursorMissing`] if the cursor was never created,
    /// or [`StoreError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn set_last_fetched_page(&self, page: i64) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE crawler_cursor
              SET last_fetched_page = ?, updated_at = datetime('now')
              WHERE id = 1",
        )
        .bind(page)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::CursorMissing);
        }
        Ok(())
    }

    /// Re-anchors the drift baseline. Never touches `last_fetched_page`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CursorMissing`] if the cursor was never created,
    /// or [`StoreError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn reanchor_cursor(&self, initial_page_count: i64) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE crawler_cursor
              SET initial_page_count = ?, updated_at = datetime('now')
              WHERE id = 1",
        )
        .bind(initial_page_count)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::CursorMissing);
        }
        Ok(())
    }
}
