//! Catalog item types and the download state machine.

use std::fmt;

use sqlx::FromRow;
use thiserror::Error;

/// Download state of a catalog item.
///
/// Stored as an integer column (`0`, `1`, `2`). `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadState {
    /// Discovered by the indexer, never attempted.
    Pending,
    /// Last attempt failed; still eligible for download.
    Failed,
    /// Downloaded and verified.
    Completed,
}

/// Result of one download attempt, as seen by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Bytes written matched the declared length.
    Success,
    /// Attempt failed; `reason` is persisted for diagnostics.
    Failure {
        /// Human-readable failure reason.
        reason: String,
    },
}

impl DownloadOutcome {
    /// Creates a failure outcome.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`DownloadOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Attempted to move an item out of a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition: item in state {from} cannot accept a download outcome")]
pub struct TransitionError {
    /// State the item was in.
    pub from: DownloadState,
}

impl DownloadState {
    /// Every state, in storage order.
    pub const ALL: [Self; 3] = [Self::Pending, Self::Failed, Self::Completed];

    /// Returns the database integer representation.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Failed => 1,
            Self::Completed => 2,
        }
    }

    /// Parses the database integer representation.
    #[must_use]
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Pending),
            1 => Some(Self::Failed),
            2 => Some(Self::Completed),
            _ => None,
        }
    }

    /// Returns the display label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    /// Whether the batcher may pick up an item in this state.
    #[must_use]
    pub fn is_eligible(self) -> bool {
        !self.is_terminal()
    }

    /// Whether no further transition is allowed.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// All states for which [`is_eligible`](Self::is_eligible) holds.
    #[must_use]
    pub fn eligible_states() -> Vec<Self> {
        Self::ALL.into_iter().filter(|s| s.is_eligible()).collect()
    }

    /// Applies a download outcome.
    ///
    /// `Pending|Failed --success--> Completed`, `Pending|Failed --failure--> Failed`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the item is already `Completed`.
    pub fn transition(self, outcome: &DownloadOutcome) -> Result<Self, TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError { from: self });
        }
        Ok(match outcome {
            DownloadOutcome::Success => Self::Completed,
            DownloadOutcome::Failure { .. } => Self::Failed,
        })
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Descriptor of a newly discovered item, borrowed from a catalog page.
#[derive(Debug, Clone, Copy)]
pub struct NewCatalogItem<'a> {
    /// Remote natural key.
    pub key: &'a str,
    /// Item title.
    pub title: &'a str,
    /// Item author.
    pub author_name: &'a str,
    /// Download path relative to the catalog base URL.
    pub download_url: &'a str,
}

/// A catalog item persisted in the store.
#[derive(Debug, Clone, FromRow)]
pub struct CatalogItem {
    /// Local surrogate identifier.
    pub id: i64,
    /// Remote natural key (unique).
    pub key: String,
    /// Item title.
    pub title: String,
    /// Item author.
    pub author_name: String,
    /// Download path relative to the catalog base URL.
    pub download_url: String,
    /// Raw state column, parsed via `state()`.
    #[sqlx(rename = "state")]
    pub state_code: i64,
    /// Download attempts recorded so far.
    pub attempts: i64,
    /// Reason of the most recent failure, cleared on success.
    pub last_error: Option<String>,
    /// When the item was discovered.
    pub added_at: String,
    /// When the item was last updated.
    pub updated_at: String,
}

impl CatalogItem {
    /// Returns the parsed download state.
    ///
    /// Falls back to `Pending` if the stored code is unknown; the schema's
    /// CHECK constraint keeps that from happening.
    #[must_use]
    pub fn state(&self) -> DownloadState {
        DownloadState::from_i64(self.state_code).unwrap_or(DownloadState::Pending)
    }

    /// Whether the batcher may pick up this item.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.state().is_eligible()
    }
}

impl fmt::Display for CatalogItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} - {}) [{}]",
            self.key,
            self.title,
            self.author_name,
            self.state()
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn item(state_code: i64) -> CatalogItem {
        CatalogItem {
            id: 1,
            key: "1a2b".to_string(),
            title: "Song".to_string(),
            author_name: "Mapper".to_string(),
            download_url: "/api/download/key/1a2b".to_string(),
            state_code,
            attempts: 0,
            last_error: None,
            added_at: "2026-01-01".to_string(),
            updated_at: "2026-01-01".to_string(),
        }
    }

    #[test]
    fn test_state_codes_roundtrip() {
        for state in DownloadState::ALL {
            assert_eq!(DownloadState::from_i64(state.as_i64()), Some(state));
        }
        assert_eq!(DownloadState::Pending.as_i64(), 0);
        assert_eq!(DownloadState::Failed.as_i64(), 1);
        assert_eq!(DownloadState::Completed.as_i64(), 2);
        assert_eq!(DownloadState::from_i64(3), None);
    }

    #[test]
    fn test_eligible_states_are_pending_and_failed() {
        assert_eq!(
            DownloadState::eligible_states(),
            vec![DownloadState::Pending, DownloadState::Failed]
        );
    }

    #[test]
    fn test_success_completes_from_any_eligible_state() {
        assert_eq!(
            DownloadState::Pending.transition(&DownloadOutcome::Success),
            Ok(DownloadState::Completed)
        );
        assert_eq!(
            DownloadState::Failed.transition(&DownloadOutcome::Success),
            Ok(DownloadState::Completed)
        );
    }

    #[test]
    fn test_failure_self_loops_on_failed() {
        let failure = DownloadOutcome::failure("size mismatch");
        assert_eq!(
            DownloadState::Pending.transition(&failure),
            Ok(DownloadState::Failed)
        );
        assert_eq!(
            DownloadState::Failed.transition(&failure),
            Ok(DownloadState::Failed)
        );
        assert!(DownloadState::Failed.is_eligible());
    }

    #[test]
    fn test_completed_rejects_every_outcome() {
        let err = DownloadState::Completed
            .transition(&DownloadOutcome::failure("boom"))
            .unwrap_err();
        assert_eq!(err.from, DownloadState::Completed);
        assert!(
            DownloadState::Completed
                .transition(&DownloadOutcome::Success)
                .is_err()
        );
        assert!(err.to_string().contains("completed"));
    }

    #[test]
    fn test_item_state_falls_back_to_pending() {
        assert_eq!(item(2).state(), DownloadState::Completed);
        assert_eq!(item(42).state(), DownloadState::Pending);
        assert!(!item(2).is_eligible());
    }

    #[test]
    fn test_item_display_mentions_key_and_state() {
        let display = item(1).to_string();
        assert!(display.contains("1a2b"));
        assert!(display.contains("failed"));
    }
}
