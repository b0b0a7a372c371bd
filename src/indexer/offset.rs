//! Page offset tracking for a newest-first catalog.
//!
//! Items published ahead of the cursor push every older item further back,
//! so between two observations the cursor's logical position moves by
//! `current_total - initial_page_count` pages. The tracker adds that delta to
//! the last fetched page and re-anchors the baseline whenever it is non-zero,
//! so the same drift is never compensated twice.

use crate::catalog::CrawlerCursor;

/// Where to go next, and whether the drift baseline must move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageStep {
    /// Page the indexer should fetch next; negative means the catalog is covered.
    pub next_page: i64,
    /// New `initial_page_count` to persist, when drift was detected.
    pub reanchor: Option<i64>,
}

impl PageStep {
    /// Whether the walk has gone past page zero.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.next_page < 0
    }
}

/// `last_fetched_page + (current_total - initial_page_count)`.
#[must_use]
pub fn aligned_page(initial_page_count: i64, last_fetched_page: i64, current_total: i64) -> i64 {
    last_fetched_page.saturating_add(current_total.saturating_sub(initial_page_count))
}

fn reanchor_for(cursor: &CrawlerCursor, current_total: i64) -> Option<i64> {
    (current_total != cursor.initial_page_count).then_some(current_total)
}

/// Page to start from when a run begins.
///
/// Re-visits the last processed page at its shifted position; a cursor that
/// never processed a page starts at the catalog's last page.
#[must_use]
pub fn resume_step(cursor: &CrawlerCursor, current_total: i64) -> PageStep {
    let next_page = match cursor.last_fetched_page {
        Some(last) => aligned_page(cursor.initial_page_count, last, current_total),
        None => current_total,
    };
    PageStep {
        next_page,
        reanchor: reanchor_for(cursor, current_total),
    }
}

/// Page to fetch after `processed_page` was indexed and recorded in `cursor`.
///
/// If the aligned position of the page just processed is not the page the
/// indexer asked for, the catalog grew (or shrank) in the meantime.
#[must_use]
pub fn step_after(cursor: &CrawlerCursor, processed_page: i64, current_total: i64) -> PageStep {
    let last = cursor.last_fetched_page.unwrap_or(processed_page);
    let aligned = aligned_page(cursor.initial_page_count, last, current_total);
    PageStep {
        next_page: aligned.saturating_sub(1),
        reanchor: (aligned != processed_page).then_some(current_total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_page_is_deterministic() {
        for (initial, last, total) in [(100, 50, 105), (100, 0, 100), (10, 3, 7), (0, 0, 0)] {
            assert_eq!(
                aligned_page(initial, last, total),
                aligned_page(initial, last, total)
            );
        }
        assert_eq!(aligned_page(100, 50, 105), 55);
    }

    #[test]
    fn test_resume_without_drift_revisits_last_page() {
        let cursor = CrawlerCursor::new(100, Some(50));
        assert_eq!(
            resume_step(&cursor, 100),
            PageStep {
                next_page: 50,
                reanchor: None
            }
        );
    }

    #[test]
    fn test_resume_with_drift_shifts_and_reanchors() {
        let cursor = CrawlerCursor::new(100, Some(50));
        assert_eq!(
            resume_step(&cursor, 105),
            PageStep {
                next_page: 55,
                reanchor: Some(105)
            }
        );
    }

    #[test]
    fn test_resume_fresh_cursor_starts_at_last_page() {
        let cursor = CrawlerCursor::new(100, None);
        assert_eq!(resume_step(&cursor, 100).next_page, 100);
    }

    #[test]
    fn test_step_after_walks_toward_zero() {
        let cursor = CrawlerCursor::new(100, Some(100));
        let step = step_after(&cursor, 100, 100);
        assert_eq!(step.next_page, 99);
        assert_eq!(step.reanchor, None);
    }

    #[test]
    fn test_step_after_page_zero_is_exhausted() {
        let cursor = CrawlerCursor::new(100, Some(0));
        assert!(step_after(&cursor, 0, 100).is_exhausted());
    }

    #[test]
    fn test_step_after_drift_compensates_once() {
        let cursor = CrawlerCursor::new(100, Some(40));
        let step = step_after(&cursor, 40, 103);
        assert_eq!(step.next_page, 42);
        assert_eq!(step.reanchor, Some(103));

        let reanchored = CrawlerCursor::new(103, Some(42));
        let step = step_after(&reanchored, 42, 103);
        assert_eq!(step.next_page, 41);
        assert_eq!(step.reanchor, None);
    }

    #[test]
    fn test_shrinking_catalog_uses_same_formula() {
        let cursor = CrawlerCursor::new(100, Some(2));
        let step = step_after(&cursor, 2, 95);
        assert_eq!(step.next_page, -4);
        assert!(step.is_exhausted());
        assert_eq!(step.reanchor, Some(95));
    }
}
