//! Constants for the download module (batching, pacing).

use std::time::Duration;

/// Default number of items per batch, which is also the number of parallel transfers.
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Default pause between two batches.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(5);

/// Progress bar template for a single transfer.
pub const PROGRESS_TEMPLATE: &str =
    "{msg:40!} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})";
