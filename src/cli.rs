//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use clap::builder::TypedValueParser;

/// Mirror a paginated remote catalog and download its artifacts.
///
/// Without flags the catalog is indexed into the local database. With
/// `--download`, eligible items are downloaded in batches until none remain.
#[derive(Parser, Debug)]
#[command(name = "catalog-mirror")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Index the catalog only (default mode)
    #[arg(long, conflicts_with = "download")]
    pub fetch: bool,

    /// Download eligible items instead of indexing
    #[arg(short, long)]
    pub download: bool,

    /// Directory downloaded files are written to
    #[arg(short, long, alias = "song-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// Base URL of the remote catalog
    #[arg(long, value_name = "URL")]
    pub catalog_url: Option<String>,

    /// Config file (default: $XDG_CONFIG_HOME/catalog-mirror/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Items per download batch (1-64)
    #[arg(short = 'b', long, value_parser = clap::value_parser!(u16).range(1..=64).map(usize::from))]
    pub batch_size: Option<usize>,

    /// Delay between catalog pages in milliseconds (max 60000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=60_000))]
    pub page_delay_ms: Option<u64>,

    /// Delay between download batches in milliseconds (max 600000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=600_000))]
    pub batch_delay_ms: Option<u64>,

    /// Attempts per catalog page before giving up (1-100)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub fetch_max_attempts: Option<u32>,

    /// Stop the download session after this many batches
    #[arg(long, requires = "download", value_parser = clap::value_parser!(u64).range(1..).map(|n| usize::try_from(n).unwrap_or(usize::MAX)))]
    pub max_batches: Option<usize>,
}
