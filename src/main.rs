//! CLI entry point for catalog-mirror.

use std::io::{self, IsTerminal};
use std::sync::Arc;

use anyhow::{Context, Result};
use catalog_mirror_core::catalog::CatalogStore;
use catalog_mirror_core::download::{DownloadBatcher, HttpClient};
use catalog_mirror_core::indexer::{CatalogIndexer, HttpCatalogSource};
use catalog_mirror_core::retry::RetryPolicy;
use catalog_mirror_core::Database;
use clap::Parser;
use indicatif::MultiProgress;
use tracing::{debug, info};

mod cli;
mod config;
mod terminal;

use cli::Args;
use config::{Settings, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let loaded = load_config(args.config.as_deref())?;
    let settings = Settings::resolve(&args, loaded.config.as_ref())?;

    let no_color = terminal::no_color_env_requested() || terminal::is_dumb_terminal();
    terminal::init_tracing(
        terminal::default_log_level(args.quiet, args.verbose, settings.verbosity),
        no_color,
    );
    debug!(?args, config = ?loaded.path, "CLI arguments parsed");

    tokio::fs::create_dir_all(&settings.output_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create output directory '{}'",
                settings.output_dir.display()
            )
        })?;

    let db = Database::new(&settings.database).await.with_context(|| {
        format!("Failed to open database '{}'", settings.database.display())
    })?;
    let store = CatalogStore::new(db.clone());

    if args.download && !args.fetch {
        run_download(&args, &settings, store).await?;
    } else {
        run_fetch(&settings, store).await?;
    }

    db.close().await;
    Ok(())
}

async fn run_fetch(settings: &Settings, store: CatalogStore) -> Result<()> {
    info!(catalog = %settings.catalog_url, "indexing catalog");

    let source = HttpCatalogSource::new(
        settings.catalog_url.clone(),
        &settings.request_headers(),
        settings.timeouts,
    )
    .context("Failed to build catalog client")?;
    let indexer = CatalogIndexer::new(store, Arc::new(source))
        .with_retry_policy(RetryPolicy::with_max_attempts(settings.fetch_max_attempts))
        .with_page_delay(settings.page_delay);

    let report = indexer.run().await.context("Catalog indexing failed")?;
    info!(
        pages = report.pages_indexed,
        inserted = report.inserted,
        known = report.known,
        "fetch complete"
    );
    Ok(())
}

async fn run_download(args: &Args, settings: &Settings, store: CatalogStore) -> Result<()> {
    info!(output_dir = %settings.output_dir.display(), batch_size = settings.batch_size, "downloading eligible items");

    let client = HttpClient::new(
        settings.catalog_url.clone(),
        &settings.request_headers(),
        settings.timeouts,
    )
    .context("Failed to build download client")?;

    let mut batcher = DownloadBatcher::new(store, Arc::new(client), settings.output_dir.clone())
        .with_batch_delay(settings.batch_delay);
    if terminal::should_show_progress(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    ) {
        batcher = batcher.with_progress(MultiProgress::new());
    }

    let session = batcher
        .run_until_drained(settings.batch_size, args.max_batches)
        .await
        .context("Download session failed")?;
    info!(
        batches = session.batches,
        completed = session.completed,
        failed = session.failed,
        skipped = session.skipped,
        "download complete"
    );
    Ok(())
}
