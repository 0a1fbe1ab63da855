//! Clone Hero Score Ingestion
//!
//! Watches the Clone Hero screenshot directory, reads each results screen
//! with Tesseract OCR and appends the scores to a CSV log.

mod config;
mod ingest;
mod logging;
mod ocr;
mod paths;
mod store;
mod watcher;

use anyhow::{Context, Result};

use crate::ingest::{IngestHandler, ScoreExtractor};
use crate::ocr::TesseractEngine;
use crate::store::CsvScoreStore;
use crate::watcher::{DirectoryWatcher, ShutdownSignal, WatcherConfig};

fn main() -> Result<()> {
    let _log_guard = logging::init_logging(&paths::get_logs_dir())?;
    logging::install_panic_hook();

    tracing::info!("Clone Hero score ingestion v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config();
    tracing::info!("Watch directory: {}", config.watch_dir.display());
    if let Some(dir) = &config.processed_dir {
        tracing::info!("Processed screenshots move to: {}", dir.display());
    }
    if let Some(dir) = &config.failed_dir {
        tracing::info!("Failed screenshots move to: {}", dir.display());
    }

    let store = CsvScoreStore::open(&config.score_log)
        .with_context(|| format!("Failed to open score log {}", config.score_log.display()))?;
    match store.list_scores() {
        Ok(scores) => tracing::info!(
            "Score log {} holds {} scores",
            store.path().display(),
            scores.len()
        ),
        Err(e) => tracing::warn!("Failed to read score log {}: {}", store.path().display(), e),
    }

    let engine = TesseractEngine::locate(&config.ocr).context("Failed to set up Tesseract")?;
    let extractor = ScoreExtractor::new(engine, config.max_image_width, config.max_image_height);
    let handler = IngestHandler::new(extractor, store);

    let shutdown = ShutdownSignal::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown requested, finishing in-flight screenshots");
        signal.request();
    })
    .context("Failed to install Ctrl+C handler")?;

    let handle = DirectoryWatcher::new(WatcherConfig::from(&config), handler).start(shutdown)?;
    tracing::info!("Ready. Press Ctrl+C to stop.");

    handle.join();
    Ok(())
}
