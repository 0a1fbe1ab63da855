//! Worker threads that run the file handler on claimed files.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use super::mover::move_file;
use super::queue::WorkItem;
use super::runner::FileHandler;
use super::state::{FileState, HandledSet, ShutdownSignal};

/// Everything a worker needs besides the queue.
pub struct WorkerContext {
    pub handler: Arc<dyn FileHandler>,
    pub handled: Arc<HandledSet>,
    pub shutdown: ShutdownSignal,
    pub processed_dir: Option<PathBuf>,
    pub failed_dir: Option<PathBuf>,
}

/// Runs the worker loop until the queue closes.
///
/// Once shutdown is requested, items that have not started are released
/// and left in the watch directory for the next run.
pub fn run_worker(id: usize, receiver: Arc<Mutex<Receiver<WorkItem>>>, ctx: Arc<WorkerContext>) {
    tracing::debug!("Worker {} started", id);

    loop {
        let next = {
            let receiver = receiver
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            receiver.recv()
        };
        let Ok(item) = next else {
            break; // Channel closed, every sender dropped
        };

        if ctx.shutdown.is_requested() {
            tracing::debug!("Shutting down, leaving {} for the next run", item.path.display());
            ctx.handled.release(&item.path);
            continue;
        }

        process_item(&ctx, item);
    }

    tracing::debug!("Worker {} stopped", id);
}

/// Waits for the file to settle, runs the handler and relocates the file.
pub fn process_item(ctx: &WorkerContext, item: WorkItem) {
    let remaining = item.remaining_settle();
    let path = item.path;

    if !remaining.is_zero() && !ctx.shutdown.sleep(remaining) {
        ctx.handled.release(&path);
        return;
    }

    if !path.is_file() {
        tracing::info!("{} disappeared before processing, skipping", path.display());
        ctx.handled.release(&path);
        return;
    }

    if !ctx.handled.advance(&path, FileState::Processing) {
        return;
    }
    tracing::info!("Processing {} (found by {})", path.display(), item.source);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| ctx.handler.handle(&path)))
        .unwrap_or_else(|_| Err(anyhow::anyhow!("handler panicked")));

    match outcome {
        Ok(()) => {
            ctx.handled.advance(&path, FileState::Processed);
            if let Some(dir) = &ctx.processed_dir {
                relocate(&path, dir);
            }
        }
        Err(e) => {
            tracing::error!("Failed to process {}: {:#}", path.display(), e);
            ctx.handled.advance(&path, FileState::Failed);
            if let Some(dir) = &ctx.failed_dir {
                relocate(&path, dir);
            }
        }
    }
}

fn relocate(path: &Path, dir: &Path) {
    match move_file(path, dir) {
        Ok(destination) => tracing::info!("Moved {} to {}", path.display(), destination.display()),
        Err(e) if e.is_data_safe() => tracing::warn!("Moved {} with a leftover source: {}", path.display(), e),
        Err(e) => tracing::error!("Failed to move {} to {}: {}", path.display(), dir.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::queue::DiscoverySource;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    fn context(
        handler: impl FileHandler + 'static,
        processed_dir: Option<PathBuf>,
        failed_dir: Option<PathBuf>,
    ) -> WorkerContext {
        WorkerContext {
            handler: Arc::new(handler),
            handled: Arc::new(HandledSet::new()),
            shutdown: ShutdownSignal::new(),
            processed_dir,
            failed_dir,
        }
    }

    fn succeed(_: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    fn claimed_item(ctx: &WorkerContext, path: &Path) -> WorkItem {
        assert!(ctx.handled.try_claim(path));
        WorkItem::new(path.to_path_buf(), DiscoverySource::Notify, Duration::from_millis(5))
    }

    #[test]
    fn test_success_moves_to_processed_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"x").unwrap();
        let processed = dir.path().join("processed");

        let ctx = context(succeed, Some(processed.clone()), None);
        process_item(&ctx, claimed_item(&ctx, &path));

        assert_eq!(ctx.handled.state(&path), Some(FileState::Processed));
        assert!(!path.exists());
        assert!(processed.join("a.png").exists());
    }

    #[test]
    fn test_success_without_processed_dir_leaves_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"x").unwrap();

        let ctx = context(succeed, None, None);
        process_item(&ctx, claimed_item(&ctx, &path));

        assert_eq!(ctx.handled.state(&path), Some(FileState::Processed));
        assert!(path.exists());
    }

    #[test]
    fn test_waits_out_settle_before_handling() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"x").unwrap();

        let ctx = context(succeed, None, None);
        assert!(ctx.handled.try_claim(&path));
        let settle = Duration::from_millis(150);
        let item = WorkItem::new(path.clone(), DiscoverySource::Poll, settle);
        let detected_at = item.detected_at;

        process_item(&ctx, item);

        assert!(detected_at.elapsed() >= settle);
        assert_eq!(ctx.handled.state(&path), Some(FileState::Processed));
    }

    #[test]
    fn test_failure_moves_to_failed_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"x").unwrap();
        let failed = dir.path().join("failed");

        let ctx = context(
            |_: &Path| -> anyhow::Result<()> { Err(anyhow::anyhow!("unreadable")) },
            Some(dir.path().join("processed")),
            Some(failed.clone()),
        );
        process_item(&ctx, claimed_item(&ctx, &path));

        assert_eq!(ctx.handled.state(&path), Some(FileState::Failed));
        assert!(failed.join("a.png").exists());
        assert!(!dir.path().join("processed").exists());
    }

    #[test]
    fn test_handler_panic_counts_as_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"x").unwrap();

        let ctx = context(|_: &Path| -> anyhow::Result<()> { panic!("boom") }, None, None);
        process_item(&ctx, claimed_item(&ctx, &path));

        assert_eq!(ctx.handled.state(&path), Some(FileState::Failed));
    }

    #[test]
    fn test_vanished_file_released() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.png");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let ctx = context(
            move |_: &Path| -> anyhow::Result<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            None,
            None,
        );
        process_item(&ctx, claimed_item(&ctx, &path));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.handled.state(&path), None);
    }

    #[test]
    fn test_queued_items_skipped_after_shutdown() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"x").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let ctx = Arc::new(context(
            move |_: &Path| -> anyhow::Result<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            None,
            None,
        ));
        let (sender, receiver) = crate::watcher::queue::create_work_queue(4);
        sender.send(claimed_item(&ctx, &path)).unwrap();
        drop(sender);

        ctx.shutdown.request();
        run_worker(0, Arc::new(Mutex::new(receiver)), Arc::clone(&ctx));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.handled.state(&path), None);
        assert!(path.exists());
    }
}
