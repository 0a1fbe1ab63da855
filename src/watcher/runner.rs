//! Directory watcher - discovers screenshots and feeds them to the workers.
//!
//! Two discovery channels run side by side: filesystem notifications and a
//! periodic directory listing. Both offer paths to one [`Dispatcher`], which
//! claims each path in the shared [`HandledSet`] before queueing it, so a
//! file found by both channels is handled once.

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::queue::{create_work_queue, DiscoverySource, WorkItem};
use super::state::{HandledSet, ShutdownSignal};
use super::worker::{process_item, run_worker, WorkerContext};
use crate::config::IngestConfig;
use crate::paths::{clean_path, resolve_path};

/// File extensions treated as screenshots (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// How long the notify loop waits for an event before checking for shutdown.
const EVENT_WAIT: Duration = Duration::from_millis(200);

/// Settle delay for files already present at startup.
const STARTUP_SETTLE: Duration = Duration::from_millis(100);

/// Work performed on each discovered file.
///
/// An error marks the file as failed; it is logged, never propagated.
pub trait FileHandler: Send + Sync {
    fn handle(&self, path: &Path) -> Result<()>;
}

impl<F> FileHandler for F
where
    F: Fn(&Path) -> Result<()> + Send + Sync,
{
    fn handle(&self, path: &Path) -> Result<()> {
        self(path)
    }
}

/// Watcher settings.
#[derive(Clone, Debug)]
pub struct WatcherConfig {
    pub watch_dir: PathBuf,
    pub processed_dir: Option<PathBuf>,
    pub failed_dir: Option<PathBuf>,
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl From<&IngestConfig> for WatcherConfig {
    fn from(config: &IngestConfig) -> Self {
        Self {
            watch_dir: config.watch_dir.clone(),
            processed_dir: config.processed_dir.clone(),
            failed_dir: config.failed_dir.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            debounce: Duration::from_millis(config.debounce_ms),
            workers: config.workers,
            queue_capacity: config.queue_capacity,
        }
    }
}

/// True if the file name has a screenshot extension.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// Screenshot files directly inside `dir`, sorted by name.
pub fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Create, data-write and rename-into events can announce a new screenshot.
fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(
                RenameMode::To | RenameMode::Both | RenameMode::Any
            ))
    )
}

/// Single gate both discovery channels go through.
struct Dispatcher {
    handled: Arc<HandledSet>,
    sender: SyncSender<WorkItem>,
    debounce: Duration,
}

impl Dispatcher {
    /// Claims and queues `path`. Returns true if this call queued it.
    fn offer(&self, path: &Path, source: DiscoverySource) -> bool {
        if !is_image_file(path) {
            return false;
        }
        let path = resolve_path(path);
        if !self.handled.try_claim(&path) {
            return false;
        }

        tracing::debug!("Discovered {} via {}", path.display(), source);
        let item = WorkItem::new(path, source, self.debounce);
        if let Err(mpsc::SendError(item)) = self.sender.send(item) {
            // Workers are gone; leave the file for the next run
            self.handled.release(&item.path);
            return false;
        }
        true
    }
}

/// Watches one directory and runs a handler on each new screenshot.
pub struct DirectoryWatcher {
    config: WatcherConfig,
    handler: Arc<dyn FileHandler>,
}

impl DirectoryWatcher {
    pub fn new(config: WatcherConfig, handler: impl FileHandler + 'static) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Starts watching.
    ///
    /// Creates the directories, subscribes to notifications, processes the
    /// files already present (in name order, on this thread), then spawns
    /// the workers and both discovery loops.
    pub fn start(self, shutdown: ShutdownSignal) -> Result<WatcherHandle> {
        let config = self.config;
        let watch_dir = clean_path(&config.watch_dir);

        for dir in std::iter::once(&watch_dir)
            .chain(config.processed_dir.iter())
            .chain(config.failed_dir.iter())
        {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        // Notifications may report the resolved location of a symlinked dir
        let watch_dir = fs::canonicalize(&watch_dir)
            .with_context(|| format!("Failed to resolve {}", watch_dir.display()))?;

        let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>();
        let mut notifier = RecommendedWatcher::new(event_tx, Config::default())
            .context("Failed to create file watcher")?;
        notifier
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", watch_dir.display()))?;
        tracing::info!("Watching {}", watch_dir.display());

        let handled = Arc::new(HandledSet::new());
        let ctx = Arc::new(WorkerContext {
            handler: self.handler,
            handled: Arc::clone(&handled),
            shutdown: shutdown.clone(),
            processed_dir: config.processed_dir.clone(),
            failed_dir: config.failed_dir.clone(),
        });

        process_existing(&watch_dir, &ctx);

        let (sender, receiver) = create_work_queue(config.queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let mut threads = Vec::new();

        for id in 0..config.workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let ctx = Arc::clone(&ctx);
            threads.push(
                thread::Builder::new()
                    .name(format!("worker-{}", id))
                    .spawn(move || run_worker(id, receiver, ctx))
                    .context("Failed to spawn worker thread")?,
            );
        }

        let dispatcher = |sender: SyncSender<WorkItem>| Dispatcher {
            handled: Arc::clone(&handled),
            sender,
            debounce: config.debounce,
        };

        let notify_dispatcher = dispatcher(sender.clone());
        let notify_shutdown = shutdown.clone();
        threads.push(
            thread::Builder::new()
                .name("notify-loop".to_string())
                .spawn(move || run_notify_loop(notifier, event_rx, notify_dispatcher, notify_shutdown))
                .context("Failed to spawn notify thread")?,
        );

        let poll_dispatcher = dispatcher(sender);
        let poll_dir = watch_dir.clone();
        let poll_interval = config.poll_interval;
        threads.push(
            thread::Builder::new()
                .name("poll-loop".to_string())
                .spawn(move || run_poll_loop(poll_dir, poll_interval, poll_dispatcher, shutdown))
                .context("Failed to spawn poll thread")?,
        );

        Ok(WatcherHandle { threads, handled })
    }
}

/// Handles every screenshot already in the directory, in name order.
fn process_existing(watch_dir: &Path, ctx: &WorkerContext) {
    let existing = match list_images(watch_dir) {
        Ok(paths) => paths,
        Err(e) => {
            tracing::warn!("Failed to list {}: {}", watch_dir.display(), e);
            return;
        }
    };
    if !existing.is_empty() {
        tracing::info!("Processing {} existing screenshots", existing.len());
    }

    for path in existing {
        if ctx.shutdown.is_requested() {
            break;
        }
        let path = resolve_path(&path);
        if ctx.handled.try_claim(&path) {
            process_item(ctx, WorkItem::new(path, DiscoverySource::Startup, STARTUP_SETTLE));
        }
    }
}

fn run_notify_loop(
    notifier: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    dispatcher: Dispatcher,
    shutdown: ShutdownSignal,
) {
    while !shutdown.is_requested() {
        match events.recv_timeout(EVENT_WAIT) {
            Ok(Ok(event)) => {
                if is_relevant(&event.kind) {
                    for path in &event.paths {
                        dispatcher.offer(path, DiscoverySource::Notify);
                    }
                }
            }
            Ok(Err(e)) => tracing::warn!("Watch error: {}", e),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("File watcher stopped delivering events");
                break;
            }
        }
    }
    drop(notifier);
    tracing::debug!("Notify loop stopped");
}

fn run_poll_loop(
    watch_dir: PathBuf,
    interval: Duration,
    dispatcher: Dispatcher,
    shutdown: ShutdownSignal,
) {
    while shutdown.sleep(interval) {
        match list_images(&watch_dir) {
            Ok(paths) => {
                for path in paths {
                    if shutdown.is_requested() {
                        break;
                    }
                    dispatcher.offer(&path, DiscoverySource::Poll);
                }
            }
            Err(e) => tracing::warn!("Failed to poll {}: {}", watch_dir.display(), e),
        }
    }
    tracing::debug!("Poll loop stopped");
}

/// Running watcher threads.
pub struct WatcherHandle {
    threads: Vec<JoinHandle<()>>,
    handled: Arc<HandledSet>,
}

impl WatcherHandle {
    #[cfg(test)]
    pub fn handled(&self) -> &HandledSet {
        &self.handled
    }

    /// Waits for every thread to exit. Returns after shutdown is requested
    /// and the in-flight files are finished.
    pub fn join(self) {
        for handle in self.threads {
            let name = handle.thread().name().unwrap_or("watcher").to_string();
            if handle.join().is_err() {
                tracing::error!("Thread {} panicked", name);
            }
        }
        tracing::info!("Watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::state::FileState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tempfile::tempdir;

    fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        condition()
    }

    fn test_config(watch_dir: &Path) -> WatcherConfig {
        WatcherConfig {
            watch_dir: watch_dir.to_path_buf(),
            processed_dir: None,
            failed_dir: None,
            poll_interval: Duration::from_millis(50),
            debounce: Duration::from_millis(20),
            workers: 2,
            queue_capacity: 8,
        }
    }

    fn counting_handler(calls: Arc<AtomicUsize>) -> impl FileHandler + 'static {
        move |_: &Path| -> Result<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a.png")));
        assert!(is_image_file(Path::new("/x/B.PNG")));
        assert!(is_image_file(Path::new("c.jpg")));
        assert!(is_image_file(Path::new("d.JPEG")));
        assert!(is_image_file(Path::new("e.webp")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("png")));
        assert!(!is_image_file(Path::new("shot.png.part")));
    }

    #[test]
    fn test_relevant_events() {
        use notify::event::{CreateKind, DataChange, RemoveKind};

        assert!(is_relevant(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));
        assert!(!is_relevant(&EventKind::Modify(ModifyKind::Name(RenameMode::From))));
        assert!(!is_relevant(&EventKind::Remove(RemoveKind::File)));
    }

    #[test]
    fn test_dispatcher_claims_each_path_once() {
        let handled = Arc::new(HandledSet::new());
        let (sender, receiver) = create_work_queue(8);
        let dispatcher = Dispatcher {
            handled: Arc::clone(&handled),
            sender,
            debounce: Duration::ZERO,
        };

        assert!(dispatcher.offer(Path::new("/shots/a.png"), DiscoverySource::Notify));
        assert!(!dispatcher.offer(Path::new("/shots/./a.png"), DiscoverySource::Poll));
        assert!(!dispatcher.offer(Path::new("/shots/notes.txt"), DiscoverySource::Poll));
        drop(dispatcher);

        let items: Vec<WorkItem> = receiver.iter().collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, DiscoverySource::Notify);
        assert_eq!(handled.state(Path::new("/shots/a.png")), Some(FileState::Discovered));
    }

    #[test]
    fn test_dispatcher_releases_when_workers_gone() {
        let handled = Arc::new(HandledSet::new());
        let (sender, receiver) = create_work_queue(8);
        drop(receiver);
        let dispatcher = Dispatcher {
            handled: Arc::clone(&handled),
            sender,
            debounce: Duration::ZERO,
        };

        assert!(!dispatcher.offer(Path::new("/shots/a.png"), DiscoverySource::Poll));
        assert!(handled.is_empty());
    }

    #[test]
    fn test_new_file_handled_exactly_once() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let shutdown = ShutdownSignal::new();

        let handle = DirectoryWatcher::new(test_config(dir.path()), counting_handler(Arc::clone(&calls)))
            .start(shutdown.clone())
            .unwrap();

        fs::write(dir.path().join("clonehero-20251212052231.png"), b"png").unwrap();
        fs::write(dir.path().join("readme.txt"), b"text").unwrap();

        assert!(wait_until(Duration::from_secs(5), || calls.load(Ordering::SeqCst) >= 1));
        // Several more poll cycles and any late notify events
        thread::sleep(Duration::from_millis(400));

        shutdown.request();
        handle.join();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_existing_files_processed_and_moved() {
        let dir = tempdir().unwrap();
        let watch = dir.path().join("shots");
        let processed = dir.path().join("processed");
        let failed = dir.path().join("failed");
        fs::create_dir_all(&watch).unwrap();
        fs::write(watch.join("good.png"), b"ok").unwrap();
        fs::write(watch.join("bad.png"), b"bad").unwrap();

        let config = WatcherConfig {
            processed_dir: Some(processed.clone()),
            failed_dir: Some(failed.clone()),
            ..test_config(&watch)
        };
        let handler = |path: &Path| -> Result<()> {
            if path.ends_with("bad.png") {
                anyhow::bail!("unreadable screenshot");
            }
            Ok(())
        };

        let shutdown = ShutdownSignal::new();
        let handle = DirectoryWatcher::new(config, handler)
            .start(shutdown.clone())
            .unwrap();

        // Startup files are handled before start() returns
        assert!(processed.join("good.png").exists());
        assert!(failed.join("bad.png").exists());
        assert_eq!(
            handle.handled().state(&resolve_path(&watch.join("good.png"))),
            Some(FileState::Processed)
        );
        assert_eq!(
            handle.handled().state(&resolve_path(&watch.join("bad.png"))),
            Some(FileState::Failed)
        );

        shutdown.request();
        handle.join();
    }

    /// Drops `name` into a watched dir and waits for it to be moved.
    /// Returns (handler calls, moved, still in the watch dir).
    #[cfg(unix)]
    fn handle_and_move(name: &std::ffi::OsStr) -> (usize, bool, bool) {
        let dir = tempdir().unwrap();
        let watch = dir.path().join("shots");
        let processed = dir.path().join("processed");
        let config = WatcherConfig {
            processed_dir: Some(processed.clone()),
            ..test_config(&watch)
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let shutdown = ShutdownSignal::new();
        let handle = DirectoryWatcher::new(config, counting_handler(Arc::clone(&calls)))
            .start(shutdown.clone())
            .unwrap();

        fs::write(watch.join(name), b"png").unwrap();
        let moved = wait_until(Duration::from_secs(5), || processed.join(name).exists());
        thread::sleep(Duration::from_millis(200));

        shutdown.request();
        handle.join();
        (calls.load(Ordering::SeqCst), moved, watch.join(name).exists())
    }

    #[cfg(unix)]
    #[test]
    fn test_backslash_file_name_handled() {
        let (calls, moved, left_behind) =
            handle_and_move(std::ffi::OsStr::new("clone\\hero-20251212052231.png"));
        assert_eq!(calls, 1);
        assert!(moved);
        assert!(!left_behind);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_file_name_handled() {
        use std::os::unix::ffi::OsStrExt;

        let name = std::ffi::OsStr::from_bytes(b"shot-\xff-20251212052231.png");
        let (calls, moved, left_behind) = handle_and_move(name);
        assert_eq!(calls, 1);
        assert!(moved);
        assert!(!left_behind);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_paths_claim_once() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real");
        fs::create_dir(&real).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        fs::write(real.join("a.png"), b"png").unwrap();

        let handled = Arc::new(HandledSet::new());
        let (sender, receiver) = create_work_queue(8);
        let dispatcher = Dispatcher {
            handled: Arc::clone(&handled),
            sender,
            debounce: Duration::ZERO,
        };

        assert!(dispatcher.offer(&link.join("a.png"), DiscoverySource::Poll));
        assert!(!dispatcher.offer(&real.join("a.png"), DiscoverySource::Notify));
        drop(dispatcher);
        assert_eq!(receiver.iter().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_watch_dir_handled_once() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real");
        fs::create_dir(&real).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let shutdown = ShutdownSignal::new();
        let handle = DirectoryWatcher::new(test_config(&link), counting_handler(Arc::clone(&calls)))
            .start(shutdown.clone())
            .unwrap();

        fs::write(link.join("clonehero-20251212052231.png"), b"png").unwrap();
        assert!(wait_until(Duration::from_secs(5), || calls.load(Ordering::SeqCst) >= 1));
        thread::sleep(Duration::from_millis(400));

        let key = fs::canonicalize(&real).unwrap().join("clonehero-20251212052231.png");
        assert_eq!(handle.handled().state(&key), Some(FileState::Processed));
        assert_eq!(handle.handled().len(), 1);

        shutdown.request();
        handle.join();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_start_creates_directories() {
        let dir = tempdir().unwrap();
        let watch = dir.path().join("a").join("shots");
        let processed = dir.path().join("done");

        let config = WatcherConfig {
            processed_dir: Some(processed.clone()),
            ..test_config(&watch)
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let shutdown = ShutdownSignal::new();
        let handle = DirectoryWatcher::new(config, counting_handler(Arc::clone(&calls)))
            .start(shutdown.clone())
            .unwrap();

        assert!(watch.is_dir());
        assert!(processed.is_dir());

        shutdown.request();
        handle.join();
    }
}
