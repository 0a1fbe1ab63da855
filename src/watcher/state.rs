//! Per-file processing state shared by the discovery loops and workers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Lifecycle of one watched file. Transitions only move forward:
/// Discovered → Processing → Processed | Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Claimed by a discovery channel, waiting for a worker
    Discovered,
    /// A worker is running the handler
    Processing,
    /// Handler succeeded
    Processed,
    /// Handler failed; the file is not retried this run
    Failed,
}

impl FileState {
    pub fn can_advance_to(self, next: FileState) -> bool {
        matches!(
            (self, next),
            (FileState::Discovered, FileState::Processing)
                | (FileState::Processing, FileState::Processed)
                | (FileState::Processing, FileState::Failed)
        )
    }
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileState::Discovered => write!(f, "Discovered"),
            FileState::Processing => write!(f, "Processing"),
            FileState::Processed => write!(f, "Processed"),
            FileState::Failed => write!(f, "Failed"),
        }
    }
}

/// Paths already claimed this run, with their state.
///
/// Keys are expected to be normalized by the caller.
#[derive(Debug, Default)]
pub struct HandledSet {
    states: Mutex<HashMap<PathBuf, FileState>>,
}

impl HandledSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, FileState>> {
        // Every update is a single map operation, so a poisoned map is still consistent
        self.states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Marks `path` as Discovered if nobody has claimed it yet.
    /// Returns true for exactly one caller per path.
    pub fn try_claim(&self, path: &Path) -> bool {
        let mut states = self.lock();
        if states.contains_key(path) {
            return false;
        }
        states.insert(path.to_path_buf(), FileState::Discovered);
        true
    }

    /// Moves `path` to `next` if that is a legal forward transition.
    pub fn advance(&self, path: &Path, next: FileState) -> bool {
        let mut states = self.lock();
        match states.get_mut(path) {
            Some(current) if current.can_advance_to(next) => {
                *current = next;
                true
            }
            Some(current) => {
                tracing::warn!(
                    "Refusing state change {} -> {} for {}",
                    current,
                    next,
                    path.display()
                );
                false
            }
            None => false,
        }
    }

    /// Forgets `path` so it can be discovered again.
    pub fn release(&self, path: &Path) {
        self.lock().remove(path);
    }

    pub fn state(&self, path: &Path) -> Option<FileState> {
        self.lock().get(path).copied()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cooperative shutdown flag shared by every watcher thread.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Granularity of interruptible sleeps.
    const SLICE: Duration = Duration::from_millis(100);

    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` in short slices.
    /// Returns false if shutdown was requested before the time elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(Self::SLICE));
        }
    }
}
