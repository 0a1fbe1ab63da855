//! Bounded work queue between the discovery loops and the workers.

use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::time::{Duration, Instant};

/// Which discovery channel found a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    /// Already present when the watcher started
    Startup,
    /// Filesystem change notification
    Notify,
    /// Periodic directory listing
    Poll,
}

impl std::fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoverySource::Startup => write!(f, "startup"),
            DiscoverySource::Notify => write!(f, "notify"),
            DiscoverySource::Poll => write!(f, "poll"),
        }
    }
}

/// A claimed file waiting for a worker.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Normalized path of the file
    pub path: PathBuf,
    pub source: DiscoverySource,
    /// When the file was discovered
    pub detected_at: Instant,
    /// How long after `detected_at` the file may be read
    pub settle: Duration,
}

impl WorkItem {
    pub fn new(path: PathBuf, source: DiscoverySource, settle: Duration) -> Self {
        Self {
            path,
            source,
            detected_at: Instant::now(),
            settle,
        }
    }

    /// Time left before the file has settled.
    pub fn remaining_settle(&self) -> Duration {
        self.settle.saturating_sub(self.detected_at.elapsed())
    }
}

/// Creates the work queue.
///
/// The channel is bounded: discovery blocks when `capacity` items are
/// already waiting, which caps memory while workers catch up.
pub fn create_work_queue(capacity: usize) -> (SyncSender<WorkItem>, Receiver<WorkItem>) {
    sync_channel(capacity.max(1))
}
