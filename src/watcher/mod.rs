//! Watch-directory ingestion loop.

pub mod mover;
pub mod queue;
pub mod runner;
pub mod state;
pub mod worker;

pub use runner::{DirectoryWatcher, FileHandler, WatcherConfig};
pub use state::ShutdownSignal;
