//! In-memory implementation of the watcher database.

pub mod errors;
pub mod watcher;

pub use watcher::WatcherInMemory;
