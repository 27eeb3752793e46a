//! Persistence layer for the watchtower.
//!
//! The [`watcher::WatcherDb`] trait is the only thing the rest of the workspace depends on. Two
//! implementations are provided: [`inmemory::WatcherInMemory`] for tests and ephemeral towers and
//! [`persistent::sqlite::SqliteDb`] for production.

pub mod errors;
pub mod inmemory;
pub mod persistent;
pub mod watcher;
