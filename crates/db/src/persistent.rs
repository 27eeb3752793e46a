//! SQLite-backed persistence for the watcher.

pub mod config;
pub mod constants;
pub mod errors;
pub mod sqlite;
mod types;
