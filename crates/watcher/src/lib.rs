//! The watcher: keeps the appointments delegated to the tower, looks for their dispute
//! transactions in every new block and hands the decrypted penalties to a [`Responder`].
//!
//! [`Responder`]: responder::Responder

pub mod breach;
pub mod config;
pub mod constants;
pub mod errors;
pub mod registry;
pub mod responder;
pub mod watcher;

pub use breach::{BreachOutcome, InvalidBreach, ValidBreach};
pub use config::WatcherConfig;
pub use errors::{WatcherError, WatcherResult};
pub use responder::Responder;
pub use watcher::{AddAppointmentOutcome, Watcher};
