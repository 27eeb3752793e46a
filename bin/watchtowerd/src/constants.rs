/// File name of the SQLite database inside the data directory.
pub(crate) const DB_NAME: &str = "watchtower.db";

/// Base name the daemon logs under.
pub(crate) const SERVICE_NAME: &str = "watchtowerd";

/// Confirmations after which a penalty is considered final and no longer tracked.
pub(crate) const PENALTY_BURY_DEPTH: u64 = 100;
