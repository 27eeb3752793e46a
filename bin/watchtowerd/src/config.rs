use std::path::PathBuf;

use chain_monitor::ChainMonitorConfig;
use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};
use watchtower_db::persistent::config::DbConfig;
use watchtower_watcher::WatcherConfig;

/// The configuration values that dictate the behavior of the tower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Config {
    /// The directory to store all the data in.
    pub datadir: PathBuf,

    /// The key the tower signs acceptance receipts with.
    ///
    /// Clients pin the matching public key, so rotating it invalidates every receipt handed out
    /// so far.
    pub tower_secret_key: SecretKey,

    /// The configuration required to connect to an instance of the bitcoin client.
    pub btc_client: BtcClientConfig,

    /// Appointment limits and expiry.
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// How often the chain is polled.
    #[serde(default)]
    pub chain_monitor: ChainMonitorConfig,

    /// The configuration for the sqlite3 database.
    #[serde(default)]
    pub db: DbConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BtcClientConfig {
    pub url: String,
    pub user: String,
    pub pass: String,
}
