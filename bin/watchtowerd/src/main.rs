//! `watchtowerd` watches the chain on behalf of payment-channel clients and publishes their
//! penalty transactions when a breach shows up.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use chain_monitor::ChainMonitor;
use clap::Parser;
use config::Config;
use constants::{DB_NAME, PENALTY_BURY_DEPTH, SERVICE_NAME};
use responder::BroadcastResponder;
use rpc::BitcoindRpc;
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::{debug, info, trace};
use watchtower_common::logging::{self, LoggerConfig};
use watchtower_crypto::{BlobCipher, TowerSigner};
use watchtower_db::{persistent::sqlite::SqliteDb, watcher::WatcherDb};
use watchtower_watcher::Watcher;

mod args;
mod config;
mod responder;
mod rpc;

mod constants;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(LoggerConfig::from_env(SERVICE_NAME))?;

    let cli = args::Cli::parse();
    let mut config = parse_toml::<Config>(&cli.config)?;
    if let Some(datadir) = cli.datadir {
        config.datadir = datadir;
    }
    info!(datadir = ?config.datadir, "starting watchtower");

    let db = Arc::new(init_database_handle(&config).await?);

    let rpc = Arc::new(BitcoindRpc::new(&config.btc_client).context("invalid bitcoind config")?);

    // resume right after the last block the previous run finished
    let start_height = db
        .get_last_known_block_height()
        .await?
        .map(|height| height.saturating_add(1));
    info!(?start_height, "starting chain monitor");

    let monitor = ChainMonitor::start(&config.chain_monitor, rpc.clone(), start_height);
    let responder = Arc::new(
        BroadcastResponder::start(rpc.clone(), rpc.clone(), &monitor, PENALTY_BURY_DEPTH).await,
    );

    let watcher = Watcher::new(
        config.watcher,
        db,
        rpc,
        monitor,
        responder.clone(),
        Arc::new(TowerSigner::new(config.tower_secret_key)),
        Arc::new(BlobCipher),
    );

    let restored = watcher.restore().await?;
    info!(public_key = %watcher.public_key(), %restored, "watchtower ready");

    tokio::signal::ctrl_c()
        .await
        .context("could not listen for shutdown signal")?;

    info!("shutting down");
    watcher.shutdown().await;
    responder.shutdown();

    Ok(())
}

async fn init_database_handle(config: &Config) -> anyhow::Result<SqliteDb> {
    let db_path = create_db_file(&config.datadir, DB_NAME)?;

    let connect_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .connect_with(connect_options)
        .await
        .context("could not connect to db")?;

    info!(action = "running migrations", %DB_NAME);
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("could not run migrations")?;

    Ok(SqliteDb::with_config(pool, config.db))
}

fn create_db_file(datadir: impl AsRef<Path>, db_name: &str) -> anyhow::Result<PathBuf> {
    let datadir = datadir.as_ref();
    if !datadir.exists() {
        fs::create_dir_all(datadir)
            .with_context(|| format!("could not create datadir {}", datadir.display()))?;
    }

    Ok(datadir.join(db_name))
}

/// Reads and parses a TOML file from the given path into the given type `T`.
fn parse_toml<T>(path: impl AsRef<Path>) -> anyhow::Result<T>
where
    T: std::fmt::Debug + DeserializeOwned,
{
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read TOML file {}", path.display()))?;
    trace!(?path, "read file");

    let parsed = toml::from_str::<T>(&contents).context("failed to parse TOML file")?;
    debug!(?parsed, "parsed TOML file");

    Ok(parsed)
}
