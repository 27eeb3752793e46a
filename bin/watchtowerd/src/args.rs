//! Parses command-line arguments for the watchtower daemon.

use std::path::PathBuf;

use clap::{crate_version, Parser};

#[derive(Debug, Parser)]
#[clap(
    name = "watchtowerd",
    about = "Watches the chain for channel breaches and responds to them",
    version = crate_version!()
)]
pub(crate) struct Cli {
    #[clap(
        long,
        short = 'c',
        help = "The file containing the configuration for the tower",
        default_value = "config.toml"
    )]
    pub config: PathBuf,

    #[clap(
        long,
        short = 'd',
        help = "Overrides the data directory set in the configuration file"
    )]
    pub datadir: Option<PathBuf>,
}
