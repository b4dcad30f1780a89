mod cli;
mod config;
mod logging;
mod persistence;
mod profiles;
mod runner;

use clap::Parser;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::logging::LogDestination;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let destination = if cli.no_log_file {
        LogDestination::Terminal
    } else {
        LogDestination::Both
    };
    logging::initialize(destination, cli.verbose);

    if let Command::Retailers = cli.command {
        runner::list_retailers();
        return Ok(());
    }

    let config = Config::load(&cli.config)?;
    match cli.command {
        Command::Run { retailers, output } => runner::run(&config, &retailers, output).await,
        Command::Menu { retailer, out } => runner::fetch_menu(&config, &retailer, out).await,
        Command::Retailers => Ok(()),
    }
}
