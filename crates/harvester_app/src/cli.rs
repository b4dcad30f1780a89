use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "harvester", version, about = "Harvests product catalogues from retailer sites")]
pub struct Cli {
    /// RON configuration file; defaults apply when it does not exist
    #[arg(short, long, global = true, default_value = "harvester.ron")]
    pub config: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log to the terminal only, without ./harvester.log
    #[arg(long, global = true)]
    pub no_log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Harvest one or more retailers and write their artifacts
    Run {
        /// Retailer to run (repeatable); every configured retailer when omitted
        #[arg(short, long = "retailer")]
        retailers: Vec<String>,

        /// Output directory, overriding the config file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Fetch a retailer's category menu and store it as JSON
    Menu {
        /// Category-based retailer whose menu to fetch
        #[arg(short, long)]
        retailer: String,

        /// Where to write the menu; the retailer's categories file by default
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List the built-in retailers
    Retailers,
}
