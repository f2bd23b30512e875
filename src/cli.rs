//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use airdata::DEFAULT_MAX_CONCURRENT;

/// Download air quality data from the European Environment Agency (EEA).
#[derive(Parser, Debug)]
#[command(name = "airdata")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress bars and non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Historical data delivered between 2002 and 2012
    Historical(DownloadArgs),
    /// Verified data reported annually by countries
    Verified(DownloadArgs),
    /// Unverified data transmitted continuously, most recent period
    Unverified(DownloadArgs),
    /// List the known country codes
    Countries,
    /// List the known pollutant notations and ids
    Pollutants,
    /// List the known city names for the given countries
    Cities {
        /// Country codes to list cities for
        #[arg(required = true)]
        countries: Vec<String>,
    },
    /// Search pollutant notations matching a query
    Search {
        /// Case-insensitive fragment of a pollutant notation
        query: String,
    },
}

/// Filter and mode options shared by the dataset subcommands.
#[derive(ClapArgs, Debug)]
pub struct DownloadArgs {
    /// Restrict to country codes (repeatable)
    #[arg(short = 'c', long = "country")]
    pub countries: Vec<String>,

    /// Restrict to pollutant notations (repeatable)
    #[arg(short = 'p', long = "pollutant")]
    pub pollutants: Vec<String>,

    /// Restrict to cities (repeatable; overrides --country)
    #[arg(short = 'C', long = "city")]
    pub cities: Vec<String>,

    /// Directory to save files in (created if missing)
    #[arg(long, default_value = "data")]
    pub path: PathBuf,

    /// Download station metadata as well
    #[arg(short = 'm', long)]
    pub metadata: bool,

    /// Total files and size estimate, nothing is downloaded
    #[arg(short = 'n', long)]
    pub summary_only: bool,

    /// Re-download existing files
    #[arg(short = 'O', long)]
    pub overwrite: bool,

    /// Save all files directly under --path, without country subdirectories
    #[arg(long)]
    pub flat: bool,

    /// Maximum simultaneous file transfers (1-100)
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub max_concurrent: u8,
}
