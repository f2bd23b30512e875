//! CLI entry point for the airdata tool.

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use airdata::{ApiClient, Catalog, Dataset, DownloadOptions, DownloadSession, download};

mod cli;

use cli::{Args, Command, DownloadArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    match args.command {
        Command::Historical(download_args) => {
            run_download(Dataset::Historical, &download_args, args.quiet).await
        }
        Command::Verified(download_args) => {
            run_download(Dataset::Verified, &download_args, args.quiet).await
        }
        Command::Unverified(download_args) => {
            run_download(Dataset::Unverified, &download_args, args.quiet).await
        }
        Command::Countries => {
            for country in Catalog::get().countries() {
                println!("{country}");
            }
            Ok(())
        }
        Command::Pollutants => {
            for (notation, ids) in Catalog::get().pollutants() {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                println!("{notation}\t{}", ids.join(","));
            }
            Ok(())
        }
        Command::Cities { countries } => {
            let catalog = Catalog::get();
            for country in &countries {
                if let Some(cities) = catalog.cities(country) {
                    for city in cities {
                        println!("{country}\t{city}");
                    }
                }
            }
            Ok(())
        }
        Command::Search { query } => {
            for notation in Catalog::get().search_pollutant(&query) {
                println!("{notation}");
            }
            Ok(())
        }
    }
}

async fn run_download(dataset: Dataset, args: &DownloadArgs, quiet: bool) -> Result<()> {
    // the destination must exist before the session checks it
    if !args.path.is_dir() {
        std::fs::create_dir_all(&args.path)?;
    }

    let client = ApiClient::new().max_concurrent(usize::from(args.max_concurrent));
    let mut session = DownloadSession::new(client)
        .progress(!quiet)
        .raise_for_status(false);

    let options = DownloadOptions {
        countries: args.countries.clone(),
        pollutants: args.pollutants.clone(),
        cities: args.cities.clone(),
        metadata: args.metadata,
        summary_only: args.summary_only,
        overwrite: args.overwrite,
        country_subdir: !args.flat,
    };

    download(&mut session, dataset, Path::new(&args.path), &options).await?;
    Ok(())
}
