//! strata: browse, upload, download and delete objects in AWS S3, Azure Blob
//! Storage and Google Cloud Storage from the command line.

use crate::cli::Cli;
use crate::error::ErrorKind;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod error;
mod output;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).with_writer(std::io::stderr).init();

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!("{err:?}");
            match &*err {
                ErrorKind::Cancelled => {
                    eprintln!("cancelled");
                    ExitCode::from(130)
                },
                kind => {
                    eprintln!("error: {kind}");
                    ExitCode::FAILURE
                },
            }
        },
    }
}
