//! `canopy` binary.

use canopy_cli::{CanopyCli, CliArgs};
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let cli = match CanopyCli::from_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("canopy: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("canopy: {e}");
            ExitCode::FAILURE
        }
    }
}
