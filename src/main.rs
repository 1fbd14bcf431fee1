use std::process::ExitCode;

use clap::Parser;
use paintfe_core::cli::{self, CliArgs};
use paintfe_core::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    logger::init();
    cli::run(args)
}
