use autotidy::cli::{Cli, run_cli};
use autotidy::logging::{Verbosity, init_logging};
use autotidy::output::OutputFormatter;
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(Verbosity::from_flags(cli.verbose, cli.quiet)) {
        OutputFormatter::warning(&e);
    }

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::error(&format!("Error: {}", e));
            ExitCode::FAILURE
        }
    }
}
