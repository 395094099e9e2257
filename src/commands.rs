//! Command implementation for the ddiff CLI

use crate::cli::Cli;
use crate::config::Config;
use crate::error::Result;
use crate::orchestrator::{self, RunOptions};
use crate::output::{JsonFormatter, PrettyPrinter};

/// Run the selected specs and print the summary; returns the process exit code
pub fn execute_command(cli: &Cli, config: &Config) -> Result<i32> {
    let options = RunOptions {
        mode: cli.pass_mode(),
        keep: cli.keep || config.keep,
        show_progress: !cli.quiet && !cli.json,
    };

    let summary = orchestrator::run(config, &cli.spec, options)?;

    if cli.json {
        println!("{}", JsonFormatter::format_run_summary(&summary)?);
    } else if !cli.quiet {
        PrettyPrinter::print_run_summary(&summary);
    }

    Ok(summary.not_run() as i32)
}
