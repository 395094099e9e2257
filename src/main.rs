//! Main entry point for ddiff CLI

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use ddiff::cli::Cli;
use ddiff::commands::execute_command;
use ddiff::config::Config;
use std::fs::{self, OpenOptions};
use std::io::Write;

fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    let config = match Config::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    if let Err(e) = init_logging(&config, cli.verbose) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    // Execute the command
    match execute_command(&cli, &config) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Log to stderr, or to `{log_dir}/{date}_ddiff.log` when the config names a log directory
fn init_logging(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose || config.debugging {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);

    if let Some(dir) = config.log_dir() {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create log directory {}", dir.display()))?;
        let path = dir.join(format!("{}_ddiff.log", Local::now().format("%Y-%m-%d")));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Cannot open log file {}", path.display()))?;
        builder
            .target(env_logger::Target::Pipe(Box::new(file)))
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{}:{}:{}:{}",
                    Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    record.target(),
                    record.args()
                )
            });
    }

    builder.init();
    Ok(())
}
