//! Command-line interface for ddiff

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ddiff")]
#[command(about = "Detect discrepancies in two databases as specified in cfg-file specs")]
#[command(after_help = "Thanks for using ddiff!")]
#[command(version)]
pub struct Cli {
    /// Config file (YAML)
    pub config: PathBuf,

    /// Spec name or tag, defaults to "all"
    #[arg(default_value = "all")]
    pub spec: String,

    /// Find discrepancies and store them
    #[arg(short = '1', long = "one", conflicts_with = "two")]
    pub one: bool,

    /// Find discrepancies and intersect them with the stored
    #[arg(short = '2', long = "two")]
    pub two: bool,

    /// Keep snapshot rows in the staging store after each spec
    #[arg(long)]
    pub keep: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Hide progress spinners
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn pass_mode(&self) -> PassMode {
        if self.one {
            PassMode::Mark
        } else if self.two {
            PassMode::Confirm
        } else {
            PassMode::Single
        }
    }
}

/// Which side of the two-pass flake filter this invocation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassMode {
    /// No flake filtering
    Single,
    /// Pass 1: persist discrepancies, skip reports
    Mark,
    /// Pass 2: intersect with persisted discrepancies, then report
    Confirm,
}

impl PassMode {
    pub fn is_two_pass(&self) -> bool {
        !matches!(self, Self::Single)
    }

    pub fn writes_reports(&self) -> bool {
        !matches!(self, Self::Mark)
    }
}
