//! Unit tests for CLI argument parsing and validation

use clap::Parser;
use ddiff::cli::{Cli, PassMode};
use std::path::PathBuf;

#[test]
fn test_cli_defaults() {
    let cli = Cli::try_parse_from(["ddiff", "nightly.yaml"]).unwrap();
    assert_eq!(cli.config, PathBuf::from("nightly.yaml"));
    assert_eq!(cli.spec, "all");
    assert_eq!(cli.pass_mode(), PassMode::Single);
    assert!(!cli.keep);
    assert!(!cli.json);
    assert!(!cli.quiet);
    assert!(!cli.verbose);
}

#[test]
fn test_cli_spec_selector() {
    let cli = Cli::try_parse_from(["ddiff", "nightly.yaml", "orders"]).unwrap();
    assert_eq!(cli.spec, "orders");
}

#[test]
fn test_cli_two_pass_flags() {
    let cli = Cli::try_parse_from(["ddiff", "nightly.yaml", "-1"]).unwrap();
    assert_eq!(cli.pass_mode(), PassMode::Mark);

    let cli = Cli::try_parse_from(["ddiff", "nightly.yaml", "all", "--two"]).unwrap();
    assert_eq!(cli.pass_mode(), PassMode::Confirm);
}

#[test]
fn test_cli_passes_are_exclusive() {
    let result = Cli::try_parse_from(["ddiff", "nightly.yaml", "--one", "--two"]);
    assert!(result.is_err());
}

#[test]
fn test_cli_output_flags() {
    let cli = Cli::try_parse_from(["ddiff", "nightly.yaml", "--keep", "--json", "-q", "-v"]).unwrap();
    assert!(cli.keep);
    assert!(cli.json);
    assert!(cli.quiet);
    assert!(cli.verbose);
}

#[test]
fn test_cli_requires_config() {
    assert!(Cli::try_parse_from(["ddiff"]).is_err());
}

#[test]
fn test_cli_rejects_unknown_flag() {
    assert!(Cli::try_parse_from(["ddiff", "nightly.yaml", "--three"]).is_err());
}
