//! Output formatting utilities

use crate::error::Result;
use crate::report::{RunSummary, SpecOutcome, SpecResult};
use serde_json::json;

/// Pretty printer for ddiff output
pub struct PrettyPrinter;

impl PrettyPrinter {
    /// Print the outcome of every processed spec and the totals
    pub fn print_run_summary(summary: &RunSummary) {
        println!("🔍 ddiff {} (run {}, {:?} pass)", summary.cfg, summary.run, summary.mode);

        for outcome in &summary.specs {
            Self::print_spec_outcome(outcome);
        }

        println!(
            "└─ Succeeded: {}, failed: {}, failed to run: {}",
            summary.succeeded(),
            summary.failed(),
            summary.not_run()
        );
        if let Some(report) = &summary.report {
            println!("   Report: {}", report.display());
        }
    }

    fn print_spec_outcome(outcome: &SpecOutcome) {
        match &outcome.result {
            SpecResult::Clean => println!("├─ ✅ {}", outcome.name),
            SpecResult::Discrepancies { count } => {
                println!("├─ ❌ {}: {} discrepancies", outcome.name, count)
            }
            SpecResult::FailedToRun { error } => {
                println!("├─ ⚠️  {}: failed to run", outcome.name);
                println!("│  └─ {}", error);
            }
        }
        for warning in &outcome.warnings {
            println!("│  └─ {}", warning);
        }
        if outcome.invocations > 1 {
            println!("│  └─ drilled down {} level(s)", outcome.invocations - 1);
        }
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn format_run_summary(summary: &RunSummary) -> Result<String> {
        let value = json!({
            "cfg": summary.cfg,
            "run": summary.run.id,
            "mode": summary.mode,
            "succeeded": summary.succeeded(),
            "failed": summary.failed(),
            "not_run": summary.not_run(),
            "report": summary.report,
            "specs": summary.specs,
        });
        Ok(serde_json::to_string_pretty(&value)?)
    }
}
