//! Common test utilities and helpers

use ddiff::cli::PassMode;
use ddiff::config::SourceDescriptor;
use ddiff::report::SpecOutcome;
use ddiff::staging::StagingStore;
use ddiff::{orchestrator, Config, Result, RunOptions, RunSummary};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Sources shared by the test configs: an empty in-memory database and two
/// databases holding a table `t` with slightly different contents
pub const SOURCES: &str = r#"staging: { engine: duckdb, target: staging.duckdb }
out_dir: out
sources:
  mem: { engine: duckdb, target: ":memory:" }
  left:
    engine: duckdb
    target: ":memory:"
    setup:
      - "create table t as select * from (values (1, 'a', 10), (2, 'b', 20), (3, 'c', 30), (4, 'd', 40), (5, 'e', 50)) v(id, name, amount)"
  right:
    engine: duckdb
    target: ":memory:"
    setup:
      - "create table t as select * from (values (1, 'a', 10), (2, 'B', 20), (3, 'c', 31), (5, 'e', 50), (6, 'f', 60)) v(id, name, amount)"
  ONE: { alias: left }
  TWO: { alias: right }
default_sources: [mem, mem]
"#;

/// Test fixture manager for creating temporary ddiff configs
pub struct TestFixture {
    pub temp_dir: TempDir,
}

impl TestFixture {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    /// Get the root path of the test fixture
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn out_dir(&self) -> PathBuf {
        self.root().join("out")
    }

    /// Write `{name}.yaml` holding the shared sources followed by `body`
    pub fn write_config(&self, name: &str, body: &str) -> Result<PathBuf> {
        self.write_raw_config(name, &format!("{}{}", SOURCES, body))
    }

    /// Write `{name}.yaml` as given
    pub fn write_raw_config(&self, name: &str, yaml: &str) -> Result<PathBuf> {
        let path = self.root().join(format!("{}.yaml", name));
        fs::write(&path, yaml)?;
        Ok(path)
    }

    /// Load a config and run the selected specs in the given mode
    pub fn run(&self, config: &Path, selector: &str, mode: PassMode) -> Result<RunSummary> {
        let config = Config::load(config)?;
        let options = RunOptions {
            mode,
            keep: config.keep,
            show_progress: false,
        };
        orchestrator::run(&config, selector, options)
    }

    /// Open the staging store the test configs write to
    pub fn staging(&self) -> Result<StagingStore> {
        StagingStore::open(&SourceDescriptor::duckdb("staging.duckdb"), self.root())
    }

    pub fn read_out(&self, file: &str) -> Result<String> {
        Ok(fs::read_to_string(self.out_dir().join(file))?)
    }
}

/// Look up a spec outcome, panicking with the processed names when it is missing
pub fn outcome<'a>(summary: &'a RunSummary, name: &str) -> &'a SpecOutcome {
    summary.outcome(name).unwrap_or_else(|| {
        let names: Vec<&str> = summary.specs.iter().map(|s| s.name.as_str()).collect();
        panic!("spec '{}' not in run, processed: {:?}", name, names)
    })
}
