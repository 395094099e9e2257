//! Run orchestration: select specs, drive each through the pipeline, clean up

use crate::cli::PassMode;
use crate::config::Config;
use crate::dialect::Partition;
use crate::drill::DrillDown;
use crate::error::Result;
use crate::flake::FlakeFilter;
use crate::progress::ProgressReporter;
use crate::report::{
    format_started, ReportGenerator, ReportRenderer, RunSummary, SpecOutcome, SpecReport, SpecResult,
};
use crate::source::{ConnectionPool, DataSource};
use crate::spec::{ResolvedSpec, Spec};
use crate::staging::{RunId, StagingStore};
use chrono::Local;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub mode: PassMode,
    /// Keep snapshot rows after each spec
    pub keep: bool,
    pub show_progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: PassMode::Single,
            keep: false,
            show_progress: false,
        }
    }
}

pub struct Orchestrator<'c> {
    config: &'c Config,
    options: RunOptions,
    staging: StagingStore,
    pool: ConnectionPool<'c>,
    reports: ReportGenerator,
    progress: ProgressReporter,
}

impl<'c> Orchestrator<'c> {
    /// Open the staging store; failing to do so is fatal to the run
    pub fn new(config: &'c Config, options: RunOptions) -> Result<Self> {
        let staging = StagingStore::open(&config.staging()?, &config.base_dir)?;
        let mut pool = ConnectionPool::new(config);
        if let Some((key, conn)) = staging.share_handle()? {
            pool.share(key, conn);
        }

        Ok(Self {
            config,
            options,
            staging,
            pool,
            reports: ReportGenerator::new(&config.out_dir())?,
            progress: ProgressReporter::new(options.show_progress),
        })
    }

    pub fn with_renderer(mut self, renderer: Box<dyn ReportRenderer>) -> Self {
        self.reports = ReportGenerator::with_renderer(&self.config.out_dir(), renderer);
        self
    }

    /// Process every spec matching `selector` and return what happened to each
    pub fn run(mut self, selector: &str) -> Result<RunSummary> {
        let config = self.config;
        let selected = config.select_specs(selector)?;
        let run = self
            .staging
            .register_run(&config.name, Local::now().naive_local())?;
        log::info!(
            "-- start run {} of '{}': {} spec(s), {:?} pass",
            run,
            config.name,
            selected.len(),
            self.options.mode
        );

        let mut specs = Vec::with_capacity(selected.len());
        for (name, spec) in selected {
            specs.push(self.process_spec(run, name, spec));
        }

        let mut summary = RunSummary {
            cfg: config.name.clone(),
            run,
            mode: self.options.mode,
            specs,
            report: None,
        };

        if self.options.mode.writes_reports() {
            summary.report = Some(self.reports.write_run(&summary)?);
        }

        let filter = FlakeFilter::new(&self.staging, self.options.mode);
        for outcome in &summary.specs {
            filter.finish(&config.name, &outcome.name)?;
        }

        self.pool.close_all();
        let errors = summary.not_run();
        if errors > 0 {
            log::info!("-- done WITH {} ERRORS", errors);
        } else {
            log::info!("-- done");
        }
        Ok(summary)
    }

    fn process_spec(&mut self, run: RunId, name: &str, entry: &serde_yaml::Value) -> SpecOutcome {
        let config = self.config;
        let mut outcome = SpecOutcome::new(name);

        let resolved = Spec::from_value(name, entry).and_then(|spec| {
            outcome.doc = spec.doc.clone();
            spec.resolve(name, config.default_sources.as_deref(), &|s: &str| {
                config.has_source(s)
            })
        });
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                log::error!("Skipping spec '{}' (run {}): {}", name, run, e);
                outcome.result = SpecResult::FailedToRun {
                    error: e.to_string(),
                };
                return outcome;
            }
        };

        log::info!(
            "spec {}; DB1 = {}, DB2 = {}",
            name,
            resolved.sources[0],
            resolved.sources[1]
        );
        outcome.sources = Some(resolved.sources.clone());
        let partition = Partition::new(&config.name, name, run.id);

        match self.drive(run, &resolved, &partition, &mut outcome) {
            Ok(count) => {
                log::info!("{}: found {} discrepancies", name, count);
                outcome.result = SpecResult::from_count(count);
            }
            Err(e) => {
                log::error!("Spec '{}' failed in run {}: {}", name, run, e);
                self.staging.rollback();
                self.pool.rollback_all();
                if let Err(e) = run_statements(&mut self.pool, &resolved, &resolved.teardown)
                    .and_then(|_| self.pool.commit_all())
                {
                    log::warn!("Teardown of '{}' after failure failed: {}", name, e);
                    self.pool.rollback_all();
                }
                outcome.result = SpecResult::FailedToRun {
                    error: e.to_string(),
                };
            }
        }
        outcome
    }

    /// Run one spec inside a staging transaction; returns the reported discrepancy count
    fn drive(
        &mut self,
        run: RunId,
        resolved: &ResolvedSpec,
        partition: &Partition,
        outcome: &mut SpecOutcome,
    ) -> Result<usize> {
        let mode = self.options.mode;
        self.staging.begin()?;
        run_statements(&mut self.pool, resolved, &resolved.setup)?;

        let filter = FlakeFilter::new(&self.staging, mode);
        let count = if filter.is_known_clean(partition)? {
            log::info!("{}: the first pass stored no discrepancies", resolved.name);
            0
        } else {
            let comparison = DrillDown {
                config: self.config,
                staging: &self.staging,
                pool: &mut self.pool,
                progress: &mut self.progress,
                mode,
            }
            .run(resolved, partition)?;
            outcome.invocations = comparison.invocations;
            outcome.warnings.extend(comparison.warnings.iter().cloned());

            let rows = filter.apply(partition, &comparison.layout, comparison.rows)?;
            if mode.writes_reports() && !rows.is_empty() {
                let report = SpecReport {
                    cfg: &self.config.name,
                    run: run.id,
                    started: format_started(&run),
                    spec: &resolved.name,
                    doc: resolved.doc.as_deref(),
                    sources: &resolved.sources,
                    titles: comparison.layout.titles(),
                    rows: SpecReport::cells(&rows),
                    warnings: &outcome.warnings,
                };
                let path = self.reports.write_spec(&report, &outcome.safe_name)?;
                outcome.report = Some(path);
            }
            rows.len()
        };

        run_statements(&mut self.pool, resolved, &resolved.teardown)?;
        if !self.options.keep {
            self.staging.discard_partition(partition)?;
        }
        self.staging.commit()?;
        self.pool.commit_all()?;
        Ok(count)
    }
}

/// Run spec-level statements once on each distinct source of the spec
fn run_statements(pool: &mut ConnectionPool<'_>, spec: &ResolvedSpec, statements: &[String]) -> Result<()> {
    if statements.is_empty() {
        return Ok(());
    }
    let mut done: Vec<String> = Vec::with_capacity(2);
    for name in &spec.sources {
        let source = pool.source(name)?;
        if done.iter().any(|d| d == source.label()) {
            continue;
        }
        done.push(source.label().to_string());
        for statement in statements {
            source.execute(statement)?;
        }
    }
    Ok(())
}

/// Open the staging store, run the selected specs, and close everything
pub fn run(config: &Config, selector: &str, options: RunOptions) -> Result<RunSummary> {
    Orchestrator::new(config, options)?.run(selector)
}
