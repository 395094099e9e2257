//! Recursive drill-down: re-run a finer spec level with the coarser level's discrepancies

use crate::cli::PassMode;
use crate::config::{Config, Limits};
use crate::data::TextRow;
use crate::dialect::Partition;
use crate::error::{DdiffError, Result};
use crate::progress::ProgressReporter;
use crate::pump::Pump;
use crate::selector::{self, DiscrepancyRow};
use crate::source::ConnectionPool;
use crate::spec::{ColumnLayout, ResolvedSpec, Side};
use crate::staging::StagingStore;

/// Where a spec level stands in the drill-down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrillState {
    Initial,
    Compared { rows: usize },
    Drilling { depth: usize },
    Done { ceiling_exceeded: bool },
}

impl DrillState {
    /// Next state once a level has been compared
    pub fn after_compare(rows: usize, has_nested: bool, ceiling: usize, depth: usize) -> Self {
        if rows == 0 || !has_nested {
            Self::Done {
                ceiling_exceeded: false,
            }
        } else if rows <= ceiling {
            Self::Drilling { depth: depth + 1 }
        } else {
            Self::Done {
                ceiling_exceeded: true,
            }
        }
    }
}

/// Largest discrepancy count that is still drilled into
pub fn drill_ceiling(limits: &Limits, mode: PassMode) -> usize {
    if mode.is_two_pass() {
        limits.drill_down_limit.saturating_mul(limits.two_pass_multiplier)
    } else {
        limits.drill_down_limit
    }
}

/// Final rows of a spec together with the level that produced them
#[derive(Debug)]
pub struct Comparison {
    pub rows: Vec<DiscrepancyRow>,
    pub layout: ColumnLayout,
    pub warnings: Vec<String>,
    /// Number of compared levels, 1 when no drill-down happened
    pub invocations: usize,
}

pub struct DrillDown<'r, 'c> {
    pub config: &'c Config,
    pub staging: &'r StagingStore,
    pub pool: &'r mut ConnectionPool<'c>,
    pub progress: &'r mut ProgressReporter,
    pub mode: PassMode,
}

impl<'r, 'c> DrillDown<'r, 'c> {
    pub fn run(&mut self, spec: &ResolvedSpec, partition: &Partition) -> Result<Comparison> {
        let ceiling = drill_ceiling(&self.config.limits, self.mode);
        let config = self.config;
        let known_source = |name: &str| config.has_source(name);

        let mut level = spec.clone();
        let mut params = spec.argrows.clone();
        let mut warnings = Vec::new();
        let mut invocations = 0;
        let mut state = DrillState::Initial;

        loop {
            log::debug!("{}: {:?}", level.name, state);
            let (rows, layout) = self.compare(&level, partition, &params, &mut warnings)?;
            invocations += 1;
            state = DrillState::Compared { rows: rows.len() };
            log::debug!("{}: {:?}", level.name, state);

            state = DrillState::after_compare(rows.len(), level.has_nested(), ceiling, level.depth);
            match state {
                DrillState::Drilling { depth } => {
                    log::info!(
                        "{}: {} discrepancies, drilling down to level {}",
                        level.name,
                        rows.len(),
                        depth
                    );
                    self.staging.discard_partition(partition)?;
                    params = rows.iter().map(DiscrepancyRow::to_flat).collect();
                    level = level
                        .child(Vec::new(), &known_source)?
                        .ok_or_else(|| DdiffError::config("nested spec vanished"))?;
                }
                done => {
                    if done == (DrillState::Done { ceiling_exceeded: true }) {
                        let warning = format!("Found {} discrepancies, go no deeper.", rows.len());
                        log::warn!("{}: {}", level.name, warning);
                        warnings.push(warning);
                    }
                    return Ok(Comparison {
                        rows,
                        layout,
                        warnings,
                        invocations,
                    });
                }
            }
        }
    }

    /// Pump both sides of one level and select its discrepancies
    fn compare(
        &mut self,
        level: &ResolvedSpec,
        partition: &Partition,
        params: &[TextRow],
        warnings: &mut Vec<String>,
    ) -> Result<(Vec<DiscrepancyRow>, ColumnLayout)> {
        let tags = level.source_tags();
        let mut layout = None;
        let mut counts = [0u64; 2];
        let mut truncated = false;

        let mut pump = Pump::new(self.staging, &self.config.limits, &mut *self.progress);
        for side in Side::BOTH {
            let source = self.pool.source(&level.sources[side.index()])?;
            let outcome = pump.pump(
                source,
                level,
                side,
                &tags[side.index()],
                partition,
                &mut layout,
                params,
            )?;
            counts[side.index()] = outcome.rows;
            truncated |= outcome.truncated;
        }

        if truncated {
            let warning = format!("DB1: {} rows, DB2: {} rows.", counts[0], counts[1]);
            log::warn!("{}: {}", level.name, warning);
            warnings.push(warning);
        }

        let layout = layout.ok_or_else(|| {
            DdiffError::schema_mismatch(format!("No result columns for spec '{}'", level.name))
        })?;
        let rows = selector::select(self.staging, partition, &tags, &layout, level.op)?;
        log::info!("{}: found {} discrepancies", level.name, rows.len());
        Ok((rows, layout))
    }
}
