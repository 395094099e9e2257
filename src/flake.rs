//! Two-pass flake filter: report only discrepancies that reproduce across runs

use crate::cli::PassMode;
use crate::dialect::Partition;
use crate::error::Result;
use crate::selector::DiscrepancyRow;
use crate::spec::ColumnLayout;
use crate::staging::StagingStore;

pub struct FlakeFilter<'a> {
    staging: &'a StagingStore,
    mode: PassMode,
}

impl<'a> FlakeFilter<'a> {
    pub fn new(staging: &'a StagingStore, mode: PassMode) -> Self {
        Self { staging, mode }
    }

    /// In pass 2 a spec without stored discrepancies is clean without querying
    pub fn is_known_clean(&self, partition: &Partition) -> Result<bool> {
        if self.mode != PassMode::Confirm {
            return Ok(false);
        }
        Ok(!self.staging.has_persisted(&partition.cfg, &partition.spec)?)
    }

    /// Persist the rows in two-pass mode; in pass 2 keep only confirmed rows
    pub fn apply(
        &self,
        partition: &Partition,
        layout: &ColumnLayout,
        rows: Vec<DiscrepancyRow>,
    ) -> Result<Vec<DiscrepancyRow>> {
        if !self.mode.is_two_pass() || rows.is_empty() {
            return Ok(rows);
        }

        let flat: Vec<_> = rows.iter().map(DiscrepancyRow::to_flat).collect();
        self.staging.persist(partition, layout.flat_width(), &flat)?;
        log::debug!("Stored {} discrepancies of run {}", flat.len(), partition.run);

        if self.mode == PassMode::Mark {
            return Ok(rows);
        }

        let sql = self
            .staging
            .dialect()
            .build_persisted_intersection(partition, layout);
        let confirmed: Vec<DiscrepancyRow> = self
            .staging
            .query_rows(&sql, layout.flat_width())?
            .into_iter()
            .map(|flat| DiscrepancyRow::from_flat(flat, layout.keys.len()))
            .collect();
        log::info!(
            "{}: {} of {} discrepancies confirmed by the previous run",
            partition.spec,
            confirmed.len(),
            rows.len()
        );
        Ok(confirmed)
    }

    /// Forget stored discrepancies of a spec once pass 2 processed it
    pub fn finish(&self, cfg: &str, spec: &str) -> Result<usize> {
        if self.mode != PassMode::Confirm {
            return Ok(0);
        }
        self.staging.clear_persisted(cfg, spec)
    }
}
