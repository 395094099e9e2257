//! Pump: moves one side of a spec from its source into the snapshot table

use crate::config::Limits;
use crate::data::TextRow;
use crate::dialect::Partition;
use crate::error::Result;
use crate::progress::ProgressReporter;
use crate::source::{DataSource, Flow, RowSink};
use crate::spec::{ColumnLayout, ResolvedSpec, Side};
use crate::staging::StagingStore;
use minijinja::{context, Environment, Value};

/// Rows staged for one side, and whether the fetch ceiling cut them short
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpOutcome {
    pub rows: u64,
    pub truncated: bool,
}

pub struct Pump<'a> {
    staging: &'a StagingStore,
    limits: &'a Limits,
    progress: &'a mut ProgressReporter,
    templates: Environment<'static>,
}

impl<'a> Pump<'a> {
    pub fn new(staging: &'a StagingStore, limits: &'a Limits, progress: &'a mut ProgressReporter) -> Self {
        Self {
            staging,
            limits,
            progress,
            templates: query_environment(),
        }
    }

    /// Run the side's query, rendered once per slice of `params`, into the partition.
    ///
    /// The first call for a spec level freezes `layout`; later calls are checked against it.
    #[allow(clippy::too_many_arguments)]
    pub fn pump(
        &mut self,
        source: &mut dyn DataSource,
        level: &ResolvedSpec,
        side: Side,
        tag: &str,
        partition: &Partition,
        layout: &mut Option<ColumnLayout>,
        params: &[TextRow],
    ) -> Result<PumpOutcome> {
        let query = &level.queries[side.index()];
        let ceiling = self.limits.max_fetch_rows;
        self.progress.start_pump(&level.name, tag);

        let mut sink = SnapshotSink {
            staging: self.staging,
            partition,
            tag,
            pk: &level.pk,
            side,
            layout,
            ceiling,
            rows: 0,
            truncated: false,
            progress: &mut *self.progress,
        };

        if params.is_empty() {
            source.query(query, self.limits.fetch_batch, &mut sink)?;
        } else {
            let slices = params.len().div_ceil(self.limits.param_batch);
            log::debug!("-- select {} dataset into staging: {} time(s)", tag, slices);
            for slice in params.chunks(self.limits.param_batch) {
                let sql = render_query(&self.templates, query, slice)?;
                source.query(&sql, self.limits.fetch_batch, &mut sink)?;
                if sink.truncated {
                    break;
                }
            }
        }

        let outcome = PumpOutcome {
            rows: sink.rows,
            truncated: sink.truncated,
        };
        self.progress.finish_pump();
        log::info!("{} ({}): {} rows", tag, side.label(), outcome.rows);
        Ok(outcome)
    }
}

struct SnapshotSink<'s> {
    staging: &'s StagingStore,
    partition: &'s Partition,
    tag: &'s str,
    pk: &'s [String],
    side: Side,
    layout: &'s mut Option<ColumnLayout>,
    ceiling: u64,
    rows: u64,
    truncated: bool,
    progress: &'s mut ProgressReporter,
}

impl RowSink for SnapshotSink<'_> {
    fn columns(&mut self, names: &[String]) -> Result<()> {
        if let Some(layout) = self.layout.as_ref() {
            return layout.check(names, self.side);
        }
        let layout = ColumnLayout::discover(names, self.pk)?;
        log::debug!(
            "Column layout: keys {:?}, {} value columns",
            layout.keys.iter().map(|k| &k.name).collect::<Vec<_>>(),
            layout.values.len()
        );
        *self.layout = Some(layout);
        Ok(())
    }

    fn batch(&mut self, mut rows: Vec<TextRow>) -> Result<Flow> {
        let room = self.ceiling.saturating_sub(self.rows);
        if rows.len() as u64 > room {
            rows.truncate(room as usize);
            self.truncated = true;
        }
        if rows.is_empty() {
            return Ok(if self.truncated { Flow::Stop } else { Flow::Continue });
        }

        let width = self.layout.as_ref().map(|l| l.width).unwrap_or_default();
        let inserted = self
            .staging
            .insert_snapshot(self.partition, self.tag, width, &rows)?;
        self.rows += inserted as u64;
        self.progress.update_rows(self.rows);

        // a result of exactly `ceiling` rows is complete; only dropped rows count
        if self.truncated {
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }
}

/// Template environment for queries, with a `quote` filter producing SQL literals
pub fn query_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.add_filter("quote", quote);
    env
}

fn quote(value: Value) -> String {
    if value.is_none() || value.is_undefined() {
        return "NULL".to_string();
    }
    let text = match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    };
    format!("'{}'", text.replace('\'', "''"))
}

/// Render a query template with `argrows` bound to the given parameter rows
pub fn render_query(env: &Environment<'_>, query: &str, argrows: &[TextRow]) -> Result<String> {
    Ok(env.render_str(query, context! { argrows => argrows })?)
}
