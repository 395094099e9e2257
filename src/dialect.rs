//! SQL text generation for the staging store

use crate::spec::{ColumnLayout, Op};
use crate::{PERSISTED_WIDTH, SNAPSHOT_WIDTH};

pub const SNAPSHOT_TABLE: &str = "ddiff_snapshot";
pub const PERSISTED_TABLE: &str = "ddiff_persisted";
pub const RUN_TABLE: &str = "ddiff_run";

/// The slice of a staging table owned by one spec of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub cfg: String,
    pub spec: String,
    pub run: i64,
}

impl Partition {
    pub fn new(cfg: impl Into<String>, spec: impl Into<String>, run: i64) -> Self {
        Self {
            cfg: cfg.into(),
            spec: spec.into(),
            run,
        }
    }
}

/// Statements the staging store runs, one implementation per staging engine
pub trait QueryDialect {
    fn name(&self) -> &'static str;

    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn create_snapshot_table(&self) -> String;
    fn create_persisted_table(&self) -> String;
    fn create_run_table(&self) -> String;

    /// Insert of one snapshot row; the `width` values are bound as parameters
    fn build_insert(&self, partition: &Partition, source: &str, width: usize) -> String;

    /// Discrepancy rows between the two tagged partitions, flattened as
    /// `key1..keyN, left1, right1, ...` and ordered by key
    fn build_set_difference(
        &self,
        partition: &Partition,
        tags: &[String; 2],
        layout: &ColumnLayout,
        op: Op,
    ) -> String;

    /// Insert of one flattened discrepancy row of `width` values
    fn build_persisted_insert(&self, partition: &Partition, width: usize) -> String;

    /// Rows of the current run whose difference signature matches the most
    /// recent prior run on at least one value column
    fn build_persisted_intersection(&self, partition: &Partition, layout: &ColumnLayout) -> String;
}

fn column_list(prefix: &str, positions: impl Iterator<Item = usize>) -> String {
    positions
        .map(|p| format!("{}c{}", prefix, p))
        .collect::<Vec<_>>()
        .join(", ")
}

fn order_by(key_count: usize) -> String {
    (1..=key_count)
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(width: usize) -> String {
    vec!["?"; width].join(", ")
}

/// DuckDB staging; also fronts SQLite, Postgres and MySQL staging databases via ATTACH
#[derive(Debug, Default, Clone, Copy)]
pub struct DuckDbDialect;

impl DuckDbDialect {
    fn partition_filter(&self, qualifier: &str, partition: &Partition) -> String {
        format!(
            "{q}cfg = {} and {q}spec = {}",
            self.quote_literal(&partition.cfg),
            self.quote_literal(&partition.spec),
            q = qualifier
        )
    }

    fn value_columns(&self, count: usize) -> String {
        (1..=count)
            .map(|i| format!("    c{} varchar", i))
            .collect::<Vec<_>>()
            .join(",\n")
    }

    fn signature(&self, left: usize, right: usize) -> String {
        format!(
            "case when c{l} = c{r} then null \
             when c{l} <> c{r} then c{l} || chr(31) || c{r} \
             else 'x' end",
            l = left,
            r = right
        )
    }
}

impl QueryDialect for DuckDbDialect {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn create_snapshot_table(&self) -> String {
        format!(
            "create table if not exists {} (\n    cfg varchar not null,\n    spec varchar not null,\n    run bigint not null,\n    source varchar not null,\n{}\n)",
            SNAPSHOT_TABLE,
            self.value_columns(SNAPSHOT_WIDTH)
        )
    }

    fn create_persisted_table(&self) -> String {
        format!(
            "create table if not exists {} (\n    cfg varchar not null,\n    spec varchar not null,\n    run bigint not null,\n{}\n)",
            PERSISTED_TABLE,
            self.value_columns(PERSISTED_WIDTH)
        )
    }

    fn create_run_table(&self) -> String {
        format!(
            "create table if not exists {} (\n    run bigint primary key,\n    cfg varchar not null,\n    started timestamp not null\n)",
            RUN_TABLE
        )
    }

    fn build_insert(&self, partition: &Partition, source: &str, width: usize) -> String {
        format!(
            "insert into {} (cfg, spec, run, source, {}) values ({}, {}, {}, {}, {})",
            SNAPSHOT_TABLE,
            column_list("", 1..=width),
            self.quote_literal(&partition.cfg),
            self.quote_literal(&partition.spec),
            partition.run,
            self.quote_literal(source),
            placeholders(width)
        )
    }

    fn build_set_difference(
        &self,
        partition: &Partition,
        tags: &[String; 2],
        layout: &ColumnLayout,
        op: Op,
    ) -> String {
        let columns = column_list("", 1..=layout.width);
        let side = |tag: &str| {
            format!(
                "    select {}\n    from {}\n    where {} and run = {} and source = {}",
                columns,
                SNAPSHOT_TABLE,
                self.partition_filter("", partition),
                partition.run,
                self.quote_literal(tag)
            )
        };
        let except = |a: &str, b: &str| format!("{}\n    except\n{}", side(a), side(b));

        let mut select_list: Vec<String> = layout
            .keys
            .iter()
            .map(|k| format!("coalesce(d1.c{p}, d2.c{p})", p = k.position))
            .collect();
        for value in &layout.values {
            select_list.push(format!("d1.c{}", value.position));
            select_list.push(format!("d2.c{}", value.position));
        }
        let select_list = select_list.join(", ");

        let join = layout
            .keys
            .iter()
            .map(|k| format!("d1.c{p} = d2.c{p}", p = k.position))
            .collect::<Vec<_>>()
            .join(" and ");

        let mut halves = Vec::new();
        if op.reports_left_only() {
            halves.push(format!("select {}\nfrom d1 left join d2 on {}", select_list, join));
        }
        if op.reports_right_only() {
            halves.push(format!("select {}\nfrom d2 left join d1 on {}", select_list, join));
        }

        format!(
            "with d1 as (\n{}\n), d2 as (\n{}\n)\n{}\norder by {}",
            except(&tags[0], &tags[1]),
            except(&tags[1], &tags[0]),
            halves.join("\nunion\n"),
            order_by(layout.keys.len())
        )
    }

    fn build_persisted_insert(&self, partition: &Partition, width: usize) -> String {
        format!(
            "insert into {} (cfg, spec, run, {}) values ({}, {}, {}, {})",
            PERSISTED_TABLE,
            column_list("", 1..=width),
            self.quote_literal(&partition.cfg),
            self.quote_literal(&partition.spec),
            partition.run,
            placeholders(width)
        )
    }

    fn build_persisted_intersection(&self, partition: &Partition, layout: &ColumnLayout) -> String {
        let key_count = layout.keys.len();
        let keys = column_list("", 1..=key_count);
        let filter = self.partition_filter("", partition);

        let signatures: Vec<String> = (0..layout.values.len())
            .map(|j| {
                let left = key_count + 2 * j + 1;
                format!("{} as s{}", self.signature(left, left + 1), j + 1)
            })
            .collect();
        let projection = if signatures.is_empty() {
            keys.clone()
        } else {
            format!("{}, {}", keys, signatures.join(", "))
        };

        let matches = if layout.values.is_empty() {
            "true".to_string()
        } else {
            (1..=layout.values.len())
                .map(|j| format!("t1.s{j} = t2.s{j}", j = j))
                .collect::<Vec<_>>()
                .join(" or ")
        };
        let key_join = |a: &str, b: &str| {
            (1..=key_count)
                .map(|p| format!("{a}.c{p} = {b}.c{p}", a = a, b = b, p = p))
                .collect::<Vec<_>>()
                .join(" and ")
        };

        format!(
            "with t1 as (\n    select {projection}\n    from {table}\n    where {filter} and run = (\n        select max(run) from {table} where {filter} and run <> {run}\n    )\n), \
             t2 as (\n    select {projection}\n    from {table}\n    where {filter} and run = {run}\n), \
             confirmed as (\n    select distinct {t2_keys}\n    from t1 join t2 on {t_join}\n    where {matches}\n)\n\
             select {dd_columns}\nfrom {table} dd\njoin confirmed on {dd_join}\nwhere {filter_dd} and dd.run = {run}\norder by {order}",
            projection = projection,
            table = PERSISTED_TABLE,
            filter = filter,
            run = partition.run,
            t2_keys = column_list("t2.", 1..=key_count),
            t_join = key_join("t1", "t2"),
            matches = matches,
            dd_columns = column_list("dd.", 1..=layout.flat_width()),
            dd_join = key_join("dd", "confirmed"),
            filter_dd = self.partition_filter("dd.", partition),
            order = order_by(key_count),
        )
    }
}
