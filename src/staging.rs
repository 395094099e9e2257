//! Staging store: snapshot partitions, persisted discrepancies, and the run registry

use crate::config::SourceDescriptor;
use crate::data::TextRow;
use crate::dialect::{DuckDbDialect, Partition, QueryDialect, PERSISTED_TABLE, RUN_TABLE, SNAPSHOT_TABLE};
use crate::error::{DdiffError, Result};
use crate::source::{database_key, open_connection};
use chrono::{Datelike, NaiveDateTime, Timelike};
use duckdb::{params, params_from_iter, Connection};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Attempts at registering a run id before giving up
const RUN_ID_ATTEMPTS: i64 = 100;

/// Identifier of one invocation, `YYYYMMDDHHMMSS` of its start time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunId {
    pub id: i64,
    pub started: NaiveDateTime,
}

impl RunId {
    pub fn candidate(started: NaiveDateTime) -> i64 {
        started.year() as i64 * 10_000_000_000
            + started.month() as i64 * 100_000_000
            + started.day() as i64 * 1_000_000
            + started.hour() as i64 * 10_000
            + started.minute() as i64 * 100
            + started.second() as i64
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

pub struct StagingStore {
    conn: Connection,
    dialect: Box<dyn QueryDialect>,
    key: Option<PathBuf>,
    in_transaction: bool,
}

impl StagingStore {
    /// Open the staging database and create its tables if missing
    pub fn open(descriptor: &SourceDescriptor, base_dir: &Path) -> Result<Self> {
        let conn = open_connection("staging", descriptor, base_dir)
            .map_err(|e| DdiffError::staging(format!("Cannot open staging store: {}", e)))?;
        let key = database_key(descriptor, base_dir)?;
        log::debug!("Staging store opened ({})", descriptor.target);
        Self::from_connection(conn, key)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DdiffError::staging(format!("Cannot open staging store: {}", e)))?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, key: Option<PathBuf>) -> Result<Self> {
        let store = Self {
            conn,
            dialect: Box::new(DuckDbDialect),
            key,
            in_transaction: false,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        for ddl in [
            self.dialect.create_snapshot_table(),
            self.dialect.create_persisted_table(),
            self.dialect.create_run_table(),
        ] {
            self.conn
                .execute_batch(&ddl)
                .map_err(|e| DdiffError::staging(format!("Cannot create staging tables: {}", e)))?;
        }
        Ok(())
    }

    pub fn dialect(&self) -> &dyn QueryDialect {
        self.dialect.as_ref()
    }

    /// A second handle on the staging database for sources targeting the same file
    pub fn share_handle(&self) -> Result<Option<(PathBuf, Connection)>> {
        match &self.key {
            Some(key) => Ok(Some((key.clone(), self.conn.try_clone()?))),
            None => Ok(None),
        }
    }

    /// Register a new run, moving to the next id while the candidate is taken
    pub fn register_run(&self, cfg: &str, started: NaiveDateTime) -> Result<RunId> {
        let base = RunId::candidate(started);
        let sql = format!(
            "insert into {} (run, cfg, started) values (?, ?, cast(? as timestamp))",
            RUN_TABLE
        );
        let started_text = started.format("%Y-%m-%d %H:%M:%S").to_string();

        let mut last_error = None;
        for offset in 0..RUN_ID_ATTEMPTS {
            let id = base + offset;
            match self.conn.execute(&sql, params![id, cfg, started_text]) {
                Ok(_) => {
                    log::debug!("Registered run {}", id);
                    return Ok(RunId { id, started });
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(DdiffError::staging(format!(
            "Cannot register a run id near {}: {}",
            base,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    pub fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.conn.execute_batch("BEGIN TRANSACTION")?;
            self.in_transaction = true;
        }
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// Best effort; failures are logged
    pub fn rollback(&mut self) {
        if self.in_transaction {
            self.in_transaction = false;
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                log::warn!("Staging rollback failed: {}", e);
            }
        }
    }

    /// Append rows of `width` values to the source's snapshot partition
    pub fn insert_snapshot(
        &self,
        partition: &Partition,
        source: &str,
        width: usize,
        rows: &[TextRow],
    ) -> Result<usize> {
        let sql = self.dialect.build_insert(partition, source, width);
        log::debug!("-- insert into {}\n{}", SNAPSHOT_TABLE, sql);
        self.execute_rows(&sql, width, rows)
    }

    /// Append flattened discrepancy rows for the partition's run
    pub fn persist(&self, partition: &Partition, width: usize, rows: &[TextRow]) -> Result<usize> {
        let sql = self.dialect.build_persisted_insert(partition, width);
        log::debug!("-- insert into {}\n{}", PERSISTED_TABLE, sql);
        self.execute_rows(&sql, width, rows)
    }

    fn execute_rows(&self, sql: &str, width: usize, rows: &[TextRow]) -> Result<usize> {
        let mut stmt = self.conn.prepare(sql)?;
        for row in rows {
            if row.len() != width {
                return Err(DdiffError::staging(format!(
                    "Row has {} values, expected {}",
                    row.len(),
                    width
                )));
            }
            stmt.execute(params_from_iter(row.iter()))?;
        }
        Ok(rows.len())
    }

    /// Run a staging query whose columns are all text
    pub fn query_rows(&self, sql: &str, width: usize) -> Result<Vec<TextRow>> {
        log::debug!("\n\n{}\n", sql.trim());
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(row.get::<_, Option<String>>(i)?);
            }
            result.push(values);
        }
        Ok(result)
    }

    pub fn snapshot_count(&self, partition: &Partition, source: &str) -> Result<u64> {
        let sql = format!(
            "select count(*) from {} where cfg = ? and spec = ? and run = ? and source = ?",
            SNAPSHOT_TABLE
        );
        let count: i64 = self.conn.query_row(
            &sql,
            params![partition.cfg, partition.spec, partition.run, source],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Delete every snapshot row of the partition
    pub fn discard_partition(&self, partition: &Partition) -> Result<usize> {
        let sql = format!(
            "delete from {} where cfg = ? and spec = ? and run = ?",
            SNAPSHOT_TABLE
        );
        let deleted = self
            .conn
            .execute(&sql, params![partition.cfg, partition.spec, partition.run])?;
        log::debug!("Discarded {} snapshot rows of '{}'", deleted, partition.spec);
        Ok(deleted)
    }

    /// Whether any run stored discrepancies for the spec
    pub fn has_persisted(&self, cfg: &str, spec: &str) -> Result<bool> {
        let sql = format!("select count(*) from {} where cfg = ? and spec = ?", PERSISTED_TABLE);
        let count: i64 = self.conn.query_row(&sql, params![cfg, spec], |row| row.get(0))?;
        Ok(count > 0)
    }

    pub fn clear_persisted(&self, cfg: &str, spec: &str) -> Result<usize> {
        let sql = format!("delete from {} where cfg = ? and spec = ?", PERSISTED_TABLE);
        Ok(self.conn.execute(&sql, params![cfg, spec])?)
    }
}
