//! Source connections: the `DataSource` trait, its DuckDB implementation, and the pool

use crate::config::{resolve_relative, substitute_env_vars, Config, EngineKind, SourceDescriptor};
use crate::data::{read_row, TextRow};
use crate::error::{DdiffError, Result};
use duckdb::Connection;
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Whether a sink wants more rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Receives the result of `DataSource::query`: the column names once, then batches
pub trait RowSink {
    fn columns(&mut self, names: &[String]) -> Result<()>;
    fn batch(&mut self, rows: Vec<TextRow>) -> Result<Flow>;
}

/// What the comparison core needs from a database connection
pub trait DataSource {
    fn label(&self) -> &str;

    /// Run one or more statements that return no rows
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Run a query and hand its rows to `sink` in batches of at most `batch_size`
    fn query(&mut self, sql: &str, batch_size: usize, sink: &mut dyn RowSink) -> Result<()>;

    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}

/// A source reached through DuckDB, either natively or via a scanner extension
pub struct DuckDbSource {
    name: String,
    conn: Connection,
    teardown: Vec<String>,
    in_transaction: bool,
}

impl DuckDbSource {
    pub fn new(name: impl Into<String>, conn: Connection) -> Self {
        Self {
            name: name.into(),
            conn,
            teardown: Vec::new(),
            in_transaction: false,
        }
    }

    pub fn with_teardown(mut self, teardown: Vec<String>) -> Self {
        self.teardown = teardown;
        self
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn error(&self, e: impl std::fmt::Display) -> DdiffError {
        DdiffError::source(&self.name, e.to_string())
    }

    /// Roll back anything pending, run teardown statements, and drop the connection
    fn close(mut self) {
        if self.in_transaction {
            if let Err(e) = self.rollback() {
                log::warn!("Rollback on close failed: {}", e);
            }
        }
        for statement in std::mem::take(&mut self.teardown) {
            log::debug!("-- teardown {}\n{}", self.name, statement);
            if let Err(e) = self.execute(&statement) {
                log::warn!("Teardown statement failed: {}", e);
            }
        }
    }
}

impl DataSource for DuckDbSource {
    fn label(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        log::debug!("-- {}\n{}", self.name, sql.trim());
        self.conn.execute_batch(sql).map_err(|e| self.error(e))
    }

    fn query(&mut self, sql: &str, batch_size: usize, sink: &mut dyn RowSink) -> Result<()> {
        log::debug!("-- {}\n{}", self.name, sql.trim());
        let batch_size = batch_size.max(1);

        let mut stmt = self.conn.prepare(sql).map_err(|e| self.error(e))?;
        let mut rows = stmt.query([]).map_err(|e| self.error(e))?;

        let names: Vec<String> = rows
            .as_ref()
            .map(|s| s.column_names())
            .unwrap_or_default();
        sink.columns(&names)?;

        let width = names.len();
        let mut batch = Vec::with_capacity(batch_size);
        while let Some(row) = rows.next().map_err(|e| self.error(e))? {
            batch.push(read_row(row, width)?);
            if batch.len() >= batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                if sink.batch(full)? == Flow::Stop {
                    return Ok(());
                }
            }
        }
        if !batch.is_empty() {
            sink.batch(batch)?;
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.conn
                .execute_batch("BEGIN TRANSACTION")
                .map_err(|e| self.error(e))?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.conn.execute_batch("COMMIT").map_err(|e| self.error(e))?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.conn.execute_batch("ROLLBACK").map_err(|e| self.error(e))?;
        }
        Ok(())
    }
}

/// Identity of the database file behind a descriptor, if it is a DuckDB file
pub fn database_key(descriptor: &SourceDescriptor, base_dir: &Path) -> Result<Option<PathBuf>> {
    if descriptor.engine != EngineKind::Duckdb || descriptor.is_in_memory() {
        return Ok(None);
    }
    let path = resolve_relative(base_dir, Path::new(&substitute_env_vars(&descriptor.target)?));
    Ok(Some(fs::canonicalize(&path).unwrap_or(path)))
}

/// Open a DuckDB connection for a descriptor
///
/// Non-DuckDB engines are attached to an in-memory DuckDB through the matching
/// scanner extension and made the default catalog, so user queries run unqualified.
pub fn open_connection(name: &str, descriptor: &SourceDescriptor, base_dir: &Path) -> Result<Connection> {
    let err = |e: duckdb::Error| DdiffError::source(name, e.to_string());
    let target = substitute_env_vars(&descriptor.target)?;

    let Some(extension) = descriptor.engine.extension() else {
        if descriptor.is_in_memory() {
            log::debug!("Opening in-memory database for '{}'", name);
            return Connection::open_in_memory().map_err(err);
        }
        let path = resolve_relative(base_dir, Path::new(&target));
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        log::debug!("Opening database {} for '{}'", path.display(), name);
        return Connection::open(&path).map_err(err);
    };

    let attach_target = if descriptor.engine.is_file_based() {
        resolve_relative(base_dir, Path::new(&target))
            .to_string_lossy()
            .to_string()
    } else {
        let mut target = target;
        if let Some(credentials) = &descriptor.credentials {
            if let Some(user) = &credentials.user {
                target.push_str(&format!(" user={}", substitute_env_vars(user)?));
            }
            if let Some(password) = &credentials.password {
                target.push_str(&format!(" password={}", substitute_env_vars(password)?));
            }
        }
        target
    };

    log::debug!("Attaching {} database for '{}'", extension, name);
    let conn = Connection::open_in_memory().map_err(err)?;
    conn.execute_batch(&format!(
        "INSTALL {ext}; LOAD {ext}; ATTACH '{target}' AS src (TYPE {ext}); USE src;",
        ext = extension,
        target = attach_target.replace('\'', "''"),
    ))
    .map_err(err)?;
    Ok(conn)
}

/// Lazily opened source connections of one run, keyed by canonical source name
pub struct ConnectionPool<'c> {
    config: &'c Config,
    open: IndexMap<String, DuckDbSource>,
    shared: Vec<(PathBuf, Connection)>,
}

impl<'c> ConnectionPool<'c> {
    pub fn new(config: &'c Config) -> Self {
        Self {
            config,
            open: IndexMap::new(),
            shared: Vec::new(),
        }
    }

    /// Offer an already open database (the staging store) to sources that target the same file
    pub fn share(&mut self, key: PathBuf, conn: Connection) {
        self.shared.push((key, conn));
    }

    /// The source's connection, opened on first use and inside a transaction
    pub fn source(&mut self, name: &str) -> Result<&mut DuckDbSource> {
        let canonical = self.config.canonical_source(name)?.to_string();

        if !self.open.contains_key(&canonical) {
            let descriptor = self.config.source_descriptor(&canonical)?;
            let conn = self.connect(&canonical, descriptor)?;
            let mut source = DuckDbSource::new(&canonical, conn).with_teardown(descriptor.teardown.clone());
            for statement in &descriptor.setup {
                source.execute(statement)?;
            }
            log::info!("Connected to source '{}'", canonical);
            self.open.insert(canonical.clone(), source);
        }

        let source = self
            .open
            .get_mut(&canonical)
            .ok_or_else(|| DdiffError::source(&canonical, "connection not open"))?;
        source.begin()?;
        Ok(source)
    }

    fn connect(&mut self, name: &str, descriptor: &SourceDescriptor) -> Result<Connection> {
        let base_dir = self.config.base_dir.clone();
        let Some(key) = database_key(descriptor, &base_dir)? else {
            return open_connection(name, descriptor, &base_dir);
        };

        if let Some((_, conn)) = self.shared.iter().find(|(k, _)| *k == key) {
            log::debug!("Source '{}' shares database {}", name, key.display());
            return conn
                .try_clone()
                .map_err(|e| DdiffError::source(name, e.to_string()));
        }

        let conn = open_connection(name, descriptor, &base_dir)?;
        let handle = conn
            .try_clone()
            .map_err(|e| DdiffError::source(name, e.to_string()))?;
        // the file exists now, so the key can be canonical
        let key = database_key(descriptor, &base_dir)?.unwrap_or(key);
        self.shared.push((key, handle));
        Ok(conn)
    }

    pub fn commit_all(&mut self) -> Result<()> {
        for source in self.open.values_mut() {
            source.commit()?;
        }
        Ok(())
    }

    /// Best effort; failures are logged
    pub fn rollback_all(&mut self) {
        for source in self.open.values_mut() {
            if let Err(e) = source.rollback() {
                log::warn!("Rollback failed: {}", e);
            }
        }
    }

    /// Run teardown statements of every opened source and close the connections
    pub fn close_all(&mut self) {
        for (_, source) in self.open.drain(..) {
            source.close();
        }
        self.shared.clear();
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

impl Drop for ConnectionPool<'_> {
    fn drop(&mut self) {
        self.close_all();
    }
}
