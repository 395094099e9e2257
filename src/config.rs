//! Configuration file loading: limits, source catalog and specs

use crate::error::{DdiffError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Selector that matches every enabled spec
pub const SELECT_ALL: &str = "all";

/// Prefix that disables a spec without deleting it
const DISABLED_PREFIX: &str = "--";

/// A parsed config file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Config name, taken from the file stem
    #[serde(skip)]
    pub name: String,

    /// Directory of the config file; relative paths resolve against it
    #[serde(skip)]
    pub base_dir: PathBuf,

    #[serde(default)]
    pub out_dir: Option<PathBuf>,

    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub debugging: bool,

    #[serde(default)]
    pub keep: bool,

    #[serde(default)]
    pub include_sources: Vec<PathBuf>,

    #[serde(default)]
    pub staging: Option<SourceDescriptor>,

    #[serde(default)]
    pub default_sources: Option<Vec<String>>,

    #[serde(default)]
    pub limits: Limits,

    #[serde(default)]
    pub sources: IndexMap<String, SourceEntry>,

    /// Raw spec entries; each is parsed when it runs so a malformed one fails alone
    #[serde(default)]
    pub specs: IndexMap<String, serde_yaml::Value>,
}

/// Numeric knobs of the pump and drill-down engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    /// Rows fetched per batch from a source
    pub fetch_batch: usize,
    /// Hard ceiling of rows pumped per side and spec level
    pub max_fetch_rows: u64,
    /// Drill deeper only when a level has at most this many discrepancies
    pub drill_down_limit: usize,
    /// Multiplier applied to `drill_down_limit` in two-pass mode
    pub two_pass_multiplier: usize,
    /// Parameter rows rendered into one query execution
    pub param_batch: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            fetch_batch: crate::DEFAULT_FETCH_BATCH,
            max_fetch_rows: crate::DEFAULT_MAX_FETCH_ROWS,
            drill_down_limit: crate::DEFAULT_DRILL_DOWN_LIMIT,
            two_pass_multiplier: crate::DEFAULT_TWO_PASS_MULTIPLIER,
            param_batch: crate::DEFAULT_PARAM_BATCH,
        }
    }
}

impl Limits {
    fn validate(&self) -> Result<()> {
        if self.fetch_batch == 0 || self.param_batch == 0 {
            return Err(DdiffError::config(
                "limits.fetch_batch and limits.param_batch must be positive",
            ));
        }
        if self.two_pass_multiplier == 0 {
            return Err(DdiffError::config("limits.two_pass_multiplier must be positive"));
        }
        Ok(())
    }
}

/// Supported engine kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Duckdb,
    Sqlite,
    Postgres,
    Mysql,
}

impl EngineKind {
    /// Name of the DuckDB extension and ATTACH type used to reach this engine
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Duckdb => None,
            Self::Sqlite => Some("sqlite"),
            Self::Postgres => Some("postgres"),
            Self::Mysql => Some("mysql"),
        }
    }

    /// Engines whose target is a local file path
    pub fn is_file_based(&self) -> bool {
        matches!(self, Self::Duckdb | Self::Sqlite)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Connection parameters of one source (or of the staging store)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SourceDescriptor {
    pub engine: EngineKind,

    /// File path, `:memory:`, or a connection string for server engines
    pub target: String,

    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Statements run once when the connection is first opened
    #[serde(default)]
    pub setup: Vec<String>,

    /// Statements run once at the end of the run
    #[serde(default)]
    pub teardown: Vec<String>,
}

impl SourceDescriptor {
    pub fn duckdb(target: impl Into<String>) -> Self {
        Self {
            engine: EngineKind::Duckdb,
            target: target.into(),
            credentials: None,
            setup: Vec::new(),
            teardown: Vec::new(),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.engine == EngineKind::Duckdb && self.target == ":memory:"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SourceAlias {
    pub alias: String,
}

/// A catalog entry: either a reference to another source or a connection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SourceEntry {
    Alias(SourceAlias),
    Connection(SourceDescriptor),
}

impl Config {
    /// Load a config file and the source catalogs it includes
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            DdiffError::config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| DdiffError::config(format!("Invalid config path: {}", path.display())))?;

        let base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Self::from_yaml_str(&name, &base_dir, &text)
    }

    /// Parse config text as if it was read from `base_dir/{name}.yaml`
    pub fn from_yaml_str(name: &str, base_dir: &Path, text: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(text)?;
        config.name = name.to_string();
        config.base_dir = base_dir.to_path_buf();

        config.limits.validate()?;
        config.merge_included_sources()?;
        config
            .specs
            .retain(|spec_name, _| !spec_name.starts_with(DISABLED_PREFIX));

        log::debug!(
            "Loaded config '{}': {} sources, {} specs",
            config.name,
            config.sources.len(),
            config.specs.len()
        );
        Ok(config)
    }

    /// Entries of the config file override entries of included catalogs
    fn merge_included_sources(&mut self) -> Result<()> {
        if self.include_sources.is_empty() {
            return Ok(());
        }

        let mut merged: IndexMap<String, SourceEntry> = IndexMap::new();
        for include in &self.include_sources {
            let path = self.resolve_path(include);
            let text = fs::read_to_string(&path).map_err(|e| {
                DdiffError::config(format!(
                    "Cannot read included sources {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let catalog: IndexMap<String, SourceEntry> = serde_yaml::from_str(&text)?;
            log::debug!("Included {} sources from {}", catalog.len(), path.display());
            merged.extend(catalog);
        }
        merged.extend(std::mem::take(&mut self.sources));
        self.sources = merged;
        Ok(())
    }

    /// Resolve a path relative to the config file directory, expanding `~`
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        resolve_relative(&self.base_dir, path)
    }

    /// Directory receiving the HTML reports
    pub fn out_dir(&self) -> PathBuf {
        match &self.out_dir {
            Some(dir) => self.resolve_path(dir),
            None => self.base_dir.clone(),
        }
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log_dir.as_ref().map(|dir| self.resolve_path(dir))
    }

    /// Staging store descriptor, defaulting to `~/.ddiff/ddiff.duckdb`
    pub fn staging(&self) -> Result<SourceDescriptor> {
        if let Some(staging) = &self.staging {
            return Ok(staging.clone());
        }
        let home = dirs::home_dir().ok_or_else(|| {
            DdiffError::staging("No home directory found for the default staging store")
        })?;
        Ok(SourceDescriptor::duckdb(
            home.join(".ddiff").join("ddiff.duckdb").to_string_lossy(),
        ))
    }

    /// Follow aliases to the name of the source that owns the connection
    pub fn canonical_source<'a>(&'a self, name: &'a str) -> Result<&'a str> {
        let mut current = name;
        for _ in 0..=self.sources.len() {
            match self.sources.get(current) {
                Some(SourceEntry::Alias(alias)) => current = alias.alias.as_str(),
                Some(SourceEntry::Connection(_)) => return Ok(current),
                None => {
                    return Err(DdiffError::config(format!(
                        "Unknown source '{}' (referenced as '{}')",
                        current, name
                    )))
                }
            }
        }
        Err(DdiffError::config(format!("Alias cycle for source '{}'", name)))
    }

    /// Connection descriptor of a source, aliases resolved
    pub fn source_descriptor(&self, name: &str) -> Result<&SourceDescriptor> {
        let canonical = self.canonical_source(name)?;
        match self.sources.get(canonical) {
            Some(SourceEntry::Connection(descriptor)) => Ok(descriptor),
            _ => Err(DdiffError::config(format!("Unknown source '{}'", name))),
        }
    }

    pub fn has_source(&self, name: &str) -> bool {
        self.canonical_source(name).is_ok()
    }

    /// Specs whose name or one of whose tags equals the selector
    pub fn select_specs(&self, selector: &str) -> Result<Vec<(&str, &serde_yaml::Value)>> {
        let selected: Vec<(&str, &serde_yaml::Value)> = self
            .specs
            .iter()
            .filter(|(name, spec)| {
                selector == SELECT_ALL
                    || name.as_str() == selector
                    || spec_tags(spec).any(|tag| tag == selector)
            })
            .map(|(name, spec)| (name.as_str(), spec))
            .collect();

        if selected.is_empty() && selector != SELECT_ALL {
            return Err(DdiffError::invalid_input(format!(
                "Spec or tag '{}' not found in config '{}'",
                selector, self.name
            )));
        }
        Ok(selected)
    }
}

/// Tags of a raw spec entry; entries too malformed to carry tags have none
fn spec_tags(spec: &serde_yaml::Value) -> impl Iterator<Item = &str> {
    spec.get("tags")
        .and_then(serde_yaml::Value::as_sequence)
        .into_iter()
        .flatten()
        .filter_map(serde_yaml::Value::as_str)
}

pub(crate) fn resolve_relative(base_dir: &Path, path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Substitute `{VAR_NAME}` placeholders with environment variables
pub fn substitute_env_vars(text: &str) -> Result<String> {
    let mut result = text.to_string();

    let mut start = 0;
    while let Some(open_pos) = result[start..].find('{') {
        let open_pos = start + open_pos;
        let Some(close_pos) = result[open_pos..].find('}') else {
            break;
        };
        let close_pos = open_pos + close_pos;
        let var_name = &result[open_pos + 1..close_pos];

        if var_name.is_empty() || !var_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            start = open_pos + 1;
            continue;
        }

        let var_value = env::var(var_name).map_err(|_| {
            DdiffError::config(format!("Environment variable '{}' not found", var_name))
        })?;

        result.replace_range(open_pos..=close_pos, &var_value);
        start = open_pos + var_value.len();
    }

    Ok(result)
}
