//! Spec model: the unit of comparison and its nested drill-down levels

use crate::data::{yaml_scalar_to_text, TextRow};
use crate::error::{DdiffError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A spec exactly as authored in the config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Spec {
    /// Two logical source names; falls back to the config's default sources
    #[serde(default)]
    pub sources: Option<Vec<String>>,

    #[serde(default)]
    pub queries: Vec<String>,

    #[serde(default)]
    pub pk: Vec<String>,

    /// `=`, `<` or `>`; validated when the spec runs so a bad value fails only this spec
    #[serde(default)]
    pub op: Option<String>,

    /// Finer-grained spec run with this level's discrepancies as parameters
    #[serde(default)]
    pub nested: Option<Box<Spec>>,

    #[serde(default)]
    pub setup: Vec<String>,

    #[serde(default)]
    pub teardown: Vec<String>,

    #[serde(default)]
    pub doc: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Static parameter rows for the top-level query templates
    #[serde(default)]
    pub argrows: Vec<Vec<serde_yaml::Value>>,
}

/// Set operation between the two result sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Op {
    /// Symmetric difference
    #[serde(rename = "=")]
    Equal,
    /// The first result set is expected to be contained in the second
    #[serde(rename = "<")]
    Subset,
    /// The second result set is expected to be contained in the first
    #[serde(rename = ">")]
    Superset,
}

impl Op {
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s.trim() {
            "=" => Ok(Self::Equal),
            "<" => Ok(Self::Subset),
            ">" => Ok(Self::Superset),
            _ => Err(format!("Invalid op '{}'. Valid options: =, <, >", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::Subset => "<",
            Self::Superset => ">",
        }
    }

    /// Whether rows present only in the first result set are reported
    pub fn reports_left_only(&self) -> bool {
        matches!(self, Self::Equal | Self::Subset)
    }

    /// Whether rows present only in the second result set are reported
    pub fn reports_right_only(&self) -> bool {
        matches!(self, Self::Equal | Self::Superset)
    }
}

/// A spec level validated and ready to run
#[derive(Debug, Clone)]
pub struct ResolvedSpec {
    pub name: String,
    pub sources: [String; 2],
    pub queries: [String; 2],
    /// Lower-cased key column names
    pub pk: Vec<String>,
    pub op: Op,
    /// Whether `op` was written explicitly (only then does a child inherit it)
    pub explicit_op: bool,
    pub nested: Option<Box<Spec>>,
    pub setup: Vec<String>,
    pub teardown: Vec<String>,
    pub doc: Option<String>,
    pub argrows: Vec<TextRow>,
    /// 0 for the top level, incremented per drill-down
    pub depth: usize,
}

impl Spec {
    /// Parse one raw config entry; shape errors are configuration errors of this spec
    pub fn from_value(name: &str, value: &serde_yaml::Value) -> Result<Self> {
        serde_yaml::from_value(value.clone())
            .map_err(|e| DdiffError::config(format!("Bad spec '{}': {}", name, e)))
    }

    /// Validate a top-level spec, falling back to `default_sources`
    pub fn resolve(
        &self,
        name: &str,
        default_sources: Option<&[String]>,
        known_source: &dyn Fn(&str) -> bool,
    ) -> Result<ResolvedSpec> {
        let sources = self
            .sources
            .as_deref()
            .or(default_sources)
            .ok_or_else(|| DdiffError::config(format!("Spec '{}' has no sources", name)))?;

        let argrows = self
            .argrows
            .iter()
            .map(|row| row.iter().map(yaml_scalar_to_text).collect::<Result<TextRow>>())
            .collect::<Result<Vec<_>>>()?;

        self.build(name, sources, self.op.as_deref(), argrows, 0, known_source)
    }

    fn build(
        &self,
        name: &str,
        sources: &[String],
        op: Option<&str>,
        argrows: Vec<TextRow>,
        depth: usize,
        known_source: &dyn Fn(&str) -> bool,
    ) -> Result<ResolvedSpec> {
        let bad = |msg: String| DdiffError::config(format!("Bad spec '{}': {}", name, msg));

        let sources: [String; 2] = sources
            .to_vec()
            .try_into()
            .map_err(|v: Vec<String>| bad(format!("expected 2 sources, got {}", v.len())))?;
        for source in &sources {
            if !known_source(source) {
                return Err(bad(format!("unknown source '{}'", source)));
            }
        }

        let queries: [String; 2] = self
            .queries
            .clone()
            .try_into()
            .map_err(|v: Vec<String>| bad(format!("expected 2 queries, got {}", v.len())))?;

        if self.pk.is_empty() {
            return Err(bad("pk must name at least one column".to_string()));
        }
        let pk: Vec<String> = self.pk.iter().map(|c| c.trim().to_lowercase()).collect();
        let mut seen = HashSet::new();
        if let Some(dup) = pk.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(bad(format!("duplicate pk column '{}'", dup)));
        }

        let explicit_op = op.is_some();
        let op = match op {
            Some(text) => Op::parse(text).map_err(bad)?,
            None => Op::Equal,
        };

        Ok(ResolvedSpec {
            name: name.to_string(),
            sources,
            queries,
            pk,
            op,
            explicit_op,
            nested: self.nested.clone(),
            setup: self.setup.clone(),
            teardown: self.teardown.clone(),
            doc: self.doc.clone(),
            argrows,
            depth,
        })
    }
}

impl ResolvedSpec {
    pub fn has_nested(&self) -> bool {
        self.nested.is_some()
    }

    /// The nested level, with sources and an explicit op inherited from this level
    pub fn child(
        &self,
        argrows: Vec<TextRow>,
        known_source: &dyn Fn(&str) -> bool,
    ) -> Result<Option<ResolvedSpec>> {
        let Some(nested) = &self.nested else {
            return Ok(None);
        };

        let sources = nested.sources.clone().unwrap_or_else(|| self.sources.to_vec());
        let op = match (&nested.op, self.explicit_op) {
            (Some(op), _) => Some(op.clone()),
            (None, true) => Some(self.op.as_str().to_string()),
            (None, false) => None,
        };

        let child = nested.build(
            &self.name,
            &sources,
            op.as_deref(),
            argrows,
            self.depth + 1,
            known_source,
        )?;
        Ok(Some(child))
    }

    /// Partition tags of the two sides; equal labels get a suffix on the second side
    pub fn source_tags(&self) -> [String; 2] {
        let left = self.sources[0].clone();
        let right = if self.sources[1] == self.sources[0] {
            format!("{} (2)", self.sources[1])
        } else {
            self.sources[1].clone()
        };
        [left, right]
    }
}

/// Which query of a spec is being pumped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn index(&self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }

    /// Label used in reports and warnings
    pub fn label(&self) -> &'static str {
        match self {
            Self::Left => "DB1",
            Self::Right => "DB2",
        }
    }
}

/// A result column and its 1-based position in the staged row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub position: usize,
}

/// Key and value column positions discovered from the first query executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnLayout {
    pub keys: Vec<Column>,
    pub values: Vec<Column>,
    pub width: usize,
}

impl ColumnLayout {
    /// Freeze the layout from result metadata, with keys listed in `pk` order
    pub fn discover(columns: &[String], pk: &[String]) -> Result<Self> {
        let names: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();

        if names.len() > crate::SNAPSHOT_WIDTH {
            return Err(DdiffError::config(format!(
                "Query returns {} columns, at most {} are supported",
                names.len(),
                crate::SNAPSHOT_WIDTH
            )));
        }

        let mut keys = Vec::with_capacity(pk.len());
        for key in pk {
            let position = names.iter().position(|n| n == key).ok_or_else(|| {
                DdiffError::config(format!(
                    "pk column '{}' not found in query columns [{}]",
                    key,
                    names.join(", ")
                ))
            })?;
            keys.push(Column {
                name: key.clone(),
                position: position + 1,
            });
        }

        let values: Vec<Column> = names
            .iter()
            .enumerate()
            .filter(|(_, n)| !pk.contains(n))
            .map(|(i, n)| Column {
                name: n.clone(),
                position: i + 1,
            })
            .collect();

        let persisted = keys.len() + 2 * values.len();
        if persisted > crate::PERSISTED_WIDTH {
            return Err(DdiffError::config(format!(
                "{} key and {} value columns need {} persisted columns, at most {} are supported",
                keys.len(),
                values.len(),
                persisted,
                crate::PERSISTED_WIDTH
            )));
        }

        Ok(Self {
            keys,
            values,
            width: names.len(),
        })
    }

    /// Check a later query's result metadata against the frozen layout
    pub fn check(&self, columns: &[String], side: Side) -> Result<()> {
        if columns.len() != self.width {
            return Err(DdiffError::schema_mismatch(format!(
                "{} query returns {} columns, expected {}",
                side.label(),
                columns.len(),
                self.width
            )));
        }
        Ok(())
    }

    /// Column titles of a discrepancy row: keys, then DB1/DB2 per value column
    pub fn titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = self.keys.iter().map(|c| c.name.clone()).collect();
        for column in &self.values {
            titles.push(format!("DB1 {}", column.name));
            titles.push(format!("DB2 {}", column.name));
        }
        titles
    }

    /// Width of a flattened discrepancy row
    pub fn flat_width(&self) -> usize {
        self.keys.len() + 2 * self.values.len()
    }
}
