//! Spec and run reports

use crate::cli::PassMode;
use crate::error::Result;
use crate::selector::DiscrepancyRow;
use crate::staging::RunId;
use minijinja::{context, Environment};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// How a spec ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpecResult {
    Clean,
    Discrepancies { count: usize },
    FailedToRun { error: String },
}

impl SpecResult {
    /// 0 when clean, the discrepancy count, or -1 when the spec failed to run
    pub fn code(&self) -> i64 {
        match self {
            Self::Clean => 0,
            Self::Discrepancies { count } => *count as i64,
            Self::FailedToRun { .. } => -1,
        }
    }

    pub fn from_count(count: usize) -> Self {
        if count == 0 {
            Self::Clean
        } else {
            Self::Discrepancies { count }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpecOutcome {
    pub name: String,
    pub safe_name: String,
    pub sources: Option<[String; 2]>,
    pub doc: Option<String>,
    pub result: SpecResult,
    pub warnings: Vec<String>,
    /// Compared spec levels, more than 1 after drilling down
    pub invocations: usize,
    pub report: Option<PathBuf>,
}

impl SpecOutcome {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            safe_name: safe_name(name),
            sources: None,
            doc: None,
            result: SpecResult::Clean,
            warnings: Vec::new(),
            invocations: 0,
            report: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub cfg: String,
    pub run: RunId,
    pub mode: PassMode,
    pub specs: Vec<SpecOutcome>,
    pub report: Option<PathBuf>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.count(|r| matches!(r, SpecResult::Clean))
    }

    pub fn failed(&self) -> usize {
        self.count(|r| matches!(r, SpecResult::Discrepancies { .. }))
    }

    pub fn not_run(&self) -> usize {
        self.count(|r| matches!(r, SpecResult::FailedToRun { .. }))
    }

    fn count(&self, predicate: impl Fn(&SpecResult) -> bool) -> usize {
        self.specs.iter().filter(|s| predicate(&s.result)).count()
    }

    pub fn outcome(&self, name: &str) -> Option<&SpecOutcome> {
        self.specs.iter().find(|s| s.name == name)
    }
}

/// One cell of a report row: a key value, or both sides of a value column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReportCell {
    Key {
        value: Option<String>,
    },
    Pair {
        left: Option<String>,
        right: Option<String>,
        differs: bool,
    },
}

/// Everything a renderer needs for one spec with discrepancies
#[derive(Debug, Serialize)]
pub struct SpecReport<'a> {
    pub cfg: &'a str,
    pub run: i64,
    pub started: String,
    pub spec: &'a str,
    pub doc: Option<&'a str>,
    pub sources: &'a [String; 2],
    pub titles: Vec<String>,
    pub rows: Vec<Vec<ReportCell>>,
    pub warnings: &'a [String],
}

impl SpecReport<'_> {
    pub fn cells(rows: &[DiscrepancyRow]) -> Vec<Vec<ReportCell>> {
        rows.iter()
            .map(|row| {
                let keys = row.keys.iter().map(|k| ReportCell::Key { value: k.clone() });
                let pairs = row.values.iter().map(|p| ReportCell::Pair {
                    left: p.left.clone(),
                    right: p.right.clone(),
                    differs: p.differs(),
                });
                keys.chain(pairs).collect()
            })
            .collect()
    }
}

/// Turns report data into a document
pub trait ReportRenderer {
    fn extension(&self) -> &'static str;
    fn render_spec(&self, report: &SpecReport<'_>) -> Result<String>;
    fn render_run(&self, summary: &RunSummary) -> Result<String>;
}

const SPEC_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{{ cfg }}: {{ spec }}</title>
<style>
body { font-family: sans-serif; font-size: 13px; }
table { border-collapse: collapse; }
th, td { border: 1px solid #ccc; padding: 2px 6px; }
th { background: #eee; }
td.key { font-weight: bold; }
td.diff { background: #fdd; }
.found { color: red; }
.warning { color: #b60; }
</style>
</head>
<body>
<h3>{{ cfg }}: {{ spec }}</h3>
{% if doc %}<p>{{ doc }}</p>
{% endif %}<p>{{ started }}. DB1 = {{ sources[0] }}, DB2 = {{ sources[1] }}. <span class="found">Found {{ rows|length }} discrepancies.</span></p>
{% for warning in warnings %}<p class="warning">{{ warning }}</p>
{% endfor %}<table>
<tr>{% for title in titles %}<th>{{ title }}</th>{% endfor %}</tr>
{% for row in rows %}<tr>{% for cell in row %}{% if cell.kind == "key" %}<td class="key">{{ cell.value if cell.value is not none else "[NULL]" }}</td>{% else %}<td class="{{ 'diff' if cell.differs else 'same' }}">{{ cell.left if cell.left is not none else "[NULL]" }}</td><td class="{{ 'diff' if cell.differs else 'same' }}">{{ cell.right if cell.right is not none else "[NULL]" }}</td>{% endif %}{% endfor %}</tr>
{% endfor %}</table>
</body>
</html>
"#;

const RUN_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{{ summary.cfg }}</title>
<style>
body { font-family: sans-serif; font-size: 13px; }
table { border-collapse: collapse; }
th, td { border: 1px solid #ccc; padding: 2px 6px; }
th { background: #eee; }
.clean { color: green; }
.discrepancies { color: red; }
.failed_to_run { color: #b60; }
</style>
</head>
<body>
<h3>{{ summary.cfg }}</h3>
<p>Run {{ summary.run.id }}, {{ started }}. Succeeded: {{ succeeded }}, failed: {{ failed }}, failed to run: {{ not_run }}.</p>
<table>
<tr><th>Spec</th><th>Result</th><th>DB1</th><th>DB2</th><th>Warnings</th><th>Doc</th></tr>
{% for spec in summary.specs %}<tr>
<td>{% if spec.report %}<a href="{{ summary.cfg }}_{{ spec.safe_name }}.{{ extension }}">{{ spec.name }}</a>{% else %}{{ spec.name }}{% endif %}</td>
<td class="{{ spec.result.status }}">{% if spec.result.status == "clean" %}OK{% elif spec.result.status == "discrepancies" %}{{ spec.result.count }}{% else %}failed to run{% endif %}</td>
<td>{{ spec.sources[0] if spec.sources else "" }}</td>
<td>{{ spec.sources[1] if spec.sources else "" }}</td>
<td>{{ spec.warnings|join(" ") }}</td>
<td>{{ spec.doc if spec.doc else "" }}</td>
</tr>
{% endfor %}</table>
</body>
</html>
"#;

/// HTML reports rendered with auto-escaping templates
pub struct HtmlRenderer {
    env: Environment<'static>,
}

impl HtmlRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("spec.html", SPEC_TEMPLATE)?;
        env.add_template("run.html", RUN_TEMPLATE)?;
        Ok(Self { env })
    }
}

impl ReportRenderer for HtmlRenderer {
    fn extension(&self) -> &'static str {
        "html"
    }

    fn render_spec(&self, report: &SpecReport<'_>) -> Result<String> {
        Ok(self.env.get_template("spec.html")?.render(report)?)
    }

    fn render_run(&self, summary: &RunSummary) -> Result<String> {
        let template = self.env.get_template("run.html")?;
        Ok(template.render(context! {
            summary => summary,
            started => format_started(&summary.run),
            succeeded => summary.succeeded(),
            failed => summary.failed(),
            not_run => summary.not_run(),
            extension => self.extension(),
        })?)
    }
}

pub fn format_started(run: &RunId) -> String {
    run.started.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// File-system safe form of a spec name
pub fn safe_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || "_. -()[]".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect();
    replaced
        .trim_end_matches(&['.', ' '][..])
        .trim_start()
        .to_string()
}

/// Writes rendered reports into the output directory
pub struct ReportGenerator {
    out_dir: PathBuf,
    renderer: Box<dyn ReportRenderer>,
}

impl ReportGenerator {
    pub fn new(out_dir: &Path) -> Result<Self> {
        Ok(Self::with_renderer(out_dir, Box::new(HtmlRenderer::new()?)))
    }

    pub fn with_renderer(out_dir: &Path, renderer: Box<dyn ReportRenderer>) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
            renderer,
        }
    }

    /// `{out_dir}/{cfg}_{safe_name}.html`
    pub fn spec_report_path(&self, cfg: &str, safe_name: &str) -> PathBuf {
        self.out_dir
            .join(format!("{}_{}.{}", cfg, safe_name, self.renderer.extension()))
    }

    /// `{out_dir}/{cfg}.html`
    pub fn run_report_path(&self, cfg: &str) -> PathBuf {
        self.out_dir
            .join(format!("{}.{}", cfg, self.renderer.extension()))
    }

    pub fn write_spec(&self, report: &SpecReport<'_>, safe_name: &str) -> Result<PathBuf> {
        let path = self.spec_report_path(report.cfg, safe_name);
        self.write(&path, &self.renderer.render_spec(report)?)?;
        Ok(path)
    }

    pub fn write_run(&self, summary: &RunSummary) -> Result<PathBuf> {
        let path = self.run_report_path(&summary.cfg);
        self.write(&path, &self.renderer.render_run(summary)?)?;
        Ok(path)
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        fs::create_dir_all(&self.out_dir)?;
        fs::write(path, content)?;
        log::info!("Report written to {}", path.display());
        Ok(())
    }
}
