//! Broken specs fail on their own and leave the rest of the run alone

use crate::common::{outcome, TestFixture};
use ddiff::cli::PassMode;
use ddiff::{DdiffError, SpecResult};

const BROKEN: &str = r#"specs:
  ok:
    pk: [id]
    queries: ["select 1 as id, 'a' as v", "select 1 as id, 'a' as v"]
  mismatch:
    pk: [id]
    queries: ["select 1 as id, 2 as v", "select 1 as id"]
  bad_op:
    pk: [id]
    op: "<>"
    queries: ["select 1 as id", "select 1 as id"]
  unknown_source:
    sources: [ONE, THREE]
    pk: [id]
    queries: ["select 1 as id", "select 1 as id"]
  missing_key:
    pk: [code]
    queries: ["select 1 as id", "select 1 as id"]
  missing_table:
    pk: [id]
    queries: ["select id from no_such_table", "select 1 as id"]
  one_query:
    pk: [id]
    queries: ["select 1 as id"]
  last:
    pk: [id]
    queries: ["select 1 as id", "select 2 as id"]
"#;

fn failed_to_run(result: &SpecResult) -> bool {
    matches!(result, SpecResult::FailedToRun { .. })
}

#[test]
fn test_failures_are_isolated() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture.write_config("broken", BROKEN).unwrap();

    let summary = fixture.run(&path, "all", PassMode::Single).unwrap();
    assert_eq!(summary.specs.len(), 8);
    assert_eq!(outcome(&summary, "ok").result, SpecResult::Clean);
    assert_eq!(
        outcome(&summary, "last").result,
        SpecResult::Discrepancies { count: 2 }
    );
    for name in [
        "mismatch",
        "bad_op",
        "unknown_source",
        "missing_key",
        "missing_table",
        "one_query",
    ] {
        assert!(failed_to_run(&outcome(&summary, name).result), "{} should fail", name);
    }
    assert_eq!(summary.not_run(), 6);
}

#[test]
fn test_failure_messages() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture.write_config("broken", BROKEN).unwrap();
    let summary = fixture.run(&path, "all", PassMode::Single).unwrap();

    let error = |name: &str| match &outcome(&summary, name).result {
        SpecResult::FailedToRun { error } => error.clone(),
        other => panic!("{} did not fail: {:?}", name, other),
    };
    assert!(error("mismatch").starts_with("Schema mismatch"));
    assert!(error("bad_op").starts_with("Configuration error"));
    assert!(error("unknown_source").contains("THREE"));
    assert!(error("missing_key").contains("code"));
    assert!(error("missing_table").contains("no_such_table"));
}

#[test]
fn test_failed_specs_in_run_report() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture.write_config("broken", BROKEN).unwrap();
    fixture.run(&path, "all", PassMode::Single).unwrap();

    let report = fixture.read_out("broken.html").unwrap();
    assert!(report.contains(r#"<td class="failed_to_run">failed to run</td>"#));
    assert!(report.contains("failed to run: 6"));
}

#[test]
fn test_unknown_selector() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture.write_config("broken", BROKEN).unwrap();

    let err = fixture.run(&path, "nothing_like_this", PassMode::Single).unwrap_err();
    assert!(matches!(err, DdiffError::InvalidInput { .. }));
}

#[test]
fn test_disabled_spec_is_not_selectable() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture
        .write_config(
            "disabled",
            r#"specs:
  "--off":
    pk: [id]
    queries: ["select id from no_such_table", "select 1 as id"]
  "on":
    pk: [id]
    queries: ["select 1 as id", "select 1 as id"]
"#,
        )
        .unwrap();

    let summary = fixture.run(&path, "all", PassMode::Single).unwrap();
    assert_eq!(summary.specs.len(), 1);
    assert!(summary.outcome("--off").is_none());

    let err = fixture.run(&path, "--off", PassMode::Single).unwrap_err();
    assert!(matches!(err, DdiffError::InvalidInput { .. }));
}

#[test]
fn test_no_sources_anywhere() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture
        .write_raw_config(
            "bare",
            r#"staging: { engine: duckdb, target: staging.duckdb }
out_dir: out
specs:
  orphan:
    pk: [id]
    queries: ["select 1 as id", "select 1 as id"]
"#,
        )
        .unwrap();

    let summary = fixture.run(&path, "all", PassMode::Single).unwrap();
    assert!(failed_to_run(&outcome(&summary, "orphan").result));
    assert_eq!(outcome(&summary, "orphan").sources, None);
}

#[test]
fn test_too_many_columns() {
    let fixture = TestFixture::new().unwrap();
    let columns: Vec<String> = (0..51).map(|i| format!("{} as c{}", i, i)).collect();
    let query = format!("select {}", columns.join(", "));
    let path = fixture
        .write_config(
            "wide",
            &format!("specs:\n  wide:\n    pk: [c0]\n    queries: [\"{q}\", \"{q}\"]\n", q = query),
        )
        .unwrap();

    let summary = fixture.run(&path, "wide", PassMode::Single).unwrap();
    assert!(failed_to_run(&outcome(&summary, "wide").result));
}

#[test]
fn test_null_differs_from_empty_string() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture
        .write_config(
            "values",
            r#"specs:
  empty:
    pk: [id]
    queries: ["select 1 as id, null::varchar as v", "select 1 as id, '' as v"]
  decimals:
    pk: [id]
    queries: ["select 1 as id, 1.50::decimal(10,2) as v", "select 1 as id, 1.5::decimal(10,1) as v"]
  null_keys:
    pk: [id]
    queries: ["select null::integer as id, 1 as v", "select null::integer as id, 1 as v"]
"#,
        )
        .unwrap();

    let summary = fixture.run(&path, "all", PassMode::Single).unwrap();
    assert_eq!(
        outcome(&summary, "empty").result,
        SpecResult::Discrepancies { count: 1 }
    );
    assert_eq!(outcome(&summary, "decimals").result, SpecResult::Clean);
    assert_eq!(outcome(&summary, "null_keys").result, SpecResult::Clean);
}

#[test]
fn test_spec_teardown_runs_after_failure() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture
        .write_config(
            "teardown",
            r#"specs:
  first:
    pk: [id]
    setup: ["create table scratch as select 1 as id"]
    teardown: ["drop table scratch"]
    queries: ["select id, 1 as v from scratch", "select id from scratch"]
  second:
    pk: [id]
    setup: ["create table scratch as select 2 as id"]
    teardown: ["drop table scratch"]
    queries: ["select id from scratch", "select id from scratch"]
"#,
        )
        .unwrap();

    // the failed spec's setup is rolled back, so the second can create the table again
    let summary = fixture.run(&path, "all", PassMode::Single).unwrap();
    assert!(failed_to_run(&outcome(&summary, "first").result));
    assert_eq!(outcome(&summary, "second").result, SpecResult::Clean);
}

#[test]
fn test_malformed_spec_fails_alone() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture
        .write_config(
            "shapes",
            r#"specs:
  good:
    tags: [nightly]
    pk: [id]
    queries: ["select 1 as id", "select 1 as id"]
  scalar_pk:
    tags: [nightly]
    pk: id
    queries: ["select 1 as id", "select 1 as id"]
  misspelled:
    pk: [id]
    querys: ["select 1 as id", "select 1 as id"]
  numeric_op:
    pk: [id]
    op: 5
    queries: ["select 1 as id", "select 1 as id"]
"#,
        )
        .unwrap();

    let summary = fixture.run(&path, "all", PassMode::Single).unwrap();
    assert_eq!(outcome(&summary, "good").result, SpecResult::Clean);
    for name in ["scalar_pk", "misspelled", "numeric_op"] {
        match &outcome(&summary, name).result {
            SpecResult::FailedToRun { error } => {
                assert!(error.starts_with("Configuration error"), "{}: {}", name, error)
            }
            other => panic!("{} did not fail: {:?}", name, other),
        }
    }
    assert_eq!(summary.not_run(), 3);

    let tagged = fixture.run(&path, "nightly", PassMode::Single).unwrap();
    assert_eq!(tagged.specs.len(), 2);
}
