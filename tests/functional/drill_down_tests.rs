//! Nested specs drilled down with the discrepancies of the coarser level

use crate::common::{outcome, TestFixture};
use ddiff::cli::PassMode;
use ddiff::SpecResult;

const NESTED: &str = r#"specs:
  levels:
    pk: [c1]
    queries:
      - "select 1 as c1, 2 as c2, 3 as c3, 4 as c4, 5 as c5"
      - "select 1 as c1, 2 as c2, 3 as c3, 4 as c4, 6 as c5"
    nested:
      pk: [c1, c2]
      queries:
        - "select 1 as c1, 2 as c2, 3 as c3, 4 as c4, 5 as c5 where 1 = {{ argrows[0][0] }}"
        - "select 1 as c1, 2 as c2, 3 as c3, 4 as c4, 6 as c5 where 1 = {{ argrows[0][0] }}"
      nested:
        pk: [c1, c2, c3]
        queries:
          - "select 1 as c1, 2 as c2, 3 as c3, 4 as c4, 5 as c5 where 2 = {{ argrows[0][1] }}"
          - "select 1 as c1, 2 as c2, 3 as c3, 4 as c4, 6 as c5 where 2 = {{ argrows[0][1] }}"
  by_keys:
    sources: [ONE, TWO]
    pk: [id]
    queries: ["select id, amount from t", "select id, amount from t"]
    nested:
      pk: [id]
      queries:
        - "select id, name, amount from t where id in ({% for r in argrows %}{{ r[0] }}{% if not loop.last %}, {% endif %}{% endfor %})"
        - "select id, name, amount from t where id in ({% for r in argrows %}{{ r[0] }}{% if not loop.last %}, {% endif %}{% endfor %})"
  quoted:
    pk: [id]
    queries:
      - "select 'x''y' as id, 1 as v"
      - "select 'x''y' as id, 2 as v"
    nested:
      pk: [id]
      queries:
        - "select * from (select 'x''y' as id, 1 as v, 'l' as side) s where id = {{ argrows[0][0] | quote }}"
        - "select * from (select 'x''y' as id, 2 as v, 'r' as side) s where id = {{ argrows[0][0] | quote }}"
"#;

#[test]
fn test_three_levels() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture.write_config("nested", NESTED).unwrap();

    let summary = fixture.run(&path, "levels", PassMode::Single).unwrap();
    let levels = outcome(&summary, "levels");
    assert_eq!(levels.result, SpecResult::Discrepancies { count: 1 });
    assert_eq!(levels.invocations, 3);
    assert!(levels.warnings.is_empty());

    // the report shows the innermost level's key columns
    let report = fixture.read_out("nested_levels.html").unwrap();
    assert!(report.contains("<th>c1</th><th>c2</th><th>c3</th><th>DB1 c4</th>"));
}

#[test]
fn test_nested_level_sees_only_coarse_keys() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture
        .write_config("nested", &format!("limits: {{ param_batch: 2 }}\n{}", NESTED))
        .unwrap();

    // amount differs for 3, 4 and 6 but not for 2, whose name differs
    let summary = fixture.run(&path, "by_keys", PassMode::Single).unwrap();
    let by_keys = outcome(&summary, "by_keys");
    assert_eq!(by_keys.result, SpecResult::Discrepancies { count: 3 });
    assert_eq!(by_keys.invocations, 2);
}

#[test]
fn test_quoted_parameters() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture.write_config("nested", NESTED).unwrap();

    let summary = fixture.run(&path, "quoted", PassMode::Single).unwrap();
    let quoted = outcome(&summary, "quoted");
    assert_eq!(quoted.result, SpecResult::Discrepancies { count: 1 });
    assert_eq!(quoted.invocations, 2);
}

#[test]
fn test_too_many_discrepancies_stop_drilling() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture
        .write_config("nested", &format!("limits: {{ drill_down_limit: 2 }}\n{}", NESTED))
        .unwrap();

    let summary = fixture.run(&path, "by_keys", PassMode::Single).unwrap();
    let by_keys = outcome(&summary, "by_keys");
    assert_eq!(by_keys.result, SpecResult::Discrepancies { count: 3 });
    assert_eq!(by_keys.invocations, 1);
    assert_eq!(
        by_keys.warnings,
        vec!["Found 3 discrepancies, go no deeper.".to_string()]
    );

    let report = fixture.read_out("nested_by_keys.html").unwrap();
    assert!(report.contains("Found 3 discrepancies, go no deeper."));
}

#[test]
fn test_two_pass_raises_drill_ceiling() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture
        .write_config("nested", &format!("limits: {{ drill_down_limit: 2 }}\n{}", NESTED))
        .unwrap();

    let summary = fixture.run(&path, "by_keys", PassMode::Mark).unwrap();
    let by_keys = outcome(&summary, "by_keys");
    assert_eq!(by_keys.invocations, 2);
    assert!(by_keys.warnings.is_empty());
}
