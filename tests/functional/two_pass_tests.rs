//! Two-pass runs: pass 1 stores discrepancies, pass 2 reports the reproduced ones

use crate::common::{outcome, TestFixture};
use ddiff::cli::PassMode;
use ddiff::SpecResult;

/// Specs whose timestamps move by `shift` seconds between passes
fn moving_clock(shift: u32) -> String {
    let left = format!("2024-01-01 10:00:{:02}", shift);
    let right = format!("2024-01-01 10:00:{:02}", shift + 5);
    format!(
        r#"specs:
  clock:
    pk: [id]
    queries:
      - "select 1 as id, timestamp '{left}' as ts"
      - "select 1 as id, timestamp '{right}' as ts"
  stable:
    pk: [id]
    queries:
      - "select 1 as id, 5 as amount, timestamp '{left}' as ts union all select 2, 7, timestamp '{left}'"
      - "select 1 as id, 6 as amount, timestamp '{right}' as ts union all select 2, 7, timestamp '{right}'"
  one_sided:
    pk: [id]
    queries:
      - "select 1 as id, timestamp '{left}' as ts union all select 4, timestamp '{left}'"
      - "select 1 as id, timestamp '{left}' as ts"
  gone:
    pk: [id]
    queries:
      - "select 1 as id where {shift} = 0"
      - "select 1 as id where {shift} > 100"
"#
    )
}

#[test]
fn test_moving_values_are_not_confirmed() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture.write_config("twopass", &moving_clock(0)).unwrap();

    let first = fixture.run(&path, "all", PassMode::Mark).unwrap();
    assert_eq!(
        outcome(&first, "clock").result,
        SpecResult::Discrepancies { count: 1 }
    );
    assert_eq!(
        outcome(&first, "stable").result,
        SpecResult::Discrepancies { count: 2 }
    );

    fixture.write_config("twopass", &moving_clock(1)).unwrap();
    let second = fixture.run(&path, "all", PassMode::Confirm).unwrap();
    assert_ne!(first.run.id, second.run.id);

    // only the amount of id 1 differs the same way in both passes
    assert_eq!(outcome(&second, "clock").result, SpecResult::Clean);
    assert_eq!(
        outcome(&second, "stable").result,
        SpecResult::Discrepancies { count: 1 }
    );

    let report = fixture.read_out("twopass_stable.html").unwrap();
    assert!(report.contains("Found 1 discrepancies."));
    assert!(report.contains("10:00:01"));
    assert!(!fixture.out_dir().join("twopass_clock.html").exists());
}

#[test]
fn test_vanished_discrepancies_are_clean() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture.write_config("twopass", &moving_clock(0)).unwrap();

    let first = fixture.run(&path, "gone", PassMode::Mark).unwrap();
    assert_eq!(
        outcome(&first, "gone").result,
        SpecResult::Discrepancies { count: 1 }
    );

    fixture.write_config("twopass", &moving_clock(1)).unwrap();
    let second = fixture.run(&path, "gone", PassMode::Confirm).unwrap();
    assert_eq!(outcome(&second, "gone").result, SpecResult::Clean);
}

#[test]
fn test_stable_discrepancies_survive_both_passes() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture
        .write_config(
            "stable",
            r#"specs:
  tables:
    sources: [ONE, TWO]
    pk: [id]
    queries: ["select id, name, amount from t", "select id, name, amount from t"]
"#,
        )
        .unwrap();

    let single = fixture.run(&path, "tables", PassMode::Single).unwrap();
    fixture.run(&path, "tables", PassMode::Mark).unwrap();
    let confirmed = fixture.run(&path, "tables", PassMode::Confirm).unwrap();

    assert_eq!(
        outcome(&single, "tables").result,
        outcome(&confirmed, "tables").result
    );
}

#[test]
fn test_first_pass_writes_no_reports() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture.write_config("twopass", &moving_clock(0)).unwrap();

    let first = fixture.run(&path, "all", PassMode::Mark).unwrap();
    assert!(first.report.is_none());
    assert!(outcome(&first, "stable").report.is_none());
    assert!(!fixture.out_dir().join("twopass.html").exists());
    assert!(!fixture.out_dir().join("twopass_stable.html").exists());
}

#[test]
fn test_second_pass_without_first_skips_queries() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture
        .write_config(
            "skipped",
            r#"specs:
  unqueried:
    pk: [id]
    queries: ["select id from no_such_table", "select id from no_such_table"]
"#,
        )
        .unwrap();

    let summary = fixture.run(&path, "all", PassMode::Confirm).unwrap();
    let unqueried = outcome(&summary, "unqueried");
    assert_eq!(unqueried.result, SpecResult::Clean);
    assert_eq!(unqueried.invocations, 0);
}

#[test]
fn test_second_pass_forgets_stored_discrepancies() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture.write_config("twopass", &moving_clock(0)).unwrap();

    fixture.run(&path, "stable", PassMode::Mark).unwrap();
    let confirmed = fixture.run(&path, "stable", PassMode::Confirm).unwrap();
    assert_eq!(
        outcome(&confirmed, "stable").result,
        SpecResult::Discrepancies { count: 2 }
    );

    let staging = fixture.staging().unwrap();
    assert!(!staging.has_persisted("twopass", "stable").unwrap());

    let again = fixture.run(&path, "stable", PassMode::Confirm).unwrap();
    assert_eq!(outcome(&again, "stable").result, SpecResult::Clean);
}

#[test]
fn test_one_sided_key_with_moving_value_is_confirmed() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture.write_config("twopass", &moving_clock(0)).unwrap();

    let first = fixture.run(&path, "one_sided", PassMode::Mark).unwrap();
    assert_eq!(
        outcome(&first, "one_sided").result,
        SpecResult::Discrepancies { count: 1 }
    );

    // id 4 is still missing on the right even though its timestamp moved
    fixture.write_config("twopass", &moving_clock(1)).unwrap();
    let second = fixture.run(&path, "one_sided", PassMode::Confirm).unwrap();
    assert_eq!(
        outcome(&second, "one_sided").result,
        SpecResult::Discrepancies { count: 1 }
    );
    let report = fixture.read_out("twopass_one_sided.html").unwrap();
    assert!(report.contains(r#"<td class="key">4</td>"#));
}

#[test]
fn test_one_sided_key_with_null_values_is_confirmed() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture
        .write_config(
            "nulls",
            r#"specs:
  null_valued:
    pk: [id]
    queries:
      - "select 1 as id, null::varchar as v union all select 3, null::varchar"
      - "select 1 as id, null::varchar as v"
"#,
        )
        .unwrap();

    let single = fixture.run(&path, "null_valued", PassMode::Single).unwrap();
    assert_eq!(
        outcome(&single, "null_valued").result,
        SpecResult::Discrepancies { count: 1 }
    );

    fixture.run(&path, "null_valued", PassMode::Mark).unwrap();
    let confirmed = fixture.run(&path, "null_valued", PassMode::Confirm).unwrap();
    assert_eq!(
        outcome(&single, "null_valued").result,
        outcome(&confirmed, "null_valued").result
    );
}
