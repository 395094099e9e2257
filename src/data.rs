//! Rendering of engine values as comparable text

use crate::error::{DdiffError, Result};
use chrono::{DateTime, NaiveDate, NaiveTime};
use duckdb::types::{TimeUnit, ValueRef};

/// One fetched row, every value rendered as text (`None` is SQL NULL)
pub type TextRow = Vec<Option<String>>;

/// Read `width` columns of a DuckDB row as text
pub fn read_row(row: &duckdb::Row, width: usize) -> Result<TextRow> {
    let mut values = Vec::with_capacity(width);
    for index in 0..width {
        let value = row.get_ref(index).map_err(|e| {
            DdiffError::source("", format!("Failed to get value at index {}: {}", index, e))
        })?;
        values.push(value_to_text(value));
    }
    Ok(values)
}

/// Render a single value the same way regardless of the engine it came from.
///
/// Decimals lose trailing zeros, temporal values use ISO formats, and NULL
/// stays NULL so a missing value never equals an empty string.
pub fn value_to_text(value: ValueRef<'_>) -> Option<String> {
    let text = match value {
        ValueRef::Null => return None,
        ValueRef::Boolean(b) => b.to_string(),
        ValueRef::TinyInt(i) => i.to_string(),
        ValueRef::SmallInt(i) => i.to_string(),
        ValueRef::Int(i) => i.to_string(),
        ValueRef::BigInt(i) => i.to_string(),
        ValueRef::HugeInt(i) => i.to_string(),
        ValueRef::UTinyInt(i) => i.to_string(),
        ValueRef::USmallInt(i) => i.to_string(),
        ValueRef::UInt(i) => i.to_string(),
        ValueRef::UBigInt(i) => i.to_string(),
        ValueRef::Float(f) => f.to_string(),
        ValueRef::Double(f) => f.to_string(),
        ValueRef::Decimal(d) => d.normalize().to_string(),
        ValueRef::Text(s) => String::from_utf8_lossy(s).to_string(),
        ValueRef::Blob(b) => format!("<blob:{} bytes>", b.len()),
        ValueRef::Date32(days) => format_date(days),
        ValueRef::Time64(unit, t) => format_time(to_micros(unit, t)),
        ValueRef::Timestamp(unit, ts) => format_timestamp(to_micros(unit, ts)),
        other => format!("{:?}", other),
    };
    Some(text)
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

fn format_date(days: i32) -> String {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days as i64)))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| days.to_string())
}

fn format_time(micros: i64) -> String {
    let secs = micros.div_euclid(1_000_000) as u32;
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .map(|t| t.format("%H:%M:%S%.f").to_string())
        .unwrap_or_else(|| micros.to_string())
}

fn format_timestamp(micros: i64) -> String {
    DateTime::from_timestamp_micros(micros)
        .map(|ts| ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string())
        .unwrap_or_else(|| micros.to_string())
}

/// Render a YAML scalar from a config file as text (used for static parameter rows)
pub fn yaml_scalar_to_text(value: &serde_yaml::Value) -> Result<Option<String>> {
    match value {
        serde_yaml::Value::Null => Ok(None),
        serde_yaml::Value::Bool(b) => Ok(Some(b.to_string())),
        serde_yaml::Value::Number(n) => Ok(Some(n.to_string())),
        serde_yaml::Value::String(s) => Ok(Some(s.clone())),
        other => Err(DdiffError::config(format!(
            "Parameter values must be scalars, got: {:?}",
            other
        ))),
    }
}
