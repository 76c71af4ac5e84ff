//! Input normalization
//!
//! Turns loosely-typed JSON objects (spreadsheet exports, form posts) into
//! typed catalog values. Full mode produces every catalog field; partial
//! mode produces only the keys that were sent.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use shared::error::{AppError, ErrorCode};
use shared::models::{
    AMOUNT_FIELDS, BUSINESS_FIELDS, BusinessInput, BusinessPatch, FieldKind, FieldValue,
    MAX_AMOUNT, RowError, field_spec,
};
use std::collections::BTreeMap;
use unicode_normalization::UnicodeNormalization;

/// Largest spreadsheet serial accepted as a date (9999-12-31)
const MAX_SERIAL_DAY: f64 = 2_958_465.0;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("row is not a JSON object")]
    NotAnObject,
    #[error("business_name is required")]
    EmptyName,
    #[error("invalid date in {field}: {value}")]
    InvalidDate { field: &'static str, value: String },
    #[error("amount out of range in {field}: {value}")]
    AmountOutOfRange { field: &'static str, value: i64 },
}

/// NFC-normalize and trim
pub fn normalize_text(raw: &str) -> String {
    raw.trim().nfc().collect::<String>()
}

fn text_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => normalize_text(s),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => normalize_text(&other.to_string()),
    }
}

/// Parse-or-default-0 integer coercion
pub(crate) fn int_value(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => parse_int_text(s).unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn parse_int_text(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<i64>().ok().or_else(|| {
        cleaned
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
    })
}

/// Date coercion: `Ok(None)` for empty markers, `Err(())` when unparseable
pub(crate) fn date_value(value: &Value) -> Result<Option<NaiveDate>, ()> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_f64().ok_or(()).and_then(serial_to_date).map(Some),
        Value::String(s) => parse_date_text(s),
        _ => Err(()),
    }
}

fn parse_date_text(raw: &str) -> Result<Option<NaiveDate>, ()> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("null") || s.eq_ignore_ascii_case("undefined") {
        return Ok(None);
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(Some(date));
        }
    }
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(s, "%Y%m%d")
            .map(Some)
            .map_err(|_| ());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Some(dt.date_naive()));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Some(dt.date()));
        }
    }
    match s.parse::<f64>() {
        Ok(serial) => serial_to_date(serial).map(Some),
        Err(_) => Err(()),
    }
}

/// Spreadsheet serial day (1900 date system, epoch 1899-12-30)
fn serial_to_date(serial: f64) -> Result<NaiveDate, ()> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_SERIAL_DAY {
        return Err(());
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).ok_or(())?;
    epoch
        .checked_add_days(Days::new(serial.trunc() as u64))
        .ok_or(())
}

fn field_value(
    name: &'static str,
    kind: FieldKind,
    value: &Value,
) -> Result<FieldValue, NormalizeError> {
    Ok(match kind {
        FieldKind::Text => FieldValue::Text(text_value(value)),
        FieldKind::Int => FieldValue::Int(Some(bounded_int(name, int_value(value))?)),
        FieldKind::Date => FieldValue::Date(date_value(value).map_err(|_| {
            NormalizeError::InvalidDate {
                field: name,
                value: value_preview(value),
            }
        })?),
    })
}

/// Money columns must lie in `0..=MAX_AMOUNT`
fn bounded_int(name: &'static str, value: i64) -> Result<i64, NormalizeError> {
    if AMOUNT_FIELDS.contains(&name) && !(0..=MAX_AMOUNT).contains(&value) {
        return Err(NormalizeError::AmountOutOfRange { field: name, value });
    }
    Ok(value)
}

fn value_preview(value: &Value) -> String {
    match value {
        Value::String(s) => s.chars().take(40).collect(),
        other => other.to_string().chars().take(40).collect(),
    }
}

/// Full-mode normalization of one row
pub fn normalize_row(value: &Value) -> Result<BusinessInput, NormalizeError> {
    let obj = value.as_object().ok_or(NormalizeError::NotAnObject)?;
    let business_name = obj.get("business_name").map(text_value).unwrap_or_default();
    if business_name.is_empty() {
        return Err(NormalizeError::EmptyName);
    }

    let mut fields = BTreeMap::new();
    for spec in BUSINESS_FIELDS {
        let value = match obj.get(spec.name) {
            Some(raw) => field_value(spec.name, spec.kind, raw)?,
            None => FieldValue::default_for(spec.kind),
        };
        fields.insert(spec.name, value);
    }

    Ok(BusinessInput {
        business_name,
        fields,
    })
}

/// Normalize a whole upload; invalid rows become row errors, never a
/// request failure.
pub fn normalize_batch(rows: &[Value]) -> (Vec<BusinessInput>, Vec<RowError>) {
    let mut valid = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        match normalize_row(row) {
            Ok(input) => valid.push(input),
            Err(e) => {
                let business_name = row
                    .get("business_name")
                    .map(text_value)
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| format!("(row {})", index + 1));
                errors.push(RowError {
                    business_name,
                    error: e.to_string(),
                });
            }
        }
    }

    (valid, errors)
}

/// Partial-mode normalization for `PUT /api/businesses/{id}`.
///
/// Explicit `null` clears integer and date fields and empties text fields.
pub fn normalize_patch(obj: &Map<String, Value>) -> Result<BusinessPatch, AppError> {
    let mut patch = BusinessPatch::default();

    for (key, raw) in obj {
        match key.as_str() {
            "business_name" => {
                let name = text_value(raw);
                if name.is_empty() {
                    return Err(AppError::new(ErrorCode::BusinessNameRequired));
                }
                patch.business_name = Some(name);
            }
            "is_active" => {
                let active = match raw {
                    Value::Bool(b) => *b,
                    Value::Null => continue,
                    other => int_value(other) != 0,
                };
                patch.is_active = Some(active);
            }
            other => {
                let Some(spec) = field_spec(other) else {
                    continue;
                };
                let value = match (spec.kind, raw) {
                    (FieldKind::Int, Value::Null) => FieldValue::Int(None),
                    (kind, raw) => field_value(spec.name, kind, raw).map_err(|e| {
                        let code = match e {
                            NormalizeError::AmountOutOfRange { .. } => ErrorCode::ValueOutOfRange,
                            _ => ErrorCode::InvalidFormat,
                        };
                        AppError::with_message(code, e.to_string()).with_detail("field", spec.name)
                    })?,
                };
                patch.fields.insert(spec.name, value);
            }
        }
    }

    Ok(patch)
}
