//! Request validation from catalog column definitions.

use crate::config::{ColumnDef, ColumnType, TableDef};
use crate::error::AppError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Create,
    Update,
}

pub struct RequestValidator;

impl RequestValidator {
    /// Validate an add payload: every required column present, every field well-typed.
    /// Returns the payload with keys normalized and values coerced to the column types.
    pub fn validate_create(entity: &TableDef, body: Map<String, Value>) -> Result<Map<String, Value>, AppError> {
        let out = validate_fields(entity, body, Mode::Create)?;
        let missing: Vec<&str> = entity
            .columns
            .iter()
            .filter(|c| c.is_required() && !out.contains_key(c.name))
            .map(|c| c.name)
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }
        Ok(out)
    }

    /// Validate only the fields present in body (partial update). Required is not enforced for missing fields.
    pub fn validate_update(entity: &TableDef, body: Map<String, Value>) -> Result<Map<String, Value>, AppError> {
        validate_fields(entity, body, Mode::Update)
    }

    /// Typed value for a query-string filter; malformed values are a bad request, not a database error.
    pub fn filter_value(col: &ColumnDef, raw: &str) -> Result<Value, AppError> {
        coerce(col, Value::String(raw.to_string())).map_err(|e| match e {
            AppError::Validation(m) => AppError::BadRequest(m),
            other => other,
        })
    }

    /// Import pre-check: the batch is non-empty and every row carries every required column.
    pub fn check_import_columns(entity: &TableDef, rows: &[Map<String, Value>]) -> Result<(), AppError> {
        if rows.is_empty() {
            return Err(AppError::Validation("数据为空".into()));
        }
        let mut missing: Vec<&str> = Vec::new();
        for c in entity.columns.iter().filter(|c| c.is_required()) {
            let present = rows.iter().all(|row| row.keys().any(|k| normalize_key(entity, k) == c.name));
            if !present {
                missing.push(c.name);
            }
        }
        if !missing.is_empty() {
            return Err(AppError::Validation(format!("缺少必需的列：{}", missing.join(", "))));
        }
        Ok(())
    }
}

/// `ethnicity` -> `ethnicity_id` when the table has that foreign key and no plain `ethnicity` column.
fn normalize_key<'a>(entity: &'a TableDef, key: &'a str) -> &'a str {
    if entity.has_column(key) {
        return key;
    }
    entity
        .foreign_keys()
        .find(|c| c.name.strip_suffix("_id") == Some(key))
        .map(|c| c.name)
        .unwrap_or(key)
}

fn validate_fields(entity: &TableDef, body: Map<String, Value>, mode: Mode) -> Result<Map<String, Value>, AppError> {
    let mut out = Map::new();
    for (key, v) in body {
        let name = normalize_key(entity, &key);
        let col = entity
            .column_by_name(name)
            .ok_or_else(|| AppError::Validation(format!("unknown field: {}", key)))?;
        if col.managed {
            return Err(AppError::Validation(format!("field is read-only: {}", col.name)));
        }
        if out.contains_key(col.name) {
            return Err(AppError::Validation(format!("duplicate field: {}", col.name)));
        }
        if v.is_null() {
            if col.nullable {
                out.insert(col.name.to_string(), Value::Null);
                continue;
            }
            if mode == Mode::Create && col.default.is_some() {
                continue;
            }
            return Err(AppError::Validation(format!("{} cannot be null", col.name)));
        }
        let v = coerce(col, v)?;
        check_rules(col, &v)?;
        out.insert(col.name.to_string(), v);
    }
    Ok(out)
}

/// Bring a JSON value into the shape the column's SQL cast accepts.
fn coerce(col: &ColumnDef, v: Value) -> Result<Value, AppError> {
    let name = col.name;
    match col.ty {
        ColumnType::Serial | ColumnType::SmallInt | ColumnType::Int => {
            let n = match &v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            }
            .ok_or_else(|| AppError::Validation(format!("{} must be an integer", name)))?;
            let (lo, hi) = match col.ty {
                ColumnType::SmallInt => (i16::MIN as i64, i16::MAX as i64),
                _ => (i32::MIN as i64, i32::MAX as i64),
            };
            if n < lo || n > hi {
                return Err(AppError::Validation(format!("{} is out of range", name)));
            }
            Ok(Value::from(n))
        }
        ColumnType::Bool => match &v {
            Value::Bool(_) => Ok(v),
            Value::Number(n) if n.as_i64() == Some(0) || n.as_i64() == Some(1) => Ok(Value::Bool(n.as_i64() == Some(1))),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(AppError::Validation(format!("{} must be a boolean", name))),
            },
            _ => Err(AppError::Validation(format!("{} must be a boolean", name))),
        },
        ColumnType::Varchar(max) => {
            let s = text_value(name, v)?;
            if s.chars().count() > max as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at most {} characters",
                    name, max
                )));
            }
            Ok(Value::String(s))
        }
        ColumnType::Text => Ok(Value::String(text_value(name, v)?)),
        ColumnType::Date => {
            let s = text_value(name, v)?;
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| AppError::Validation(format!("{} must be a date (YYYY-MM-DD)", name)))?;
            Ok(Value::String(s.to_string()))
        }
        ColumnType::Timestamptz => {
            let s = text_value(name, v)?;
            let s = s.trim();
            let ok = DateTime::parse_from_rfc3339(s).is_ok()
                || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
                || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
                || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok();
            if !ok {
                return Err(AppError::Validation(format!("{} must be a date or timestamp", name)));
            }
            Ok(Value::String(s.to_string()))
        }
    }
}

/// Strings pass through; numbers (spreadsheet cells) are rendered as text.
fn text_value(name: &str, v: Value) -> Result<String, AppError> {
    match v {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(AppError::Validation(format!("{} must be a string", name))),
    }
}

fn check_rules(col: &ColumnDef, v: &Value) -> Result<(), AppError> {
    let rule = &col.rule;
    if let Some(pattern) = rule.pattern {
        let re = Regex::new(pattern).map_err(|_| AppError::Internal(format!("invalid pattern for {}", col.name)))?;
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} has an invalid format", col.name)));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(AppError::Validation(format!(
                "{} must be one of: {}",
                col.name,
                allowed.iter().map(Value::to_string).collect::<Vec<_>>().join(", ")
            )));
        }
    }
    if let Some(min) = rule.minimum {
        if let Some(n) = v.as_i64() {
            if n < min {
                return Err(AppError::Validation(format!("{} must be at least {}", col.name, min)));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::catalog;
    use serde_json::json;

    fn table(name: &str) -> TableDef {
        catalog().into_iter().find(|t| t.name == name).unwrap()
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn resident_payload_is_normalized() {
        let residents = table("residents");
        let out = RequestValidator::validate_create(
            &residents,
            obj(json!({
                "name": "张三",
                "id_card": "110101199001011234",
                "gender": 0,
                "birth_date": "1990-01-01",
                "ethnicity": 1
            })),
        )
        .unwrap();
        assert_eq!(out.get("ethnicity_id"), Some(&json!(1)));
        assert!(!out.contains_key("ethnicity"));
    }

    #[test]
    fn missing_required_fields_are_listed() {
        let residents = table("residents");
        let err = RequestValidator::validate_create(&residents, obj(json!({"name": "张三"}))).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("id_card"));
        assert!(msg.contains("birth_date"));
        assert!(!msg.contains("gender"));
    }

    #[test]
    fn managed_flags_are_read_only() {
        let residents = table("residents");
        let err = RequestValidator::validate_update(&residents, obj(json!({"is_low_income": true}))).unwrap_err();
        assert_eq!(err.to_string(), "field is read-only: is_low_income");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let streets = table("streets");
        assert!(RequestValidator::validate_update(&streets, obj(json!({"nope": 1}))).is_err());
    }

    #[test]
    fn enum_columns_check_allowed_values() {
        let residents = table("residents");
        assert!(RequestValidator::validate_update(&residents, obj(json!({"gender": 2}))).is_err());
        assert!(RequestValidator::validate_update(&residents, obj(json!({"gender": "1"}))).is_ok());
    }

    #[test]
    fn id_card_pattern_and_length() {
        let residents = table("residents");
        assert!(RequestValidator::validate_update(&residents, obj(json!({"id_card": "11010119900101123X"}))).is_ok());
        assert!(RequestValidator::validate_update(&residents, obj(json!({"id_card": "1234"}))).is_err());
    }

    #[test]
    fn dates_must_parse() {
        let residents = table("residents");
        assert!(RequestValidator::validate_update(&residents, obj(json!({"birth_date": "1990-13-01"}))).is_err());
    }

    #[test]
    fn apartment_number_has_a_floor() {
        let apartment = table("apartment");
        assert!(RequestValidator::validate_update(&apartment, obj(json!({"apartment_number": -1}))).is_err());
        assert!(RequestValidator::validate_update(&apartment, obj(json!({"apartment_number": 40000}))).is_err());
    }

    #[test]
    fn null_on_defaulted_column_uses_default() {
        let residents = table("residents");
        let out = RequestValidator::validate_create(
            &residents,
            obj(json!({
                "name": "李四",
                "id_card": "110101199001011235",
                "birth_date": "1990-01-01",
                "ethnicity_id": 1,
                "phone_number": null
            })),
        )
        .unwrap();
        assert!(!out.contains_key("phone_number"));
    }

    #[test]
    fn import_reports_every_missing_column() {
        let merchants = table("merchants");
        let err = RequestValidator::check_import_columns(&merchants, &[obj(json!({"merchants_name": "x"}))]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("缺少必需的列："));
        assert!(msg.contains("credit_code, "));
        assert_eq!(
            RequestValidator::check_import_columns(&merchants, &[]).unwrap_err().to_string(),
            "数据为空"
        );
    }

    #[test]
    fn filter_values_are_typed_or_bad_requests() {
        let residents = table("residents");
        let col = |n: &str| residents.column_by_name(n).unwrap().clone();
        assert_eq!(RequestValidator::filter_value(&col("ethnicity_id"), "7").unwrap(), json!(7));
        assert_eq!(RequestValidator::filter_value(&col("is_deceased"), "true").unwrap(), json!(true));
        for (name, raw) in [("birth_date", "garbage"), ("ethnicity_id", "99999999999"), ("gender", "x")] {
            let err = RequestValidator::filter_value(&col(name), raw).unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{name}: {err:?}");
        }
    }
}
