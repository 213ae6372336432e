//! Data validation over schemas and record sets
//!
//! Checks used to judge what a stage produced: schema sanity, per-field
//! completeness and uniqueness, and value formats against a schema.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{DataPayload, DataSchema, DataType};

/// Outcome of `validate_quality`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub record_count: usize,
    /// Percentage (0-100) of non-blank values per field
    pub completeness: BTreeMap<String, f64>,
    /// Whether every value of a schema field has the expected format
    pub formats: BTreeMap<String, bool>,
    /// Mean completeness as a fraction (0-1)
    pub quality_score: f64,
    pub validated_at: String,
}

impl QualityReport {
    /// Schema fields with at least one badly formatted value
    pub fn invalid_fields(&self) -> Vec<&str> {
        self.formats
            .iter()
            .filter(|(_, valid)| !**valid)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Reject schemas without fields or with duplicate field names.
///
/// A schema without an `id` field is accepted with a warning.
pub fn validate_schema(schema: &DataSchema) -> Result<()> {
    if schema.fields.is_empty() {
        return Err(Error::InvalidData(format!("schema '{}' has no fields", schema.name)));
    }

    if !schema.has_field("id") {
        warn!("Schema {} does not have an 'id' field", schema.name);
    }

    let mut seen = HashSet::new();
    for field in &schema.fields {
        if !seen.insert(field.name.as_str()) {
            return Err(Error::InvalidData(format!(
                "schema '{}' has duplicate field '{}'",
                schema.name, field.name
            )));
        }
    }

    debug!("Schema {} is valid", schema.name);
    Ok(())
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Percentage of non-null, non-blank values for each field of the first record
pub fn check_completeness(records: &[DataPayload]) -> BTreeMap<String, f64> {
    let Some(first) = records.first() else {
        return BTreeMap::new();
    };

    first
        .keys()
        .map(|field| {
            let filled = records.iter().filter(|r| !is_blank(r.get(field))).count();
            let percent = filled as f64 / records.len() as f64 * 100.0;
            debug!("Field '{}' completeness: {:.1}%", field, percent);
            (field.clone(), percent)
        })
        .collect()
}

/// Percentage of distinct values among the non-null values of `field`.
///
/// 100 when there is nothing to compare.
pub fn check_uniqueness(records: &[DataPayload], field: &str) -> f64 {
    let values: Vec<String> = records
        .iter()
        .filter_map(|r| r.get(field))
        .filter(|v| !v.is_null())
        .map(Value::to_string)
        .collect();

    if values.is_empty() {
        return 100.0;
    }

    let distinct: HashSet<&String> = values.iter().collect();
    distinct.len() as f64 / values.len() as f64 * 100.0
}

/// Per schema field, whether every record holds a value of the right format.
///
/// Missing and null values pass only for nullable fields.
pub fn validate_formats(records: &[DataPayload], schema: &DataSchema) -> BTreeMap<String, bool> {
    schema
        .fields
        .iter()
        .map(|field| {
            let valid = records.iter().all(|record| match record.get(&field.name) {
                None | Some(Value::Null) => field.nullable,
                Some(value) => matches_type(value, field.data_type),
            });
            if !valid {
                debug!("Field '{}' has values that are not {:?}", field.name, field.data_type);
            }
            (field.name.clone(), valid)
        })
        .collect()
}

/// Completeness, formats and an overall score for a record set
pub fn validate_quality(records: &[DataPayload], schema: &DataSchema) -> QualityReport {
    let completeness = check_completeness(records);
    let formats = validate_formats(records, schema);
    let quality_score = if completeness.is_empty() {
        0.0
    } else {
        completeness.values().sum::<f64>() / completeness.len() as f64 / 100.0
    };

    info!(
        "Validated {} records against {}: quality score {:.2}",
        records.len(),
        schema.name,
        quality_score
    );

    QualityReport {
        record_count: records.len(),
        completeness,
        formats,
        quality_score,
        validated_at: chrono::Utc::now().to_rfc3339(),
    }
}

/// Records carried under `records` in a stage payload
pub fn payload_records(payload: &DataPayload) -> Option<Vec<DataPayload>> {
    payload.get("records")?.as_array().map(|items| {
        items
            .iter()
            .filter_map(|item| item.as_object().cloned())
            .collect()
    })
}

fn matches_type(value: &Value, data_type: DataType) -> bool {
    match data_type {
        DataType::String => true,
        DataType::Integer | DataType::Long => match value {
            Value::Number(n) => n.is_i64() || n.is_u64(),
            Value::String(s) => s.trim().parse::<i64>().is_ok(),
            _ => false,
        },
        DataType::Double | DataType::Float | DataType::Decimal => match value {
            Value::Number(_) => true,
            Value::String(s) => s.trim().parse::<f64>().is_ok(),
            _ => false,
        },
        DataType::Boolean => match value {
            Value::Bool(_) => true,
            Value::String(s) => s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false"),
            _ => false,
        },
        DataType::Date => value
            .as_str()
            .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
            .unwrap_or(false),
        DataType::Timestamp => value.as_str().map(is_timestamp).unwrap_or(false),
        DataType::Binary => value.is_string(),
        DataType::Array => value.is_array(),
        DataType::Map | DataType::Struct => value.is_object(),
    }
}

fn is_timestamp(s: &str) -> bool {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
        || DateTime::parse_from_rfc3339(s).is_ok()
}
