//! Test data: mock record generation and record files

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{DataPayload, DataSchema, DataType, Pipeline, PipelineStatus, SchemaField, Stage, StageType};

const FIRST_NAMES: &[&str] = &["Ada", "Grace", "Alan", "Edsger", "Barbara", "Ken", "Radia", "Linus"];
const LAST_NAMES: &[&str] = &["Lovelace", "Hopper", "Turing", "Dijkstra", "Liskov", "Thompson", "Perlman"];
const CITIES: &[&str] = &["Lisbon", "Osaka", "Toronto", "Nairobi", "Utrecht", "Austin"];
const COUNTRIES: &[&str] = &["Portugal", "Japan", "Canada", "Kenya", "Netherlands", "United States"];
const WORDS: &[&str] = &["alpha", "delta", "ledger", "orbit", "quartz", "signal", "vector", "harbor"];
const PRODUCTS: &[&str] = &["Steel Lamp", "Cotton Shirt", "Granite Table", "Rubber Keyboard"];

/// Probability that a nullable field is generated as null
const NULL_RATE: f64 = 0.1;

/// Generates schema-shaped mock records for pipeline inputs
pub struct MockDataGenerator {
    rng: StdRng,
    /// Dates and timestamps are generated backwards from here
    anchor: DateTime<Utc>,
}

impl Default for MockDataGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDataGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            anchor: Utc::now(),
        }
    }

    /// Deterministic generator for reproducible fixtures.
    ///
    /// Dates are anchored to the start of the current UTC day, so two
    /// generators with the same seed agree on the same day.
    pub fn with_seed(seed: u64) -> Self {
        let now = Utc::now();
        let anchor = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .unwrap_or(now);
        Self {
            rng: StdRng::seed_from_u64(seed),
            anchor,
        }
    }

    /// The customer schema used when a scenario does not supply its own
    pub fn sample_schema(name: &str) -> DataSchema {
        DataSchema::new(
            name,
            vec![
                SchemaField::new("id", DataType::String, false),
                SchemaField::new("name", DataType::String, false),
                SchemaField::new("email", DataType::String, true),
                SchemaField::new("age", DataType::Integer, true),
                SchemaField::new("salary", DataType::Double, true),
                SchemaField::new("is_active", DataType::Boolean, true),
                SchemaField::new("created_date", DataType::Date, false),
                SchemaField::new("last_updated", DataType::Timestamp, false),
            ],
        )
    }

    /// Generate `count` records matching `schema`
    pub fn generate_records(&mut self, schema: &DataSchema, count: usize) -> Vec<DataPayload> {
        let records: Vec<DataPayload> = (0..count)
            .map(|_| {
                schema
                    .fields
                    .iter()
                    .map(|field| (field.name.clone(), self.value_for(field)))
                    .collect()
            })
            .collect();

        info!("Generated {} mock records for schema {}", records.len(), schema.name);
        records
    }

    /// Wrap records into the input payload shape the remote API expects
    pub fn input_payload(schema_name: &str, records: Vec<DataPayload>) -> DataPayload {
        let mut payload = DataPayload::new();
        payload.insert(
            "records".to_string(),
            Value::Array(records.into_iter().map(Value::Object).collect()),
        );
        payload.insert("schema".to_string(), json!(schema_name));
        payload.insert("format".to_string(), json!("json"));
        payload
    }

    /// A draft pipeline with Source, Transformation and Target stages
    pub fn sample_pipeline(name: &str, project: &str) -> Pipeline {
        let mut pipeline = Pipeline::new(Uuid::new_v4().to_string(), name);
        pipeline.description = "Sample pipeline for testing".to_string();
        pipeline.project = project.to_string();
        pipeline.version = Some("1.0.0".to_string());
        pipeline.status = PipelineStatus::Draft;
        pipeline.created_by = Some("test-user".to_string());
        pipeline.created_at = Some(Utc::now().to_rfc3339());

        let stages = [
            ("Source_Data", StageType::Source, "Read data from source"),
            ("Transform_Data", StageType::Transformation, "Apply data transformations"),
            ("Target_Data", StageType::Target, "Write data to target"),
        ];
        pipeline.stages = stages
            .iter()
            .enumerate()
            .map(|(i, (stage_name, stage_type, description))| {
                let mut stage = Stage::new(Uuid::new_v4().to_string(), *stage_name, *stage_type, i as u32 + 1);
                stage.description = Some(description.to_string());
                stage
            })
            .collect();

        pipeline
    }

    fn value_for(&mut self, field: &SchemaField) -> Value {
        if field.nullable && self.rng.gen_bool(NULL_RATE) {
            return Value::Null;
        }

        match field.data_type {
            DataType::String => json!(self.string_for(&field.name)),
            DataType::Integer => json!(self.rng.gen_range(1..10_000)),
            DataType::Long => json!(self.rng.gen_range(1i64..1_000_000)),
            DataType::Double | DataType::Decimal => json!(self.money(10_000.0)),
            DataType::Float => json!(self.money(1_000.0) as f32),
            DataType::Boolean => json!(self.rng.gen_bool(0.5)),
            DataType::Date => {
                let days = self.rng.gen_range(0..365);
                json!((self.anchor - ChronoDuration::days(days)).format("%Y-%m-%d").to_string())
            }
            DataType::Timestamp => {
                let seconds = self.rng.gen_range(0..365 * 86_400);
                json!((self.anchor - ChronoDuration::seconds(seconds))
                    .format("%Y-%m-%dT%H:%M:%S")
                    .to_string())
            }
            DataType::Binary | DataType::Array | DataType::Map | DataType::Struct => {
                json!(self.pick(WORDS))
            }
        }
    }

    /// Name-aware string values
    fn string_for(&mut self, field_name: &str) -> String {
        let name = field_name.to_ascii_lowercase();
        if name.contains("name") {
            format!("{} {}", self.pick(FIRST_NAMES), self.pick(LAST_NAMES))
        } else if name.contains("email") {
            format!(
                "{}.{}@example.com",
                self.pick(FIRST_NAMES).to_ascii_lowercase(),
                self.rng.gen_range(100..999)
            )
        } else if name.contains("phone") {
            format!("+1-555-{:04}", self.rng.gen_range(0..10_000))
        } else if name.contains("city") {
            self.pick(CITIES).to_string()
        } else if name.contains("country") {
            self.pick(COUNTRIES).to_string()
        } else if name.contains("product") {
            self.pick(PRODUCTS).to_string()
        } else if name.contains("id") {
            uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid().to_string()
        } else {
            self.pick(WORDS).to_string()
        }
    }

    fn money(&mut self, max: f64) -> f64 {
        (self.rng.gen_range(1.0..max) * 100.0).round() / 100.0
    }

    fn pick(&mut self, values: &'static [&'static str]) -> &'static str {
        values.choose(&mut self.rng).copied().unwrap_or_default()
    }
}

/// Read a JSON array of records
pub fn load_records(path: &Path) -> Result<Vec<DataPayload>> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;

    let Value::Array(items) = value else {
        return Err(Error::InvalidData(format!(
            "{} must contain a JSON array of records",
            path.display()
        )));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(record) => Ok(record),
            _ => Err(Error::InvalidData(format!(
                "{}: element {} is not an object",
                path.display(),
                i
            ))),
        })
        .collect()
}

/// Write records as a pretty-printed JSON array
pub fn save_records(path: &Path, records: &[DataPayload]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json)?;
    info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_records_follow_schema() {
        let schema = MockDataGenerator::sample_schema("customer_schema");
        let mut generator = MockDataGenerator::with_seed(7);
        let records = generator.generate_records(&schema, 50);

        assert_eq!(records.len(), 50);
        for record in &records {
            assert_eq!(record.len(), schema.field_count());
            // non-nullable fields are never null
            assert!(record["id"].is_string());
            assert!(record["name"].is_string());
            assert!(record["created_date"].is_string());
            assert!(record["age"].is_null() || record["age"].is_i64());
        }
    }

    #[test]
    fn test_input_payload_shape() {
        let schema = MockDataGenerator::sample_schema("customer_schema");
        let records = MockDataGenerator::with_seed(1).generate_records(&schema, 3);
        let payload = MockDataGenerator::input_payload(&schema.name, records);

        assert_eq!(payload["records"].as_array().map(Vec::len), Some(3));
        assert_eq!(payload["schema"], "customer_schema");
        assert_eq!(payload["format"], "json");
    }

    #[test]
    fn test_sample_pipeline_stage_order() {
        let pipeline = MockDataGenerator::sample_pipeline("orders", "retail");
        let types: Vec<StageType> = pipeline.stages.iter().map(|s| s.stage_type).collect();
        assert_eq!(types, vec![StageType::Source, StageType::Transformation, StageType::Target]);
        assert_eq!(pipeline.stages[2].order, 3);
        assert_eq!(pipeline.project, "retail");
    }

    #[test]
    fn test_records_file_roundtrip_and_rejects_non_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/customers.json");
        let schema = MockDataGenerator::sample_schema("customer_schema");
        let records = MockDataGenerator::with_seed(3).generate_records(&schema, 4);

        save_records(&path, &records).unwrap();
        assert_eq!(load_records(&path).unwrap(), records);

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "[1, 2]").unwrap();
        assert!(matches!(load_records(&bad), Err(Error::InvalidData(_))));
    }
}
