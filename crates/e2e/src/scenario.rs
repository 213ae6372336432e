//! Declarative YAML scenarios
//!
//! A scenario names a pipeline, the data to feed its first stage, and what
//! the stage-by-stage run is expected to look like.

use serde::{Deserialize, Serialize};
use stagewise_common::data::{load_records, MockDataGenerator};
use stagewise_common::validation::{
    check_completeness, check_uniqueness, payload_records, validate_formats, validate_schema,
};
use stagewise_common::{DataPayload, DataSchema};
use std::path::{Path, PathBuf};

use crate::error::{E2eError, E2eResult};
use crate::result::PipelineTestResult;

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Pipeline under test
    pub pipeline_id: String,

    #[serde(default)]
    pub mode: ScenarioMode,

    /// Initial data for the first stage; empty when omitted
    #[serde(default)]
    pub input: ScenarioInput,

    #[serde(default)]
    pub expect: Expectations,
}

/// Which execution variant drives the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioMode {
    #[default]
    Api,
    Ui,
}

impl std::fmt::Display for ScenarioMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioMode::Api => write!(f, "api"),
            ScenarioMode::Ui => write!(f, "ui"),
        }
    }
}

/// Source of the initial data. At most one field may be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioInput {
    /// Literal payload
    #[serde(default)]
    pub inline: Option<DataPayload>,

    /// JSON array of records, relative to the test data directory
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Mock records generated for a sample schema
    #[serde(default)]
    pub generate: Option<GeneratedInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedInput {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub records: usize,
    /// Fixed seed for reproducible data
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_schema() -> String {
    "customer".to_string()
}

impl ScenarioInput {
    /// Build the payload handed to the first stage
    pub fn resolve(&self, test_data_dir: &Path) -> E2eResult<DataPayload> {
        match (&self.inline, &self.file, &self.generate) {
            (None, None, None) => Ok(DataPayload::new()),
            (Some(inline), None, None) => Ok(inline.clone()),
            (None, Some(file), None) => {
                let path = if file.is_absolute() {
                    file.clone()
                } else {
                    test_data_dir.join(file)
                };
                let records = load_records(&path)?;
                let schema = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "records".to_string());
                Ok(MockDataGenerator::input_payload(&schema, records))
            }
            (None, None, Some(generated)) => {
                let mut generator = match generated.seed {
                    Some(seed) => MockDataGenerator::with_seed(seed),
                    None => MockDataGenerator::new(),
                };
                let schema = MockDataGenerator::sample_schema(&generated.schema);
                let records = generator.generate_records(&schema, generated.records);
                Ok(MockDataGenerator::input_payload(&schema.name, records))
            }
            _ => Err(E2eError::ScenarioParse(
                "input may set only one of inline, file or generate".to_string(),
            )),
        }
    }
}

/// Expected shape of the run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Expectations {
    /// Defaults to true unless `stage_failures` is non-empty
    #[serde(default)]
    pub all_stages_succeed: Option<bool>,

    #[serde(default)]
    pub stage_failures: Vec<StageFailureExpectation>,

    #[serde(default)]
    pub stage_records: Vec<StageRecordExpectation>,

    /// Records a stage emits must match these schemas
    #[serde(default)]
    pub stage_schema: Vec<StageSchemaExpectation>,

    #[serde(default)]
    pub stage_completeness: Vec<StageCompletenessExpectation>,

    #[serde(default)]
    pub stage_uniqueness: Vec<StageUniquenessExpectation>,

    #[serde(default)]
    pub max_duration_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageFailureExpectation {
    pub stage: String,
    #[serde(default)]
    pub error_contains: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecordExpectation {
    pub stage: String,
    pub records: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSchemaExpectation {
    pub stage: String,
    pub schema: DataSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageCompletenessExpectation {
    pub stage: String,
    /// Every field of the output when omitted
    #[serde(default)]
    pub field: Option<String>,
    pub min_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageUniquenessExpectation {
    pub stage: String,
    pub field: String,
    #[serde(default = "full_percent")]
    pub min_percent: f64,
}

fn full_percent() -> f64 {
    100.0
}

/// Records from a stage's output, or why there are none
fn stage_output_records(run: &PipelineTestResult, stage: &str) -> Result<Vec<DataPayload>, String> {
    let result = run
        .stage_result(stage)
        .ok_or_else(|| format!("stage '{}' was never run", stage))?;
    let output = result
        .output_data
        .as_ref()
        .ok_or_else(|| format!("stage '{}' produced no output", stage))?;
    payload_records(output).ok_or_else(|| format!("stage '{}' output carries no records", stage))
}

impl Expectations {
    fn expects_success(&self) -> bool {
        self.all_stages_succeed.unwrap_or(self.stage_failures.is_empty())
    }

    /// Every unmet expectation, as a readable message
    pub fn evaluate(&self, run: &PipelineTestResult) -> Vec<String> {
        let mut failures = Vec::new();

        if self.expects_success() && !run.overall_success {
            failures.push(format!(
                "expected all stages to succeed, got: {}",
                run.failure_message().unwrap_or_else(|| "unknown failure".to_string())
            ));
        }
        if !self.expects_success() && run.overall_success {
            failures.push("expected a stage failure, but every stage succeeded".to_string());
        }

        for expected in &self.stage_failures {
            match run.stage_result(&expected.stage) {
                None => failures.push(format!("stage '{}' was never run", expected.stage)),
                Some(stage) if stage.is_successful() => {
                    failures.push(format!("expected stage '{}' to fail", expected.stage));
                }
                Some(stage) => {
                    if let Some(needle) = &expected.error_contains {
                        let message = stage.error.as_deref().unwrap_or_default();
                        if !message.contains(needle.as_str()) {
                            failures.push(format!(
                                "stage '{}' error '{}' does not contain '{}'",
                                expected.stage, message, needle
                            ));
                        }
                    }
                }
            }
        }

        for expected in &self.stage_records {
            let actual = run.stage_result(&expected.stage).and_then(|s| s.record_count());
            if actual != Some(expected.records) {
                failures.push(format!(
                    "stage '{}' expected {} records, got {}",
                    expected.stage,
                    expected.records,
                    actual.map(|n| n.to_string()).unwrap_or_else(|| "none".to_string())
                ));
            }
        }

        for expected in &self.stage_schema {
            let records = match stage_output_records(run, &expected.stage) {
                Ok(records) => records,
                Err(message) => {
                    failures.push(message);
                    continue;
                }
            };
            if let Err(e) = validate_schema(&expected.schema) {
                failures.push(format!("schema for stage '{}' is unusable: {}", expected.stage, e));
                continue;
            }
            let invalid: Vec<String> = validate_formats(&records, &expected.schema)
                .into_iter()
                .filter(|(_, valid)| !valid)
                .map(|(field, _)| field)
                .collect();
            if !invalid.is_empty() {
                failures.push(format!(
                    "output of stage '{}' does not match schema '{}': {}",
                    expected.stage,
                    expected.schema.name,
                    invalid.join(", ")
                ));
            }
        }

        for expected in &self.stage_completeness {
            let records = match stage_output_records(run, &expected.stage) {
                Ok(records) => records,
                Err(message) => {
                    failures.push(message);
                    continue;
                }
            };
            let completeness = check_completeness(&records);
            let checked: Vec<(String, f64)> = match &expected.field {
                Some(field) => vec![(field.clone(), completeness.get(field).copied().unwrap_or(0.0))],
                None => completeness.into_iter().collect(),
            };
            for (field, percent) in checked {
                if percent < expected.min_percent {
                    failures.push(format!(
                        "stage '{}' field '{}' is {:.1}% complete, expected at least {:.1}%",
                        expected.stage, field, percent, expected.min_percent
                    ));
                }
            }
        }

        for expected in &self.stage_uniqueness {
            match stage_output_records(run, &expected.stage) {
                Ok(records) => {
                    let percent = check_uniqueness(&records, &expected.field);
                    if percent < expected.min_percent {
                        failures.push(format!(
                            "stage '{}' field '{}' is {:.1}% unique, expected at least {:.1}%",
                            expected.stage, expected.field, percent, expected.min_percent
                        ));
                    }
                }
                Err(message) => failures.push(message),
            }
        }

        if let Some(max) = self.max_duration_secs {
            if run.duration_ms > max * 1000 {
                failures.push(format!("run took {} ms, limit is {} s", run.duration_ms, max));
            }
        }

        failures
    }
}

impl Scenario {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::ScenarioParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios under a directory, sorted by file path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            scenarios.push(Self::from_file(entry.path())?);
        }

        Ok(scenarios)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{RunOutcome, StageExecutionResult, StageTestResult};
    use serde_json::json;
    use stagewise_common::{Stage, StageType};

    fn run_with(entries: Vec<(&str, Result<usize, &str>)>, outcome: RunOutcome) -> PipelineTestResult {
        let mut run = PipelineTestResult::new("p1", DataPayload::new());
        for (name, result) in entries {
            let mut entry = StageTestResult::new(&Stage::new(name, name, StageType::Transformation, 0));
            match result {
                Ok(records) => {
                    let mut output = DataPayload::new();
                    output.insert("records".to_string(), json!(vec![json!({}); records]));
                    entry.execution = Some(StageExecutionResult::success(output.clone()));
                    entry.output_data = Some(output);
                }
                Err(error) => {
                    entry.execution = Some(StageExecutionResult::failure(error, DataPayload::new()));
                    entry.error = Some(format!("Stage execution failed: {}", error));
                }
            }
            run.record_stage(entry);
        }
        run.finish(outcome, 1200);
        run
    }

    #[test]
    fn test_parse_scenario() {
        let yaml = r#"
name: transform-rejects-bad-schema
description: Transform stage must reject mismatched input
pipeline_id: P2
input:
  generate:
    schema: customer
    records: 25
    seed: 7
expect:
  stage_failures:
    - stage: Transform
      error_contains: schema mismatch
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.mode, ScenarioMode::Api);
        assert_eq!(scenario.input.generate.as_ref().map(|g| g.records), Some(25));
        assert!(!scenario.expect.expects_success());
    }

    #[test]
    fn test_resolve_generated_input_is_seeded() {
        let input = ScenarioInput {
            generate: Some(GeneratedInput {
                schema: "customer".to_string(),
                records: 5,
                seed: Some(42),
            }),
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let first = input.resolve(dir.path()).unwrap();
        let second = input.resolve(dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first["records"].as_array().map(Vec::len), Some(5));
        assert_eq!(first["format"], "json");
    }

    #[test]
    fn test_resolve_file_input_relative_to_test_data() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("orders.json"), r#"[{"id": 1}, {"id": 2}]"#).unwrap();
        let input = ScenarioInput {
            file: Some(PathBuf::from("orders.json")),
            ..Default::default()
        };
        let payload = input.resolve(dir.path()).unwrap();
        assert_eq!(payload["schema"], "orders");
        assert_eq!(payload["records"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_resolve_rejects_multiple_sources() {
        let input = ScenarioInput {
            inline: Some(DataPayload::new()),
            file: Some(PathBuf::from("x.json")),
            generate: None,
        };
        assert!(matches!(
            input.resolve(Path::new(".")),
            Err(E2eError::ScenarioParse(_))
        ));
    }

    #[test]
    fn test_expected_failure_is_met() {
        let run = run_with(
            vec![("Source", Ok(10)), ("Transform", Err("schema mismatch"))],
            RunOutcome::Failed,
        );
        let expect = Expectations {
            stage_failures: vec![StageFailureExpectation {
                stage: "Transform".to_string(),
                error_contains: Some("schema mismatch".to_string()),
            }],
            stage_records: vec![StageRecordExpectation {
                stage: "Source".to_string(),
                records: 10,
            }],
            ..Default::default()
        };
        assert!(expect.evaluate(&run).is_empty());
    }

    #[test]
    fn test_unmet_expectations_are_reported() {
        let run = run_with(vec![("Source", Ok(3)), ("Target", Ok(3))], RunOutcome::Completed);
        let expect = Expectations {
            stage_failures: vec![StageFailureExpectation {
                stage: "Target".to_string(),
                error_contains: None,
            }],
            stage_records: vec![StageRecordExpectation {
                stage: "Source".to_string(),
                records: 4,
            }],
            max_duration_secs: Some(1),
            ..Default::default()
        };
        let failures = expect.evaluate(&run);
        assert_eq!(failures.len(), 4, "{:?}", failures);
    }

    fn run_with_output(stage: &str, records: serde_json::Value) -> PipelineTestResult {
        let mut run = PipelineTestResult::new("p1", DataPayload::new());
        let mut entry = StageTestResult::new(&Stage::new(stage, stage, StageType::Target, 0));
        let mut output = DataPayload::new();
        output.insert("records".to_string(), records);
        entry.execution = Some(StageExecutionResult::success(output.clone()));
        entry.output_data = Some(output);
        run.record_stage(entry);
        run.finish(RunOutcome::Completed, 10);
        run
    }

    #[test]
    fn test_data_quality_expectations_from_yaml() {
        let yaml = r#"
name: target-output-quality
pipeline_id: P1
expect:
  stage_schema:
    - stage: Target
      schema:
        name: customer_out
        fields:
          - { name: id, data_type: integer, nullable: false }
          - { name: email, data_type: string }
          - { name: created_date, data_type: date }
  stage_completeness:
    - stage: Target
      field: email
      min_percent: 90
  stage_uniqueness:
    - stage: Target
      field: id
"#;
        let expect = Scenario::from_yaml(yaml).unwrap().expect;
        assert_eq!(expect.stage_uniqueness[0].min_percent, 100.0);

        let good = run_with_output(
            "Target",
            json!([
                {"id": 1, "email": "a@example.com", "created_date": "2024-01-02"},
                {"id": 2, "email": "b@example.com", "created_date": null},
            ]),
        );
        assert!(expect.evaluate(&good).is_empty(), "{:?}", expect.evaluate(&good));

        let bad = run_with_output(
            "Target",
            json!([
                {"id": 1, "email": "", "created_date": "02/01/2024"},
                {"id": 1, "email": "b@example.com", "created_date": "2024-01-02"},
            ]),
        );
        let failures = expect.evaluate(&bad);
        assert_eq!(failures.len(), 3, "{:?}", failures);
        assert!(failures[0].contains("does not match schema 'customer_out': created_date"));
        assert!(failures[1].contains("'email' is 50.0% complete"));
        assert!(failures[2].contains("'id' is 50.0% unique"));
    }

    #[test]
    fn test_data_quality_needs_stage_records() {
        let run = run_with(vec![("Source", Err("boom"))], RunOutcome::Failed);
        let expect = Expectations {
            all_stages_succeed: Some(false),
            stage_completeness: vec![StageCompletenessExpectation {
                stage: "Source".to_string(),
                field: None,
                min_percent: 50.0,
            }],
            stage_uniqueness: vec![StageUniquenessExpectation {
                stage: "Target".to_string(),
                field: "id".to_string(),
                min_percent: 100.0,
            }],
            ..Default::default()
        };
        let failures = expect.evaluate(&run);
        assert_eq!(
            failures,
            vec![
                "stage 'Source' produced no output".to_string(),
                "stage 'Target' was never run".to_string(),
            ]
        );
    }

    #[test]
    fn test_load_all_reads_nested_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.yaml"), "name: a\npipeline_id: P1\n").unwrap();
        std::fs::write(dir.path().join("nested/b.yml"), "name: b\npipeline_id: P2\nmode: ui\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let scenarios = Scenario::load_all(dir.path()).unwrap();
        let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(scenarios[1].mode, ScenarioMode::Ui);
    }
}
